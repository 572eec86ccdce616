//! Incident analysis agent
//!
//! Turns an incident report into an [`AnalysisResult`]: prompt, LLM call,
//! response parsing, scoring, insight extraction and result caching.

pub mod analyzer;
pub mod client;
pub mod insights;
pub mod models;
pub mod parser;
pub mod prompt;
pub mod registration;
pub mod scoring;

pub use analyzer::{description_hash, normalize_description, IncidentAnalyzer, LLM_UNAVAILABLE};
pub use client::{HttpLlmClient, LlmClient};
pub use insights::{classify_action, extract_insights};
pub use models::{
    ActionableInsight, AnalysisResult, AnalysisSource, IncidentReport, InsightType, LlmStructuredResponse,
    RecommendedAction, RootCause,
};
pub use parser::{extract_json_object, parse_llm_response, ParseError};
pub use prompt::build_incident_prompt;
pub use registration::{AgentIdSlot, McpClient, AGENT_CAPABILITIES};
pub use scoring::calculate_confidence;

#[cfg(test)]
pub use client::MockLlmClient;
