//! LLM text generation service
//!
//! Providers behind [`TextGenerator`], a Redis result cache keyed by request,
//! and the [`LlmService`] that ties them together.

pub mod cache;
pub mod models;
pub mod provider;
pub mod service;

pub use cache::{cache_key, GenerationCache, RedisCache};
pub use models::{CacheStatus, GenerateRequest, GenerateResponse, StatsResponse};
pub use provider::{create_generator, GenerationParams, MockGenerator, TextGenerator};
pub use service::{GenerateError, LlmService};

#[cfg(test)]
pub use cache::MockGenerationCache;
#[cfg(test)]
pub use provider::MockTextGenerator;

use serde::{Deserialize, Serialize};

/// Which backend generates text, and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// `anthropic`, `openai` or `mock`
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL override for self-hosted or proxied endpoints
    pub endpoint: Option<String>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "mock".to_string(),
            api_key: None,
            endpoint: None,
        }
    }
}
