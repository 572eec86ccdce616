//! Incident analysis data model
//!
//! Input reports, the loosely-specified structure the LLM is asked to return,
//! and the analysis result handed back to callers and stored in the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An incident report as received from MCP, the webhook, or a direct caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncidentReport {
    pub incident_id: String,

    /// Accepts RFC 3339 or a naive ISO timestamp (read as UTC); defaults to now.
    #[serde(default = "Utc::now", with = "flexible_timestamp")]
    pub timestamp: DateTime<Utc>,

    pub description: String,

    /// Priority level, 1 being the most urgent.
    #[serde(default)]
    pub priority: Option<u8>,

    #[serde(default)]
    pub affected_systems: Vec<String>,

    #[serde(default)]
    pub reporter: Option<String>,
}

impl IncidentReport {
    pub fn new(incident_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            incident_id: incident_id.into(),
            timestamp: Utc::now(),
            description: description.into(),
            priority: None,
            affected_systems: Vec::new(),
            reporter: None,
        }
    }
}

mod flexible_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{}': {}", raw, e)))
    }
}

/// A root cause proposed by the LLM. Plain strings and `{description, likelihood}`
/// objects are both accepted; a cause without likelihood serializes back as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RootCauseRepr", into = "RootCauseRepr")]
pub struct RootCause {
    pub description: String,
    pub likelihood: Option<Value>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RootCauseRepr {
    Text(String),
    Detailed {
        #[serde(alias = "cause")]
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        likelihood: Option<Value>,
    },
}

impl From<RootCauseRepr> for RootCause {
    fn from(repr: RootCauseRepr) -> Self {
        match repr {
            RootCauseRepr::Text(description) => Self { description, likelihood: None },
            RootCauseRepr::Detailed { description, likelihood } => Self { description, likelihood },
        }
    }
}

impl From<RootCause> for RootCauseRepr {
    fn from(cause: RootCause) -> Self {
        match cause.likelihood {
            None => RootCauseRepr::Text(cause.description),
            likelihood => RootCauseRepr::Detailed {
                description: cause.description,
                likelihood,
            },
        }
    }
}

/// A recommended action. Same string-or-object leniency as [`RootCause`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecommendedActionRepr", into = "RecommendedActionRepr")]
pub struct RecommendedAction {
    pub description: String,
    pub priority: Option<u8>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RecommendedActionRepr {
    Text(String),
    Detailed {
        #[serde(alias = "action")]
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<u8>,
    },
}

impl From<RecommendedActionRepr> for RecommendedAction {
    fn from(repr: RecommendedActionRepr) -> Self {
        match repr {
            RecommendedActionRepr::Text(description) => Self { description, priority: None },
            RecommendedActionRepr::Detailed { description, priority } => Self { description, priority },
        }
    }
}

impl From<RecommendedAction> for RecommendedActionRepr {
    fn from(action: RecommendedAction) -> Self {
        match action.priority {
            None => RecommendedActionRepr::Text(action.description),
            priority => RecommendedActionRepr::Detailed {
                description: action.description,
                priority,
            },
        }
    }
}

/// The JSON object the prompt asks the LLM to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmStructuredResponse {
    pub potential_root_causes: Vec<RootCause>,
    pub recommended_actions: Vec<RecommendedAction>,
    #[serde(default)]
    pub potential_impact: Option<String>,
    #[serde(default)]
    pub confidence_explanation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Investigate,
    Configure,
    UpdateDoc,
    Escalate,
}

impl std::fmt::Display for InsightType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsightType::Investigate => write!(f, "investigate"),
            InsightType::Configure => write!(f, "configure"),
            InsightType::UpdateDoc => write!(f, "update_doc"),
            InsightType::Escalate => write!(f, "escalate"),
        }
    }
}

/// A concrete follow-up derived from one recommended action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionableInsight {
    pub insight_id: String,
    pub description: String,
    /// System, component or document the action is about, when one is named.
    pub target: Option<String>,
    #[serde(rename = "type")]
    pub insight_type: InsightType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSource {
    Llm,
    Cache,
    Error,
}

impl std::fmt::Display for AnalysisSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisSource::Llm => write!(f, "llm"),
            AnalysisSource::Cache => write!(f, "cache"),
            AnalysisSource::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub incident_id: String,
    pub analysis_timestamp: DateTime<Utc>,
    pub llm_raw_response: Option<String>,
    pub parsed_response: Option<LlmStructuredResponse>,
    /// Heuristic quality score within [0, 1].
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub actionable_insights: Vec<ActionableInsight>,
    #[serde(default)]
    pub errors: Vec<String>,
    pub analysis_source: AnalysisSource,
    pub processing_time_seconds: Option<f64>,
    /// Incidents whose cached analysis was reused for this one.
    #[serde(default)]
    pub similar_incident_ids: Vec<String>,
}

impl AnalysisResult {
    pub fn new(incident_id: impl Into<String>) -> Self {
        Self {
            incident_id: incident_id.into(),
            analysis_timestamp: Utc::now(),
            llm_raw_response: None,
            parsed_response: None,
            confidence_score: None,
            actionable_insights: Vec::new(),
            errors: Vec::new(),
            analysis_source: AnalysisSource::Llm,
            processing_time_seconds: None,
            similar_incident_ids: Vec::new(),
        }
    }

    /// Records an error and marks the whole result as failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.analysis_source = AnalysisSource::Error;
    }
}
