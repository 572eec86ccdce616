use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::incident::AnalysisResult;

// One cached analysis, keyed by the hash of the normalized incident description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub description_hash: String,
    pub incident_id: String,
    pub result: AnalysisResult,
    pub created_at: DateTime<Utc>,
}
