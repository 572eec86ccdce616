use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_LENGTH: u32 = 2048;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

fn default_max_length() -> u32 {
    DEFAULT_MAX_LENGTH
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default = "default_max_length")]
    pub max_length: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_length: DEFAULT_MAX_LENGTH,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
    /// `force_refresh` skipped the lookup.
    Bypass,
    /// Redis is not connected.
    Disabled,
    /// The lookup itself failed.
    Error,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Bypass => "bypass",
            CacheStatus::Disabled => "disabled",
            CacheStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,
    /// Seconds spent generating, or the original generation time on a hit.
    pub processing_time: f64,
    pub cache_status: CacheStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_defaults() {
        let req: GenerateRequest = serde_json::from_value(json!({"prompt": "hi"})).unwrap();
        assert_eq!(req.max_length, 2048);
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn cache_status_is_lowercase() {
        let resp = GenerateResponse {
            text: "x".to_string(),
            processing_time: 0.1,
            cache_status: CacheStatus::Bypass,
        };
        assert_eq!(serde_json::to_value(&resp).unwrap()["cache_status"], json!("bypass"));
    }
}
