use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::llm::LLMConfig;
use crate::store::DatabaseConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mcp: McpConfig,
    pub incident: IncidentAgentConfig,
    pub llm: LlmServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    pub addr: String,
    pub agent_request_timeout_secs: u64,
    /// Shared secret expected in `X-GMAO-Token`. Webhook is refused when unset.
    #[serde(skip_serializing)]
    pub gmao_webhook_api_key: Option<String>,
    pub incident_agent_url: String,
    pub forward_max_attempts: u32,
    pub forward_retry_delays_secs: Vec<u64>,
    pub forward_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentAgentConfig {
    pub addr: String,
    pub mcp_endpoint: String,
    pub agent_endpoint: String,
    pub llm_service_url: String,
    pub llm_timeout_secs: u64,
    pub max_length: u32,
    pub temperature: f32,
    pub heartbeat_interval_secs: u64,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmServiceConfig {
    pub addr: String,
    pub redis_url: String,
    pub cache_ttl_secs: u64,
    pub provider: LLMConfig,
}

impl McpConfig {
    pub fn agent_request_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_request_timeout_secs)
    }

    pub fn forward_retry_delays(&self) -> Vec<Duration> {
        self.forward_retry_delays_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_setting<T: std::str::FromStr>(key: &str, raw: &str) -> crate::Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| crate::Error::Config(format!("Invalid value '{}' for {}", raw, key)))
}

/// Unset falls back to `default`; a set but unparseable value is an error.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> crate::Result<T> {
    match std::env::var(key) {
        Ok(raw) => parse_setting(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_delay_table(raw: &str) -> crate::Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>().map_err(|_| {
                crate::Error::Config(format!("Invalid retry delay '{}' in FORWARD_RETRY_DELAYS_SECS", s))
            })
        })
        .collect()
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let defaults = Config::default();

        let redis_url = match std::env::var("REDIS_URL") {
            Ok(url) => url,
            Err(_) => format!(
                "redis://{}:{}/{}",
                env_or("REDIS_HOST", "localhost"),
                env_parse("REDIS_PORT", 6379u16)?,
                env_parse("REDIS_DB", 0u32)?,
            ),
        };

        let config = Config {
            mcp: McpConfig {
                addr: env_or("MCP_ADDR", &defaults.mcp.addr),
                agent_request_timeout_secs: env_parse(
                    "AGENT_REQUEST_TIMEOUT_SECS",
                    defaults.mcp.agent_request_timeout_secs,
                )?,
                gmao_webhook_api_key: std::env::var("GMAO_WEBHOOK_API_KEY")
                    .ok()
                    .filter(|k| !k.is_empty()),
                incident_agent_url: env_or("INCIDENT_AGENT_URL", &defaults.mcp.incident_agent_url),
                forward_max_attempts: env_parse(
                    "FORWARD_MAX_ATTEMPTS",
                    defaults.mcp.forward_max_attempts,
                )?,
                forward_retry_delays_secs: match std::env::var("FORWARD_RETRY_DELAYS_SECS") {
                    Ok(raw) => parse_delay_table(&raw)?,
                    Err(_) => defaults.mcp.forward_retry_delays_secs.clone(),
                },
                forward_timeout_secs: env_parse(
                    "FORWARD_TIMEOUT_SECS",
                    defaults.mcp.forward_timeout_secs,
                )?,
            },
            incident: IncidentAgentConfig {
                addr: env_or("INCIDENT_AGENT_ADDR", &defaults.incident.addr),
                mcp_endpoint: env_or("MCP_ENDPOINT", &defaults.incident.mcp_endpoint),
                agent_endpoint: env_or("AGENT_ENDPOINT", &defaults.incident.agent_endpoint),
                llm_service_url: env_or("LLM_SERVICE_URL", &defaults.incident.llm_service_url),
                llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS", defaults.incident.llm_timeout_secs)?,
                max_length: env_parse("LLM_MAX_LENGTH", defaults.incident.max_length)?,
                temperature: env_parse("LLM_TEMPERATURE", defaults.incident.temperature)?,
                heartbeat_interval_secs: env_parse(
                    "HEARTBEAT_INTERVAL_SECS",
                    defaults.incident.heartbeat_interval_secs,
                )?,
                database: DatabaseConfig {
                    sqlite_path: std::env::var("CACHE_DB_PATH")
                        .map(PathBuf::from)
                        .ok()
                        .or_else(|| defaults.incident.database.sqlite_path.clone()),
                    max_connections: env_parse(
                        "DATABASE_MAX_CONNECTIONS",
                        defaults.incident.database.max_connections,
                    )?,
                },
            },
            llm: LlmServiceConfig {
                addr: env_or("LLM_SERVICE_ADDR", &defaults.llm.addr),
                redis_url,
                cache_ttl_secs: env_parse("REDIS_LLM_TTL_SECONDS", defaults.llm.cache_ttl_secs)?,
                provider: LLMConfig {
                    provider: env_or("LLM_PROVIDER", &defaults.llm.provider.provider),
                    model: env_or("LLM_MODEL", &defaults.llm.provider.model),
                    api_key: std::env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()),
                    endpoint: std::env::var("LLM_ENDPOINT").ok(),
                },
            },
        };

        if config.mcp.gmao_webhook_api_key.is_none() {
            tracing::warn!("GMAO_WEBHOOK_API_KEY is not set. The GMAO webhook will reject all requests.");
        }

        if config.mcp.forward_max_attempts == 0 {
            return Err(crate::Error::Config(
                "FORWARD_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        if config.incident.database.sqlite_path.is_none() {
            return Err(crate::Error::Config(
                "CACHE_DB_PATH must be set for the incident cache".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&config.incident.temperature) {
            return Err(crate::Error::Config(format!(
                "LLM_TEMPERATURE must be within [0, 2], got {}",
                config.incident.temperature
            )));
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mcp: McpConfig {
                addr: "0.0.0.0:8002".to_string(),
                agent_request_timeout_secs: 10,
                gmao_webhook_api_key: None,
                incident_agent_url: "http://localhost:8003/api/analyze".to_string(),
                forward_max_attempts: 3,
                forward_retry_delays_secs: vec![2, 5],
                forward_timeout_secs: 30,
            },
            incident: IncidentAgentConfig {
                addr: "0.0.0.0:8003".to_string(),
                mcp_endpoint: "http://localhost:8002/api".to_string(),
                agent_endpoint: "http://localhost:8003/api".to_string(),
                llm_service_url: "http://localhost:8001/generate".to_string(),
                llm_timeout_secs: 60,
                max_length: 2048,
                temperature: 0.7,
                heartbeat_interval_secs: 30,
                database: DatabaseConfig::default(),
            },
            llm: LlmServiceConfig {
                addr: "0.0.0.0:8001".to_string(),
                redis_url: "redis://localhost:6379/0".to_string(),
                cache_ttl_secs: 24 * 60 * 60,
                provider: LLMConfig::default(),
            },
        }
    }
}
