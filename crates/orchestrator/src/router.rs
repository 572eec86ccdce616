//! Capability-based fan-out of messages to registered agents

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::metrics;
use crate::registry::{AgentInfo, AgentRegistry, AgentStatus};
use crate::Result;

/// Outcome of delivering one message to one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AgentDispatch {
    Success {
        status_code: u16,
        data: Value,
    },
    #[serde(rename = "error")]
    Failure {
        error: String,
        details: Value,
        status_code: Option<u16>,
    },
}

impl AgentDispatch {
    pub fn is_success(&self) -> bool {
        matches!(self, AgentDispatch::Success { .. })
    }

    fn outcome_label(&self) -> &'static str {
        match self {
            AgentDispatch::Success { .. } => "success",
            AgentDispatch::Failure { .. } => "error",
        }
    }
}

#[derive(Clone)]
pub struct MessageRouter {
    registry: AgentRegistry,
    client: reqwest::Client,
}

impl MessageRouter {
    pub fn new(registry: AgentRegistry, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { registry, client })
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Sends `payload` to every active agent with `capability`, concurrently.
    /// The result is keyed by agent id; agents without a reply never block the others.
    pub async fn route(&self, capability: &str, payload: &Value) -> HashMap<String, AgentDispatch> {
        info!("Routing message requiring capability: {}", capability);

        let active: Vec<AgentInfo> = self
            .registry
            .by_capability(capability)
            .await
            .into_iter()
            .filter(|a| a.status == AgentStatus::Active)
            .collect();

        if active.is_empty() {
            warn!("No active agents found with capability: {}", capability);
            return HashMap::new();
        }

        info!(
            "Found {} active agents for capability '{}': {:?}",
            active.len(),
            capability,
            active.iter().map(|a| a.name.as_str()).collect::<Vec<_>>()
        );

        let sends = active.iter().map(|agent| async move {
            let outcome = self.send(agent, payload).await;
            metrics::record_dispatch(outcome.outcome_label());
            (agent.id.to_string(), outcome)
        });
        let responses: HashMap<String, AgentDispatch> = join_all(sends).await.into_iter().collect();

        info!(
            "Finished routing message for capability '{}'. Returning {} responses.",
            capability,
            responses.len()
        );
        responses
    }

    fn timed_out(agent: &AgentInfo, url: &str, e: &reqwest::Error) -> AgentDispatch {
        let message = format!("Timeout contacting agent {}", agent.name);
        error!("{} ({}) at {}", message, agent.id, url);
        AgentDispatch::Failure {
            error: message,
            details: Value::String(e.to_string()),
            status_code: None,
        }
    }

    async fn send(&self, agent: &AgentInfo, payload: &Value) -> AgentDispatch {
        let url = format!("{}/process", agent.endpoint.trim_end_matches('/'));
        info!("Sending message to agent {} ({}) at {}", agent.name, agent.id, url);

        let response = match self.client.post(&url).json(payload).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Self::timed_out(agent, &url, &e),
            Err(e) => {
                let message = format!("Network error contacting agent {}", agent.name);
                error!("{} ({}): {}", message, agent.id, e);
                return AgentDispatch::Failure {
                    error: message,
                    details: Value::String(e.to_string()),
                    status_code: None,
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            let message = format!("HTTP error from agent {}: {}", agent.name, status.as_u16());
            error!("{} ({})", message, agent.id);
            let body = response.text().await.unwrap_or_default();
            let details = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));
            return AgentDispatch::Failure {
                error: message,
                details,
                status_code: Some(status.as_u16()),
            };
        }

        match response.json::<Value>().await {
            Ok(data) => {
                info!(
                    "Received successful response from agent {} ({}): {}",
                    agent.name,
                    agent.id,
                    status.as_u16()
                );
                AgentDispatch::Success {
                    status_code: status.as_u16(),
                    data,
                }
            }
            // The deadline also covers reading the body
            Err(e) if e.is_timeout() => Self::timed_out(agent, &url, &e),
            Err(e) => {
                let message = format!("Unexpected error processing response from agent {}", agent.name);
                error!("{} ({}): {}", message, agent.id, e);
                AgentDispatch::Failure {
                    error: message,
                    details: Value::String(e.to_string()),
                    status_code: Some(status.as_u16()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_serialization() {
        let ok = AgentDispatch::Success {
            status_code: 200,
            data: json!({"result": "done"}),
        };
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"status": "success", "status_code": 200, "data": {"result": "done"}})
        );

        let failed = AgentDispatch::Failure {
            error: "Timeout contacting agent a".to_string(),
            details: json!("operation timed out"),
            status_code: None,
        };
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["status"], json!("error"));
        assert!(!failed.is_success());
    }

    #[tokio::test]
    async fn test_no_agents_returns_empty_map() {
        let router = MessageRouter::new(AgentRegistry::new(), Duration::from_secs(1)).unwrap();
        assert!(router.route("nothing", &json!({})).await.is_empty());
    }
}
