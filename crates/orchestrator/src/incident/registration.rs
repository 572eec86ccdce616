//! Self-registration of the incident agent with the MCP

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::registry::{AgentRegistration, RegistrationResponse};
use crate::{Error, Result};

pub const AGENT_NAME: &str = "Incident Analysis Agent";
pub const AGENT_DESCRIPTION: &str =
    "Analyzes incident reports to identify causes and solutions using LLM and caching";
pub const AGENT_CAPABILITIES: [&str; 4] = [
    "incident_analysis",
    "root_cause_identification",
    "solution_recommendation",
    "cached_incident_retrieval",
];

/// Registration handle shared with the HTTP layer; `None` until MCP accepts us.
pub type AgentIdSlot = Arc<RwLock<Option<Uuid>>>;

#[derive(Clone)]
pub struct McpClient {
    client: reqwest::Client,
    /// MCP API base, e.g. `http://localhost:8002/api`
    base_url: String,
}

impl McpClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn registration(agent_endpoint: &str) -> AgentRegistration {
        AgentRegistration {
            name: AGENT_NAME.to_string(),
            description: AGENT_DESCRIPTION.to_string(),
            endpoint: agent_endpoint.to_string(),
            capabilities: AGENT_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub async fn register(&self, registration: &AgentRegistration) -> Result<Uuid> {
        let url = format!("{}/agents/register", self.base_url);
        info!("Attempting to register with MCP at {}...", url);

        let response = self.client.post(&url).json(registration).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Internal(format!(
                "MCP registration failed ({}): {}",
                status, body
            )));
        }

        let body: RegistrationResponse = response.json().await?;
        info!("Successfully registered with MCP. Agent ID: {}", body.agent_id);
        Ok(body.agent_id)
    }

    /// `Ok(false)` when MCP no longer knows the agent.
    pub async fn heartbeat(&self, agent_id: &Uuid) -> Result<bool> {
        let url = format!("{}/agents/{}/heartbeat", self.base_url, agent_id);
        let response = self.client.put(&url).send().await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => Err(Error::Internal(format!("MCP heartbeat failed with status {}", s))),
        }
    }

    /// Registers, then heartbeats forever. Re-registers when MCP forgot us
    /// (it keeps no state across restarts) or when the first attempt failed.
    pub async fn run(self, registration: AgentRegistration, slot: AgentIdSlot, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;

            let current = *slot.read().await;
            match current {
                None => match self.register(&registration).await {
                    Ok(id) => *slot.write().await = Some(id),
                    Err(e) => error!("Error registering with MCP: {}", e),
                },
                Some(id) => match self.heartbeat(&id).await {
                    Ok(true) => debug!("Heartbeat sent for agent {}", id),
                    Ok(false) => {
                        warn!("MCP does not know agent {}; registering again", id);
                        *slot.write().await = None;
                    }
                    Err(e) => warn!("Heartbeat to MCP failed: {}", e),
                },
            }
        }
    }
}
