//! In-memory agent registry
//!
//! Agents live only as long as the MCP process; nothing is persisted or
//! evicted automatically.

mod models;

pub use models::{AgentInfo, AgentRegistration, AgentStatus, RegistrationResponse, StatusUpdate};

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<Uuid, AgentInfo>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, registration: AgentRegistration) -> Uuid {
        let id = Uuid::new_v4();
        let agent = AgentInfo {
            id,
            name: registration.name,
            description: registration.description,
            endpoint: registration.endpoint,
            capabilities: registration.capabilities,
            status: AgentStatus::Active,
            last_heartbeat: None,
            registered_at: Utc::now(),
        };
        info!(
            "Registered agent {} ({}) at {} with capabilities {:?}",
            agent.name, id, agent.endpoint, agent.capabilities
        );

        self.agents.write().await.insert(id, agent);
        id
    }

    pub async fn get(&self, id: &Uuid) -> Option<AgentInfo> {
        self.agents.read().await.get(id).cloned()
    }

    /// All agents, oldest registration first.
    pub async fn list(&self) -> Vec<AgentInfo> {
        let mut agents: Vec<AgentInfo> = self.agents.read().await.values().cloned().collect();
        agents.sort_by_key(|a| a.registered_at);
        agents
    }

    /// Agents advertising the capability, whatever their status.
    pub async fn by_capability(&self, capability: &str) -> Vec<AgentInfo> {
        let agents = self.agents.read().await;
        let mut matching: Vec<AgentInfo> = agents
            .values()
            .filter(|a| a.has_capability(capability))
            .cloned()
            .collect();
        matching.sort_by_key(|a| a.registered_at);
        debug!("Found {} agents with capability '{}'", matching.len(), capability);
        matching
    }

    pub async fn update_status(&self, id: &Uuid, status: AgentStatus) -> bool {
        match self.agents.write().await.get_mut(id) {
            Some(agent) => {
                info!("Agent {} status {} -> {}", id, agent.status, status);
                agent.status = status;
                true
            }
            None => {
                warn!("Status update for unknown agent {}", id);
                false
            }
        }
    }

    /// Stamps the heartbeat time and reactivates the agent if needed.
    pub async fn heartbeat(&self, id: &Uuid) -> Option<AgentInfo> {
        let mut agents = self.agents.write().await;
        let agent = agents.get_mut(id)?;
        agent.last_heartbeat = Some(Utc::now());
        if agent.status == AgentStatus::Inactive {
            info!("Agent {} reactivated by heartbeat", id);
            agent.status = AgentStatus::Active;
        }
        Some(agent.clone())
    }

    pub async fn deregister(&self, id: &Uuid) -> bool {
        let removed = self.agents.write().await.remove(id);
        if let Some(agent) = &removed {
            info!("Deregistered agent {} ({})", agent.name, id);
        }
        removed.is_some()
    }
}
