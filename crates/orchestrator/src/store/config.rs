use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,

    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: Some(PathBuf::from("data/incident_cache.db")),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: Some(PathBuf::from(":memory:")),
            max_connections: 1,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sqlite_path.is_none() {
            return Err("SQLite path is required for the incident cache".to_string());
        }
        if self.max_connections == 0 {
            return Err("max_connections must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn is_in_memory(&self) -> bool {
        self.sqlite_path
            .as_ref()
            .map(|p| p.as_os_str() == ":memory:")
            .unwrap_or(false)
    }
}
