use crate::store::{AnalysisStore, DatabaseConfig, SqliteStore};
use std::sync::Arc;

pub async fn create_store(config: &DatabaseConfig) -> crate::Result<Arc<dyn AnalysisStore>> {
    config.validate().map_err(crate::Error::Config)?;

    let path = config
        .sqlite_path
        .as_ref()
        .ok_or_else(|| crate::Error::Config("SQLite path not configured".into()))?;

    let store = if config.is_in_memory() {
        SqliteStore::in_memory().await?
    } else {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        SqliteStore::open(path, config.max_connections).await?
    };

    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_config_opens_a_working_store() {
        let store = create_store(&DatabaseConfig::in_memory()).await.unwrap();
        store.init().await.unwrap();
        assert_eq!(store.count_analyses().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_path_is_a_config_error() {
        let config = DatabaseConfig {
            sqlite_path: None,
            max_connections: 1,
        };
        assert!(matches!(create_store(&config).await, Err(crate::Error::Config(_))));
    }
}
