mod config;
mod factory;
mod models;
mod sqlite;

pub use config::DatabaseConfig;
pub use factory::create_store;
pub use models::CacheEntry;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::incident::AnalysisResult;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    // Initialize database schema
    async fn init(&self) -> crate::Result<()>;

    async fn get_analysis(&self, description_hash: &str) -> crate::Result<Option<CacheEntry>>;

    // Last write wins on an identical hash
    async fn save_analysis(
        &self,
        description_hash: &str,
        incident_id: &str,
        result: &AnalysisResult,
    ) -> crate::Result<()>;

    async fn list_analyses(&self, limit: i64, offset: i64) -> crate::Result<Vec<CacheEntry>>;

    async fn count_analyses(&self) -> crate::Result<i64>;
}
