use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, error, info};

use crate::{
    incident::AnalysisResult,
    store::{AnalysisStore, CacheEntry},
    Error, Result,
};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn open(path: &Path, max_connections: u32) -> Result<Self> {
        info!("Connecting to SQLite database: {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to connect to SQLite: {}", e);
                Error::Sqlx(e)
            })?;

        Ok(Self { pool })
    }

    /// Single pinned connection: every new `:memory:` connection is a fresh database.
    pub async fn in_memory() -> Result<Self> {
        debug!("Opening in-memory SQLite database");

        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    fn entry_from_row(row: &SqliteRow) -> Result<CacheEntry> {
        let result: AnalysisResult = serde_json::from_str(row.get::<&str, _>("result_json"))?;
        Ok(CacheEntry {
            description_hash: row.get("description_hash"),
            incident_id: row.get("incident_id"),
            result,
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        })
    }
}

#[async_trait]
impl AnalysisStore for SqliteStore {
    async fn init(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                Error::Migrate(e)
            })?;

        Ok(())
    }

    async fn get_analysis(&self, description_hash: &str) -> Result<Option<CacheEntry>> {
        debug!("Getting cached analysis: {}", description_hash);

        let row = sqlx::query(
            r#"
            SELECT description_hash, incident_id, result_json, created_at
            FROM incident_cache
            WHERE description_hash = ?1
            "#,
        )
        .bind(description_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::entry_from_row).transpose()
    }

    async fn save_analysis(
        &self,
        description_hash: &str,
        incident_id: &str,
        result: &AnalysisResult,
    ) -> Result<()> {
        debug!("Saving analysis for incident {} under {}", incident_id, description_hash);

        let result_json = serde_json::to_string(result)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO incident_cache (
                description_hash, incident_id, result_json, created_at
            ) VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(description_hash)
        .bind(incident_id)
        .bind(result_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_analyses(&self, limit: i64, offset: i64) -> Result<Vec<CacheEntry>> {
        debug!("Listing cached analyses: limit={}, offset={}", limit, offset);

        let rows = sqlx::query(
            r#"
            SELECT description_hash, incident_id, result_json, created_at
            FROM incident_cache
            ORDER BY created_at DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::entry_from_row).collect()
    }

    async fn count_analyses(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM incident_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("total"))
    }
}
