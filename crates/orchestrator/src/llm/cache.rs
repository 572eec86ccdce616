//! Redis-backed generation cache

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::GenerateRequest;
use crate::Result;

pub const CACHE_KEY_PREFIX: &str = "llm_cache:";

/// `llm_cache:` + hex SHA-256 of the request as JSON with sorted keys.
pub fn cache_key(request: &GenerateRequest) -> String {
    let canonical: BTreeMap<&str, Value> = BTreeMap::from([
        ("max_length", json!(request.max_length)),
        ("prompt", json!(request.prompt)),
        ("temperature", json!(request.temperature)),
    ]);
    // Serializing a map of known keys cannot fail
    let encoded = serde_json::to_string(&canonical).unwrap_or_default();
    let digest = Sha256::digest(encoded.as_bytes());
    format!("{}{:x}", CACHE_KEY_PREFIX, digest)
}

/// Key/value store for serialized generation results.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GenerationCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connects and verifies the server answers `PING`.
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to Redis at {}", url);
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        let cache = Self { conn };
        cache.ping().await?;
        info!("Successfully connected to Redis");
        Ok(cache)
    }
}

#[async_trait::async_trait]
impl GenerationCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        debug!("Redis GET {} -> {}", key, if value.is_some() { "hit" } else { "miss" });
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_shape() {
        let key = cache_key(&GenerateRequest::new("hello"));
        assert!(key.starts_with("llm_cache:"));
        assert_eq!(key.len(), CACHE_KEY_PREFIX.len() + 64);
    }

    #[test]
    fn test_cache_key_depends_on_every_field() {
        let base = GenerateRequest::new("hello");
        let key = cache_key(&base);

        assert_eq!(key, cache_key(&base.clone()));
        assert_ne!(key, cache_key(&GenerateRequest::new("hello!")));
        assert_ne!(
            key,
            cache_key(&GenerateRequest {
                max_length: 100,
                ..base.clone()
            })
        );
        assert_ne!(
            key,
            cache_key(&GenerateRequest {
                temperature: 0.2,
                ..base
            })
        );
    }
}
