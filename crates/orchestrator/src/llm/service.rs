use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{
    cache_key, CacheStatus, GenerateRequest, GenerateResponse, GenerationCache, GenerationParams,
    StatsResponse, TextGenerator,
};
use crate::metrics;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Model not loaded")]
    ModelNotLoaded,
    #[error("Error during text generation: {0}")]
    Generation(String),
}

/// Subset of a stored response needed to answer a hit.
#[derive(Deserialize)]
struct CachedGeneration {
    text: String,
    processing_time: f64,
}

/// Cached text generation. Both the generator and the cache are optional so
/// the service stays up when either failed to initialize.
pub struct LlmService {
    generator: Option<Arc<dyn TextGenerator>>,
    cache: Option<Arc<dyn GenerationCache>>,
    cache_ttl_secs: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LlmService {
    pub fn new(
        generator: Option<Arc<dyn TextGenerator>>,
        cache: Option<Arc<dyn GenerationCache>>,
        cache_ttl_secs: u64,
    ) -> Self {
        Self {
            generator,
            cache,
            cache_ttl_secs,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn model_name(&self) -> Option<String> {
        self.generator.as_ref().map(|g| g.model_name())
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Whether Redis currently answers `PING`.
    pub async fn cache_reachable(&self) -> bool {
        match &self.cache {
            Some(cache) => cache.ping().await.is_ok(),
            None => false,
        }
    }

    pub fn stats(&self) -> StatsResponse {
        StatsResponse {
            cache_hits: self.hits.load(Ordering::Relaxed),
            cache_misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn generate(
        &self,
        request: &GenerateRequest,
        force_refresh: bool,
    ) -> Result<GenerateResponse, GenerateError> {
        let generator = self.generator.as_ref().ok_or(GenerateError::ModelNotLoaded)?;
        let key = cache_key(request);
        debug!("Generated cache key: {}", key);

        let cache_status = match (&self.cache, force_refresh) {
            (_, true) => {
                info!("Cache bypass requested for key: {}", key);
                self.record_miss();
                CacheStatus::Bypass
            }
            (None, false) => {
                warn!("Redis client not available, skipping cache check.");
                self.record_miss();
                CacheStatus::Disabled
            }
            (Some(cache), false) => match cache.get(&key).await {
                Ok(Some(raw)) => match serde_json::from_str::<CachedGeneration>(&raw) {
                    Ok(cached) => {
                        info!("Cache HIT for key: {}", key);
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        metrics::record_generation(CacheStatus::Hit);
                        return Ok(GenerateResponse {
                            text: cached.text,
                            processing_time: cached.processing_time,
                            cache_status: CacheStatus::Hit,
                        });
                    }
                    Err(e) => {
                        warn!("Error decoding cached JSON for key {}: {}. Ignoring cache.", key, e);
                        self.record_miss();
                        CacheStatus::Miss
                    }
                },
                Ok(None) => {
                    info!("Cache MISS for key: {}", key);
                    self.record_miss();
                    CacheStatus::Miss
                }
                Err(e) => {
                    warn!("Redis GET error for key {}: {}. Proceeding without cache.", key, e);
                    CacheStatus::Error
                }
            },
        };

        let start = Instant::now();
        let params = GenerationParams {
            prompt: request.prompt.clone(),
            max_tokens: request.max_length,
            temperature: request.temperature,
        };
        let generated = generator
            .generate(&params)
            .await
            .map_err(|e| GenerateError::Generation(e.to_string()))?;
        let processing_time = start.elapsed().as_secs_f64();
        info!("LLM generation took {:.2} seconds.", processing_time);

        let response = GenerateResponse {
            text: strip_prompt_echo(&generated, &request.prompt),
            processing_time,
            cache_status,
        };

        if let Some(cache) = &self.cache {
            // A failed GET suggests Redis is unhealthy, so skip the write too
            if cache_status != CacheStatus::Error {
                self.store(cache.as_ref(), &key, &response).await;
            }
        }

        metrics::record_generation(cache_status);
        Ok(response)
    }

    async fn store(&self, cache: &dyn GenerationCache, key: &str, response: &GenerateResponse) {
        let value = match serde_json::to_string(response) {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not serialize response for key {}: {}", key, e);
                return;
            }
        };
        match cache.set(key, &value, self.cache_ttl_secs).await {
            Ok(()) => info!(
                "Stored response in cache for key: {} with TTL: {}s",
                key, self.cache_ttl_secs
            ),
            Err(e) => warn!("Redis SETEX error for key {}: {}. Response not cached.", key, e),
        }
    }
}

/// Some models echo the prompt before the completion.
fn strip_prompt_echo(generated: &str, prompt: &str) -> String {
    generated
        .strip_prefix(prompt)
        .unwrap_or(generated)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockGenerationCache, MockTextGenerator};

    fn generator(text: &'static str) -> Arc<dyn TextGenerator> {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate().returning(move |_| Ok(text.to_string()));
        mock.expect_model_name().returning(|| "test-model".to_string());
        Arc::new(mock)
    }

    #[test]
    fn test_strip_prompt_echo() {
        assert_eq!(strip_prompt_echo("Q: hi\n  answer ", "Q: hi"), "answer");
        assert_eq!(strip_prompt_echo("  answer\n", "Q: hi"), "answer");
    }

    #[tokio::test]
    async fn test_model_not_loaded() {
        let service = LlmService::new(None, None, 60);
        let err = service.generate(&GenerateRequest::new("hi"), false).await.unwrap_err();
        assert!(matches!(err, GenerateError::ModelNotLoaded));
        assert_eq!(err.to_string(), "Model not loaded");
        assert_eq!(service.stats(), StatsResponse::default());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_generation() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate().never();

        let mut cache = MockGenerationCache::new();
        cache
            .expect_get()
            .returning(|_| Ok(Some(r#"{"text":"cached","processing_time":1.5,"cache_status":"miss"}"#.to_string())));
        cache.expect_set().never();

        let service = LlmService::new(Some(Arc::new(mock)), Some(Arc::new(cache)), 60);
        let resp = service.generate(&GenerateRequest::new("hi"), false).await.unwrap();

        assert_eq!(resp.text, "cached");
        assert_eq!(resp.cache_status, CacheStatus::Hit);
        assert_eq!(resp.processing_time, 1.5);
        assert_eq!(service.stats(), StatsResponse { cache_hits: 1, cache_misses: 0 });
    }

    #[tokio::test]
    async fn test_cache_miss_generates_and_stores() {
        let request = GenerateRequest::new("hi");
        let key = cache_key(&request);

        let mut cache = MockGenerationCache::new();
        let lookup_key = key.clone();
        cache
            .expect_get()
            .withf(move |k| k == lookup_key)
            .returning(|_| Ok(None));
        cache
            .expect_set()
            .withf(move |k, v, ttl| k == key && v.contains("\"text\":\"fresh\"") && *ttl == 3600)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let service = LlmService::new(Some(generator("fresh")), Some(Arc::new(cache)), 3600);
        let resp = service.generate(&request, false).await.unwrap();

        assert_eq!(resp.text, "fresh");
        assert_eq!(resp.cache_status, CacheStatus::Miss);
        assert_eq!(service.stats(), StatsResponse { cache_hits: 0, cache_misses: 1 });
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_lookup_but_stores() {
        let mut cache = MockGenerationCache::new();
        cache.expect_get().never();
        cache.expect_set().times(1).returning(|_, _, _| Ok(()));

        let service = LlmService::new(Some(generator("fresh")), Some(Arc::new(cache)), 60);
        let resp = service.generate(&GenerateRequest::new("hi"), true).await.unwrap();

        assert_eq!(resp.cache_status, CacheStatus::Bypass);
        assert_eq!(service.stats().cache_misses, 1);
    }

    #[tokio::test]
    async fn test_without_cache_reports_disabled() {
        let service = LlmService::new(Some(generator("fresh")), None, 60);
        let resp = service.generate(&GenerateRequest::new("hi"), false).await.unwrap();

        assert_eq!(resp.cache_status, CacheStatus::Disabled);
        assert_eq!(service.stats().cache_misses, 1);
        assert!(!service.cache_enabled());
    }

    #[tokio::test]
    async fn test_get_error_is_not_counted_and_not_stored() {
        let mut cache = MockGenerationCache::new();
        cache
            .expect_get()
            .returning(|_| Err(crate::Error::Internal("connection reset".to_string())));
        cache.expect_set().never();

        let service = LlmService::new(Some(generator("fresh")), Some(Arc::new(cache)), 60);
        let resp = service.generate(&GenerateRequest::new("hi"), false).await.unwrap();

        assert_eq!(resp.cache_status, CacheStatus::Error);
        assert_eq!(service.stats(), StatsResponse::default());
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_counts_as_miss() {
        let mut cache = MockGenerationCache::new();
        cache.expect_get().returning(|_| Ok(Some("not json".to_string())));
        cache.expect_set().times(1).returning(|_, _, _| Ok(()));

        let service = LlmService::new(Some(generator("fresh")), Some(Arc::new(cache)), 60);
        let resp = service.generate(&GenerateRequest::new("hi"), false).await.unwrap();

        assert_eq!(resp.cache_status, CacheStatus::Miss);
        assert_eq!(service.stats().cache_misses, 1);
    }

    #[tokio::test]
    async fn test_set_failure_still_returns_text() {
        let mut cache = MockGenerationCache::new();
        cache.expect_get().returning(|_| Ok(None));
        cache
            .expect_set()
            .returning(|_, _, _| Err(crate::Error::Internal("READONLY".to_string())));

        let service = LlmService::new(Some(generator("fresh")), Some(Arc::new(cache)), 60);
        let resp = service.generate(&GenerateRequest::new("hi"), false).await.unwrap();
        assert_eq!(resp.text, "fresh");
    }

    #[tokio::test]
    async fn test_generation_failure() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate()
            .returning(|_| Err(anyhow::anyhow!("rate limited")));

        let service = LlmService::new(Some(Arc::new(mock)), None, 60);
        let err = service.generate(&GenerateRequest::new("hi"), false).await.unwrap_err();
        assert_eq!(err.to_string(), "Error during text generation: rate limited");
    }
}
