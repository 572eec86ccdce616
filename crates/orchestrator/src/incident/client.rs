use std::time::Duration;
use tracing::{debug, error};

use crate::llm::{GenerateRequest, GenerateResponse};
use crate::{Error, Result};

/// Completion seam used by the analyzer.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Calls the LLM service's `/generate` endpoint.
pub struct HttpLlmClient {
    client: reqwest::Client,
    url: String,
    max_length: u32,
    temperature: f32,
}

impl HttpLlmClient {
    pub fn new(url: impl Into<String>, timeout: Duration, max_length: u32, temperature: f32) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            max_length,
            temperature,
        })
    }
}

#[async_trait::async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            prompt: prompt.to_string(),
            max_length: self.max_length,
            temperature: self.temperature,
        };

        debug!("Calling LLM service at {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                error!("Error calling LLM service at {}: {}", self.url, e);
                Error::Llm(e.to_string())
            })?;

        let body: GenerateResponse = response.json().await.map_err(|e| {
            error!("Invalid response from LLM service: {}", e);
            Error::Llm(e.to_string())
        })?;
        debug!(
            "LLM service answered in {:.2}s (cache {})",
            body.processing_time,
            body.cache_status.as_str()
        );

        Ok(body.text)
    }
}
