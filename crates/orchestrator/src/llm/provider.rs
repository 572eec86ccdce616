//! Text generation providers
//!
//! A single seam over the hosted model APIs, built on Rig.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use rig::completion::Prompt;
use rig::providers::{anthropic, openai};

use super::LLMConfig;

/// Per-request generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Anything that can turn a prompt into text
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, params: &GenerationParams) -> Result<String>;

    /// Model identifier reported on the status endpoint
    fn model_name(&self) -> String;
}

/// Configured key, else the provider's own environment variable. Empty values count as unset.
fn resolve_api_key(configured: Option<String>, env_var: &str) -> Result<String> {
    configured
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var(env_var).ok().filter(|k| !k.trim().is_empty()))
        .ok_or_else(|| anyhow::anyhow!("API key not configured: set LLM_API_KEY or {}", env_var))
}

/// Anthropic Claude through Rig
pub struct AnthropicGenerator {
    client: anthropic::Client,
    model: String,
}

impl AnthropicGenerator {
    pub fn new(api_key: Option<String>, endpoint: Option<String>, model: &str) -> Result<Self> {
        let key = resolve_api_key(api_key, "ANTHROPIC_API_KEY")?;
        let client = anthropic::Client::new(
            &key,
            endpoint.as_deref().unwrap_or("https://api.anthropic.com"),
            None,
            anthropic::ANTHROPIC_VERSION_LATEST,
        );

        Ok(Self {
            client,
            model: model.to_string(),
        })
    }

    fn model_id(&self) -> &str {
        match self.model.as_str() {
            "claude-3-5-sonnet" => anthropic::CLAUDE_3_5_SONNET,
            "claude-3-7-sonnet" => anthropic::CLAUDE_3_7_SONNET,
            "claude-3-haiku" => anthropic::CLAUDE_3_HAIKU,
            "claude-3-opus" => anthropic::CLAUDE_3_OPUS,
            other => other,
        }
    }
}

#[async_trait::async_trait]
impl TextGenerator for AnthropicGenerator {
    async fn generate(&self, params: &GenerationParams) -> Result<String> {
        let agent = self
            .client
            .agent(self.model_id())
            .temperature(params.temperature as f64)
            .max_tokens(params.max_tokens as u64)
            .build();

        agent
            .prompt(params.prompt.as_str())
            .await
            .map_err(|e| anyhow::anyhow!("Anthropic API error: {:?}", e))
    }

    fn model_name(&self) -> String {
        self.model_id().to_string()
    }
}

/// OpenAI (or any OpenAI-compatible endpoint) through Rig
pub struct OpenAIGenerator {
    client: openai::Client,
    model: String,
}

impl OpenAIGenerator {
    pub fn new(api_key: Option<String>, endpoint: Option<String>, model: &str) -> Result<Self> {
        let key = resolve_api_key(api_key, "OPENAI_API_KEY")?;
        let client = match endpoint {
            Some(url) => openai::Client::from_url(&key, &url),
            None => openai::Client::new(&key),
        };

        Ok(Self {
            client,
            model: model.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl TextGenerator for OpenAIGenerator {
    async fn generate(&self, params: &GenerationParams) -> Result<String> {
        let agent = self
            .client
            .agent(&self.model)
            .temperature(params.temperature as f64)
            .max_tokens(params.max_tokens as u64)
            .build();

        agent
            .prompt(params.prompt.as_str())
            .await
            .map_err(|e| anyhow::anyhow!("OpenAI API error: {:?}", e))
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

/// Offline generator that answers incident prompts with a fixed analysis.
pub struct MockGenerator;

const MOCK_ANALYSIS: &str = r#"```json
{
  "potential_root_causes": [
    "Resource exhaustion on the affected system.",
    "Recent configuration change."
  ],
  "recommended_actions": [
    "Check logs on the affected system for errors.",
    "Configure alerting thresholds for resource usage.",
    "Escalate to the on-call engineer if the issue persists."
  ],
  "potential_impact": "Degraded service for dependent systems.",
  "confidence_explanation": "Generated by the offline mock generator."
}
```"#;

#[async_trait::async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, params: &GenerationParams) -> Result<String> {
        if params.prompt.contains("incident report") {
            Ok(MOCK_ANALYSIS.to_string())
        } else {
            Ok(format!(
                "Mock response to: {}",
                params.prompt.chars().take(50).collect::<String>()
            ))
        }
    }

    fn model_name(&self) -> String {
        "mock".to_string()
    }
}

/// Create a generator from configuration
pub fn create_generator(config: &LLMConfig) -> Result<Arc<dyn TextGenerator>> {
    info!("Loading {} generator with model {}", config.provider, config.model);
    match config.provider.as_str() {
        "anthropic" | "claude" => Ok(Arc::new(AnthropicGenerator::new(
            config.api_key.clone(),
            config.endpoint.clone(),
            &config.model,
        )?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(
            config.api_key.clone(),
            config.endpoint.clone(),
            &config.model,
        )?)),
        "mock" => Ok(Arc::new(MockGenerator)),
        other => Err(anyhow::anyhow!("Unknown LLM provider: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_generator_answers_incident_prompts() {
        let params = GenerationParams {
            prompt: "Analyze the following incident report and provide JSON".to_string(),
            max_tokens: 256,
            temperature: 0.0,
        };
        let text = MockGenerator.generate(&params).await.unwrap();
        assert!(text.contains("potential_root_causes"));
    }

    #[test]
    fn test_create_generator() {
        let mock = create_generator(&LLMConfig::default()).unwrap();
        assert_eq!(mock.model_name(), "mock");

        let unknown = LLMConfig {
            provider: "carrier-pigeon".to_string(),
            ..LLMConfig::default()
        };
        assert!(create_generator(&unknown).is_err());
    }

    #[test]
    fn test_api_key_resolution() {
        let key = resolve_api_key(Some("sk-test".to_string()), "GMAO_UNSET_PROVIDER_KEY").unwrap();
        assert_eq!(key, "sk-test");

        assert!(resolve_api_key(None, "GMAO_UNSET_PROVIDER_KEY").is_err());
        assert!(resolve_api_key(Some("  ".to_string()), "GMAO_UNSET_PROVIDER_KEY").is_err());
    }

    #[test]
    fn test_hosted_provider_without_key_is_an_error() {
        for (provider, env_var) in [("anthropic", "ANTHROPIC_API_KEY"), ("openai", "OPENAI_API_KEY")] {
            // Only meaningful when the provider's own variable is absent
            if std::env::var(env_var).is_ok() {
                continue;
            }
            let config = LLMConfig {
                provider: provider.to_string(),
                model: "some-model".to_string(),
                api_key: None,
                endpoint: None,
            };
            let err = create_generator(&config).err().expect("keyless provider must not build");
            assert!(err.to_string().contains(env_var));
        }
    }

    #[test]
    fn test_hosted_provider_with_key_builds() {
        let config = LLMConfig {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: Some("sk-test".to_string()),
            endpoint: Some("http://127.0.0.1:9/v1".to_string()),
        };
        let generator = create_generator(&config).unwrap();
        assert_eq!(generator.model_name(), "gpt-4o-mini");
    }
}
