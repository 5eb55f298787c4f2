//! HTTP backends for the supported LLM providers.

mod gemini;
mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

pub use gemini::GeminiBackend;
pub use openai::OpenAiCompatibleBackend;

use super::client::{LlmConfig, LlmProvider, ModelId};
use super::stats::TokenUsage;
use super::LlmError;
use crate::rate_limit::parse_retry_after;

/// One completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    /// Instructions for the model.
    pub prompt: String,
    /// Page text the instructions apply to.
    pub data: String,
    pub temperature: f32,
    pub thinking_budget: i32,
}

/// Raw model output and the usage reported for it.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    /// Characters sent, after provider-specific prompt assembly.
    pub prompt_chars: usize,
}

/// A provider able to run one JSON-mode completion.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn provider(&self) -> LlmProvider;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;
}

/// Builds a backend for a model.
pub trait BackendFactory: Send + Sync {
    fn backend(&self, model: ModelId) -> Result<Arc<dyn LlmBackend>, LlmError>;
}

/// Factory for the real HTTP backends, sharing one connection pool.
pub struct HttpBackendFactory {
    client: Client,
    config: LlmConfig,
}

impl HttpBackendFactory {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .map_err(|e| LlmError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }
}

impl BackendFactory for HttpBackendFactory {
    fn backend(&self, model: ModelId) -> Result<Arc<dyn LlmBackend>, LlmError> {
        let provider = model.provider();
        let api_key = self.config.api_key(provider).ok_or_else(|| {
            LlmError::Config(format!(
                "{} is not set; cannot use {}",
                provider.api_key_env(),
                model
            ))
        })?;
        let endpoint = self.config.endpoint(provider);

        let backend: Arc<dyn LlmBackend> = match provider {
            LlmProvider::DeepSeek => Arc::new(OpenAiCompatibleBackend::new(
                self.client.clone(),
                endpoint,
                api_key,
            )),
            LlmProvider::Gemini => {
                Arc::new(GeminiBackend::new(self.client.clone(), endpoint, api_key))
            }
        };
        Ok(backend)
    }
}

/// Turn a non-success response into an [`LlmError`].
async fn error_from_response(resp: reqwest::Response) -> LlmError {
    let status = resp.status().as_u16();
    let retry_after = parse_retry_after(
        resp.headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
    );
    let body = resp.text().await.unwrap_or_default();
    LlmError::from_status(status, &body, retry_after)
}

fn connection_error(e: reqwest::Error) -> LlmError {
    LlmError::Connection(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_without_keys() -> LlmConfig {
        let mut config: LlmConfig = toml::from_str("").unwrap();
        config.deepseek_api_key = None;
        config.gemini_api_key = None;
        config
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let factory = HttpBackendFactory::new(config_without_keys()).unwrap();
        let err = factory.backend(ModelId::Gemini25Flash).err().unwrap();
        assert!(matches!(err, LlmError::Config(_)));
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_backend_matches_provider() {
        let mut config = config_without_keys();
        config.deepseek_api_key = Some("k".to_string());
        let factory = HttpBackendFactory::new(config).unwrap();
        let backend = factory.backend(ModelId::DeepseekChat).unwrap();
        assert_eq!(backend.provider(), LlmProvider::DeepSeek);
    }
}
