//! LLM client configuration.

use serde::{Deserialize, Serialize};

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// DeepSeek through its OpenAI-compatible chat completions API.
    DeepSeek,
    /// Google Gemini `generateContent` API.
    Gemini,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek",
            Self::Gemini => "gemini",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::DeepSeek => "DEEPSEEK_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }
}

/// Supported extraction models.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum ModelId {
    #[default]
    #[serde(rename = "deepseek-reasoner")]
    #[value(name = "deepseek-reasoner")]
    DeepseekReasoner,
    #[serde(rename = "deepseek-chat")]
    #[value(name = "deepseek-chat")]
    DeepseekChat,
    #[serde(rename = "gemini-2.5-flash")]
    #[value(name = "gemini-2.5-flash")]
    Gemini25Flash,
    #[serde(rename = "gemini-2.5-pro")]
    #[value(name = "gemini-2.5-pro")]
    Gemini25Pro,
    #[serde(rename = "gemini-3-flash-preview")]
    #[value(name = "gemini-3-flash-preview")]
    Gemini3FlashPreview,
}

impl ModelId {
    pub const ALL: [ModelId; 5] = [
        Self::DeepseekReasoner,
        Self::DeepseekChat,
        Self::Gemini25Flash,
        Self::Gemini25Pro,
        Self::Gemini3FlashPreview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeepseekReasoner => "deepseek-reasoner",
            Self::DeepseekChat => "deepseek-chat",
            Self::Gemini25Flash => "gemini-2.5-flash",
            Self::Gemini25Pro => "gemini-2.5-pro",
            Self::Gemini3FlashPreview => "gemini-3-flash-preview",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }

    pub fn provider(&self) -> LlmProvider {
        match self {
            Self::DeepseekReasoner | Self::DeepseekChat => LlmProvider::DeepSeek,
            Self::Gemini25Flash | Self::Gemini25Pro | Self::Gemini3FlashPreview => {
                LlmProvider::Gemini
            }
        }
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the extraction client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model used when neither the CLI nor the prompt file picks one.
    #[serde(default)]
    pub default_model: ModelId,
    /// DeepSeek (OpenAI-compatible) API base URL.
    #[serde(default = "default_deepseek_endpoint")]
    pub deepseek_endpoint: String,
    /// Gemini API base URL.
    #[serde(default = "default_gemini_endpoint")]
    pub gemini_endpoint: String,
    /// Default sampling temperature.
    #[serde(default)]
    pub temperature: f32,
    /// Default Gemini thinking budget in tokens (-1 lets the model decide).
    #[serde(default = "default_thinking_budget")]
    pub thinking_budget: i32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Attempt ceiling for one extraction.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Where raw responses that failed validation are saved.
    #[serde(default = "default_invalid_output_dir")]
    pub invalid_output_dir: String,
    /// API keys come from the environment only.
    #[serde(skip)]
    pub deepseek_api_key: Option<String>,
    #[serde(skip)]
    pub gemini_api_key: Option<String>,
}

fn default_deepseek_endpoint() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_gemini_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_thinking_budget() -> i32 {
    5000
}

fn default_request_timeout() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_invalid_output_dir() -> String {
    "outputs".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl LlmConfig {
    /// Base default without env overrides.
    fn base_default() -> Self {
        Self {
            default_model: ModelId::default(),
            deepseek_endpoint: default_deepseek_endpoint(),
            gemini_endpoint: default_gemini_endpoint(),
            temperature: 0.0,
            thinking_budget: default_thinking_budget(),
            request_timeout: default_request_timeout(),
            max_attempts: default_max_attempts(),
            invalid_output_dir: default_invalid_output_dir(),
            deepseek_api_key: None,
            gemini_api_key: None,
        }
    }

    /// Check if the config equals the default (for skip_serializing_if).
    pub fn is_default(&self) -> bool {
        let mut bare = self.clone();
        bare.deepseek_api_key = None;
        bare.gemini_api_key = None;
        bare == Self::base_default()
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `DEEPSEEK_API_KEY`, `GEMINI_API_KEY`: provider credentials
    /// - `DEEPSEEK_ENDPOINT`, `GEMINI_ENDPOINT`: API base URLs
    /// - `TRAILSYNC_MODEL`: default model identifier
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("DEEPSEEK_API_KEY") {
            if !key.is_empty() {
                self.deepseek_api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                self.gemini_api_key = Some(key);
            }
        }
        if let Ok(endpoint) = std::env::var("DEEPSEEK_ENDPOINT") {
            self.deepseek_endpoint = endpoint;
        }
        if let Ok(endpoint) = std::env::var("GEMINI_ENDPOINT") {
            self.gemini_endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("TRAILSYNC_MODEL") {
            match ModelId::from_str(&model) {
                Some(model) => self.default_model = model,
                None => tracing::warn!("Ignoring unknown TRAILSYNC_MODEL '{}'", model),
            }
        }
        self
    }

    pub fn api_key(&self, provider: LlmProvider) -> Option<&str> {
        match provider {
            LlmProvider::DeepSeek => self.deepseek_api_key.as_deref(),
            LlmProvider::Gemini => self.gemini_api_key.as_deref(),
        }
    }

    pub fn endpoint(&self, provider: LlmProvider) -> &str {
        match provider {
            LlmProvider::DeepSeek => &self.deepseek_endpoint,
            LlmProvider::Gemini => &self.gemini_endpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_provider_mapping() {
        assert_eq!(ModelId::DeepseekChat.provider(), LlmProvider::DeepSeek);
        assert_eq!(ModelId::Gemini3FlashPreview.provider(), LlmProvider::Gemini);
        assert_eq!(ModelId::from_str("gemini-2.5-flash"), Some(ModelId::Gemini25Flash));
        assert_eq!(ModelId::from_str("gpt-4o"), None);
    }

    #[test]
    fn test_model_serde_names() {
        let json = serde_json::to_string(&ModelId::Gemini25Pro).unwrap();
        assert_eq!(json, "\"gemini-2.5-pro\"");
        let parsed: ModelId = serde_json::from_str("\"deepseek-reasoner\"").unwrap();
        assert_eq!(parsed, ModelId::DeepseekReasoner);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: LlmConfig = toml::from_str("temperature = 0.2").unwrap();
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.thinking_budget, 5000);
        assert_eq!(config.default_model, ModelId::DeepseekReasoner);
        assert!(config.deepseek_api_key.is_none());
    }

    #[test]
    fn test_is_default_ignores_keys() {
        let mut config = LlmConfig::base_default();
        config.gemini_api_key = Some("secret".to_string());
        assert!(config.is_default());
        config.max_attempts = 5;
        assert!(!config.is_default());
    }
}
