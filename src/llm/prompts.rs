//! Prompt files: one shared template plus one YAML file per source.
//!
//! A site file looks like:
//!
//! ```yaml
//! prompt: |
//!   奥多摩ビジターセンターの登山道情報から...
//! config:
//!   model: gemini-2.5-flash
//!   temperature: 0.0
//!   thinking_budget: 5000
//!   use_template: true
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::client::{LlmConfig, ModelId};
use crate::models::{GenerationConfig, Source};

/// Shared instructions prepended to every site prompt.
pub const TEMPLATE_FILENAME: &str = "template.yaml";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{} has no prompt", .0.display())]
    MissingPrompt(PathBuf),
    #[error("unknown model '{model}' in {}", path.display())]
    UnknownModel { path: PathBuf, model: String },
    #[error("{0}")]
    InvalidConfig(String),
}

/// CLI-level overrides; `None` means "not given".
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptOverrides {
    pub model: Option<ModelId>,
    pub temperature: Option<f32>,
    pub thinking_budget: Option<i32>,
}

/// Everything needed to run an extraction for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPrompt {
    pub filename: String,
    pub prompt: String,
    pub model: ModelId,
    pub config: GenerationConfig,
}

#[derive(Debug, Default, Deserialize)]
struct PromptFile {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    config: Option<SiteConfig>,
}

/// Null YAML values deserialize to `None` and fall through to defaults.
#[derive(Debug, Default, Deserialize)]
struct SiteConfig {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    thinking_budget: Option<i32>,
    #[serde(default)]
    use_template: Option<bool>,
}

/// Reads prompt files from a directory.
#[derive(Debug, Clone)]
pub struct PromptStore {
    dir: PathBuf,
}

impl PromptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the site file for a source.
    pub fn site_path(&self, source: &Source) -> PathBuf {
        self.dir.join(source.prompt_filename())
    }

    /// Resolve prompt text and generation settings for a source.
    ///
    /// Priority is override > site file > defaults.
    pub async fn resolve(
        &self,
        source: &Source,
        overrides: PromptOverrides,
        defaults: &LlmConfig,
    ) -> Result<ResolvedPrompt, PromptError> {
        let filename = source.prompt_filename();
        let site_path = self.dir.join(&filename);
        let site = load_prompt_file(&site_path).await?;
        let site_config = site.config.unwrap_or_default();

        let site_prompt = site.prompt.unwrap_or_default();
        let use_template = site_config.use_template.unwrap_or(true);

        let mut parts = Vec::with_capacity(2);
        if use_template {
            let template_path = self.dir.join(TEMPLATE_FILENAME);
            let template = load_prompt_file(&template_path).await?;
            match template.prompt {
                Some(text) if !text.trim().is_empty() => parts.push(text),
                _ => return Err(PromptError::MissingPrompt(template_path)),
            }
        }
        if !site_prompt.trim().is_empty() {
            parts.push(site_prompt);
        }
        if parts.is_empty() {
            return Err(PromptError::MissingPrompt(site_path));
        }

        let model = match (overrides.model, site_config.model.as_deref()) {
            (Some(model), _) => model,
            (None, Some(name)) => {
                ModelId::from_str(name).ok_or_else(|| PromptError::UnknownModel {
                    path: site_path.clone(),
                    model: name.to_string(),
                })?
            }
            (None, None) => defaults.default_model,
        };

        let config = GenerationConfig {
            temperature: overrides
                .temperature
                .or(site_config.temperature)
                .unwrap_or(defaults.temperature),
            thinking_budget: overrides
                .thinking_budget
                .or(site_config.thinking_budget)
                .unwrap_or(defaults.thinking_budget),
        };
        validate_generation_config(&config)?;

        debug!(
            "Resolved {} (model {}, template {})",
            filename, model, use_template
        );

        Ok(ResolvedPrompt {
            filename,
            prompt: parts.join("\n\n"),
            model,
            config,
        })
    }
}

fn validate_generation_config(config: &GenerationConfig) -> Result<(), PromptError> {
    if !(0.0..=2.0).contains(&config.temperature) {
        return Err(PromptError::InvalidConfig(format!(
            "temperature {} outside 0.0..=2.0",
            config.temperature
        )));
    }
    if !(-1..=15000).contains(&config.thinking_budget) {
        return Err(PromptError::InvalidConfig(format!(
            "thinking_budget {} outside -1..=15000",
            config.thinking_budget
        )));
    }
    Ok(())
}

async fn load_prompt_file(path: &Path) -> Result<PromptFile, PromptError> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PromptError::NotFound(path.to_path_buf()))
        }
        Err(source) => {
            return Err(PromptError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    // An empty document parses as null
    if text.trim().is_empty() {
        return Ok(PromptFile::default());
    }
    serde_yaml::from_str::<Option<PromptFile>>(&text)
        .map(Option::unwrap_or_default)
        .map_err(|source| PromptError::Yaml {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn defaults() -> LlmConfig {
        toml::from_str("").unwrap()
    }

    fn source() -> Source {
        Source::new(
            1,
            "奥多摩ビジターセンター".to_string(),
            "okutama_vc".to_string(),
            "https://example.jp/".to_string(),
        )
    }

    #[tokio::test]
    async fn test_template_and_site_prompt_joined() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(TEMPLATE_FILENAME), "prompt: 共通指示\n").unwrap();
        std::fs::write(
            dir.path().join("001_okutama_vc.yaml"),
            "prompt: サイト指示\nconfig:\n  model: gemini-2.5-flash\n  temperature: null\n",
        )
        .unwrap();

        let store = PromptStore::new(dir.path());
        let resolved = store
            .resolve(&source(), PromptOverrides::default(), &defaults())
            .await
            .unwrap();

        assert_eq!(resolved.filename, "001_okutama_vc.yaml");
        assert_eq!(resolved.prompt, "共通指示\n\nサイト指示");
        assert_eq!(resolved.model, ModelId::Gemini25Flash);
        assert_eq!(resolved.config.temperature, 0.0);
        assert_eq!(resolved.config.thinking_budget, 5000);
    }

    #[tokio::test]
    async fn test_overrides_take_priority() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("001_okutama_vc.yaml"),
            "prompt: サイト指示\nconfig:\n  model: gemini-2.5-flash\n  temperature: 0.5\n  use_template: false\n",
        )
        .unwrap();

        let overrides = PromptOverrides {
            model: Some(ModelId::DeepseekChat),
            temperature: Some(0.0),
            thinking_budget: None,
        };
        let resolved = PromptStore::new(dir.path())
            .resolve(&source(), overrides, &defaults())
            .await
            .unwrap();

        assert_eq!(resolved.model, ModelId::DeepseekChat);
        assert_eq!(resolved.config.temperature, 0.0);
        assert_eq!(resolved.prompt, "サイト指示");
    }

    #[tokio::test]
    async fn test_missing_site_file_is_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(TEMPLATE_FILENAME), "prompt: 共通指示\n").unwrap();
        let err = PromptStore::new(dir.path())
            .resolve(&source(), PromptOverrides::default(), &defaults())
            .await
            .unwrap_err();
        assert!(matches!(err, PromptError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_model_rejected() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("001_okutama_vc.yaml"),
            "prompt: x\nconfig:\n  model: gpt-4o\n  use_template: false\n",
        )
        .unwrap();
        let err = PromptStore::new(dir.path())
            .resolve(&source(), PromptOverrides::default(), &defaults())
            .await
            .unwrap_err();
        assert!(matches!(err, PromptError::UnknownModel { .. }));
    }

    #[tokio::test]
    async fn test_out_of_range_temperature_rejected() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("001_okutama_vc.yaml"),
            "prompt: x\nconfig:\n  temperature: 3.5\n  use_template: false\n",
        )
        .unwrap();
        let err = PromptStore::new(dir.path())
            .resolve(&source(), PromptOverrides::default(), &defaults())
            .await
            .unwrap_err();
        assert!(matches!(err, PromptError::InvalidConfig(_)));
    }
}
