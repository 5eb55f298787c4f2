//! Configuration management for trailsync using the prefer crate.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::LlmConfig;
use crate::services::ReconcileConfig;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "trailsync.db";

/// Default prompts subdirectory name.
const PROMPTS_SUBDIR: &str = "prompts";

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    pub database_url: Option<String>,
    /// Directory holding `template.yaml` and the per-source prompt files.
    pub prompts_dir: PathBuf,
    /// Custom user agent; `None` uses the built-in one.
    pub user_agent: Option<String>,
    /// Fetch timeout in seconds.
    pub request_timeout: u64,
    /// Slack-compatible incoming webhook.
    pub webhook_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("trailsync");

        Self {
            prompts_dir: data_dir.join(PROMPTS_SUBDIR),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            user_agent: None,
            request_timeout: 30,
            webhook_url: None,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            prompts_dir: data_dir.join(PROMPTS_SUBDIR),
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Check if the database appears to be initialized.
    pub fn database_exists(&self) -> bool {
        match self.database_url {
            Some(ref url) => Path::new(url.strip_prefix("sqlite:").unwrap_or(url)).exists(),
            None => self.database_path().exists(),
        }
    }

    /// Ensure the data and prompt directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for (label, dir) in [("data", &self.data_dir), ("prompts", &self.prompts_dir)] {
            fs::create_dir_all(dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!("cannot create {} directory {}: {}", label, dir.display(), e),
                )
            })?;
        }
        Ok(())
    }
}

/// Errors reading an explicit or discovered config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Fetch timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "LlmConfig::is_default")]
    pub llm: LlmConfig,
    #[serde(default, skip_serializing_if = "ReconcileConfig::is_default")]
    pub reconcile: ReconcileConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer for discovery.
    pub async fn load() -> Self {
        match prefer::load("trailsync").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("{}; using defaults", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            // No config file found
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a file; TOML and YAML by extension, JSON otherwise.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str::<Config>(&contents).map_err(|e| e.to_string()),
            Some("yaml" | "yml") => {
                serde_yaml::from_str::<Config>(&contents).map_err(|e| e.to_string())
            }
            _ => serde_json::from_str::<Config>(&contents).map_err(|e| e.to_string()),
        };
        let mut config = parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        config.source_path = Some(path.to_path_buf());
        // Keys and endpoint overrides never come from the file
        config.llm = config.llm.with_env_overrides();
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// Paths starting with ~ are expanded.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
            settings.prompts_dir = settings.data_dir.join(PROMPTS_SUBDIR);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref prompts_dir) = self.prompts_dir {
            settings.prompts_dir = self.resolve_path(prompts_dir, base_dir);
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(ref url) = self.webhook_url {
            settings.webhook_url = Some(url.clone());
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory (--data flag).
    pub data: Option<PathBuf>,
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

/// Load settings with explicit options.
///
/// Precedence, lowest first: built-in defaults, config file, `--data`,
/// environment variables.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await.unwrap_or_else(|e| {
            tracing::warn!("{}; using defaults", e);
            Config::default()
        }),
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    if let Some(ref data) = options.data {
        let data_dir = absolute(data);
        // Keep an explicitly configured prompts dir
        if config.prompts_dir.is_none() {
            settings.prompts_dir = data_dir.join(PROMPTS_SUBDIR);
        }
        settings.data_dir = data_dir;
    }

    if let Some(database_url) = non_empty_env("DATABASE_URL") {
        tracing::debug!("Using DATABASE_URL from environment: {}", database_url);
        settings.database_url = Some(database_url);
    }
    if let Some(prompts_dir) = non_empty_env("TRAILSYNC_PROMPTS_DIR") {
        tracing::debug!("Using TRAILSYNC_PROMPTS_DIR from environment: {}", prompts_dir);
        settings.prompts_dir = absolute(Path::new(shellexpand::tilde(&prompts_dir).as_ref()));
    }
    if let Some(url) = non_empty_env("SLACK_WEBHOOK_URL") {
        settings.webhook_url = Some(url);
    }

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_toml_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trailsync.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "data"
request_timeout = 10

[llm]
default_model = "gemini-2.5-flash"
max_attempts = 5

[reconcile]
threshold = 0.8
exclude_resolved = true
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.request_timeout, Some(10));
        assert_eq!(config.llm.max_attempts, 5);
        assert_eq!(config.llm.default_model.as_str(), "gemini-2.5-flash");
        assert_eq!(config.reconcile.threshold, 0.8);
        assert!(config.reconcile.exclude_resolved);
        // Unset keys keep their defaults
        assert_eq!(config.reconcile.proximity_days, 14);

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, &config.base_dir().unwrap());
        assert_eq!(settings.data_dir, dir.path().join("data"));
        assert_eq!(settings.prompts_dir, dir.path().join("data").join("prompts"));
        assert_eq!(settings.request_timeout, 10);
    }

    #[tokio::test]
    async fn test_load_yaml_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trailsync.yaml");
        std::fs::write(&path, "prompts_dir: /srv/prompts\nwebhook_url: https://hooks.example/x\n")
            .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, dir.path());
        assert_eq!(settings.prompts_dir, PathBuf::from("/srv/prompts"));
        assert_eq!(settings.webhook_url.as_deref(), Some("https://hooks.example/x"));
    }

    #[tokio::test]
    async fn test_bad_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trailsync.toml");
        std::fs::write(&path, "request_timeout = \"soon\"").unwrap();
        let err = Config::load_from_path(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let missing = Config::load_from_path(&dir.path().join("absent.toml")).await;
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_database_url_from_path() {
        let settings = Settings::with_data_dir(PathBuf::from("/tmp/ts"));
        assert_eq!(settings.database_url(), "sqlite:/tmp/ts/trailsync.db");
        assert_eq!(settings.prompts_dir, PathBuf::from("/tmp/ts/prompts"));
    }
}
