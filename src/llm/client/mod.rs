//! Extraction client: prompt + page text in, validated records out.
//!
//! Wraps an [`LlmBackend`] with the attempt ceiling, the temperature nudge
//! on validation failure, server-error backoff and usage accounting.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub use config::{LlmConfig, LlmProvider, ModelId};

use super::providers::{CompletionRequest, LlmBackend};
use super::schema::parse_response;
use super::stats::LlmStats;
use super::LlmError;
use crate::models::{CandidateRecord, GenerationConfig, Provenance};
use crate::rate_limit::RetryPolicy;

/// Temperature used after a validation failure at temperature zero.
pub const TEMPERATURE_NUDGE: f32 = 0.1;

/// Pause before retrying after a validation failure.
pub const VALIDATION_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Input for one extraction.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub model: ModelId,
    /// Fully resolved prompt (template + site instructions).
    pub prompt: String,
    /// Readable page text.
    pub data: String,
    pub config: GenerationConfig,
    /// Prompt file name, kept for provenance and postmortem files.
    pub prompt_filename: String,
}

/// Validated records and the stats of the calls that produced them.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub records: Vec<CandidateRecord>,
    pub stats: LlmStats,
    /// Settings of the successful attempt (after any temperature nudge).
    pub config: GenerationConfig,
    pub model: ModelId,
    pub prompt_filename: String,
}

impl Extraction {
    pub fn provenance(&self) -> Provenance {
        Provenance {
            ai_model: self.model.as_str().to_string(),
            prompt_file: self.prompt_filename.clone(),
            config: self.config,
        }
    }
}

/// A failed extraction. Usage is still reported.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ExtractionFailure {
    #[source]
    pub error: LlmError,
    pub stats: LlmStats,
}

/// Runs extractions against one backend.
pub struct ExtractionClient {
    backend: Arc<dyn LlmBackend>,
    max_attempts: u32,
    server_policy: RetryPolicy,
    validation_delay: Duration,
    invalid_output_dir: Option<PathBuf>,
}

impl ExtractionClient {
    pub fn new(backend: Arc<dyn LlmBackend>, config: &LlmConfig) -> Self {
        Self {
            backend,
            max_attempts: config.max_attempts.max(1),
            server_policy: RetryPolicy::LLM_SERVER,
            validation_delay: VALIDATION_RETRY_DELAY,
            invalid_output_dir: Some(PathBuf::from(&config.invalid_output_dir)),
        }
    }

    /// Replace backoff delays (tests use zero delays).
    pub fn with_delays(mut self, server_policy: RetryPolicy, validation_delay: Duration) -> Self {
        self.server_policy = server_policy;
        self.validation_delay = validation_delay;
        self
    }

    /// Where invalid raw responses are saved; `None` disables saving.
    pub fn with_invalid_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.invalid_output_dir = dir;
        self
    }

    /// Run the extraction, retrying within the attempt ceiling.
    ///
    /// Validation failures and retryable server errors share one counter.
    pub async fn extract(
        &self,
        request: ExtractionRequest,
    ) -> Result<Extraction, ExtractionFailure> {
        let started = Instant::now();
        let mut stats = LlmStats::new(request.model.as_str());
        let mut config = request.config;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let call = CompletionRequest {
                model: request.model.as_str().to_string(),
                prompt: request.prompt.clone(),
                data: request.data.clone(),
                temperature: config.temperature,
                thinking_budget: config.thinking_budget,
            };

            debug!(
                "Extraction attempt {}/{} with {} (temperature {})",
                attempt, self.max_attempts, request.model, config.temperature
            );

            match self.backend.complete(&call).await {
                Ok(completion) => {
                    stats.tokens.record(
                        &completion.usage,
                        completion.prompt_chars,
                        completion.text.chars().count(),
                    );

                    match parse_response(&completion.text) {
                        Ok(records) => {
                            stats.validation_success = true;
                            stats.extraction_count = records.len();
                            stats.retry_count = attempt - 1;
                            stats.execution_time = started.elapsed();
                            info!(
                                "{}: extracted {} record(s) with {} in {:.1}s (${:.4})",
                                request.prompt_filename,
                                records.len(),
                                request.model,
                                stats.execution_time.as_secs_f64(),
                                stats.cost_usd()
                            );
                            return Ok(Extraction {
                                records,
                                stats,
                                config,
                                model: request.model,
                                prompt_filename: request.prompt_filename,
                            });
                        }
                        Err(err) => {
                            warn!(
                                "{}: invalid response on attempt {}/{}: {}",
                                request.prompt_filename, attempt, self.max_attempts, err
                            );
                            if attempt >= self.max_attempts {
                                self.save_invalid_output(&request, &completion.text, &err)
                                    .await;
                                return Err(self.fail(err, stats, attempt, started));
                            }
                            if config.temperature <= 0.0 {
                                config.temperature = TEMPERATURE_NUDGE;
                                info!(
                                    "Raising temperature to {} for the next attempt",
                                    TEMPERATURE_NUDGE
                                );
                            }
                            tokio::time::sleep(self.validation_delay).await;
                        }
                    }
                }
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let wait = err
                        .retry_after()
                        .unwrap_or_else(|| self.server_policy.delay_for(attempt - 1));
                    warn!(
                        "{}: {} (attempt {}/{}); retrying in {:?}",
                        request.prompt_filename, err, attempt, self.max_attempts, wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(err) => {
                    error!(
                        "{}: extraction failed after {} attempt(s): {}",
                        request.prompt_filename, attempt, err
                    );
                    return Err(self.fail(err, stats, attempt, started));
                }
            }
        }
    }

    fn fail(
        &self,
        error: LlmError,
        mut stats: LlmStats,
        attempts: u32,
        started: Instant,
    ) -> ExtractionFailure {
        stats.retry_count = attempts.saturating_sub(1);
        stats.execution_time = started.elapsed();
        ExtractionFailure { error, stats }
    }

    /// Keep the last invalid response for postmortem. Errors are logged only.
    async fn save_invalid_output(&self, request: &ExtractionRequest, raw: &str, err: &LlmError) {
        let Some(dir) = &self.invalid_output_dir else {
            return;
        };
        match write_invalid_output(dir, request, raw, err).await {
            Ok(path) => warn!("Saved invalid response to {}", path.display()),
            Err(e) => error!("Could not save invalid response in {}: {}", dir.display(), e),
        }
    }
}

async fn write_invalid_output(
    dir: &Path,
    request: &ExtractionRequest,
    raw: &str,
    err: &LlmError,
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let filename = format!(
        "validation_error_{}_{}.txt",
        request.model,
        Local::now().format("%Y%m%d_%H%M%S")
    );
    let path = dir.join(filename);
    let body = format!(
        "prompt_file: {}\nmodel: {}\nerror: {}\n\n{}",
        request.prompt_filename, request.model, err, raw
    );
    tokio::fs::write(&path, body).await?;
    Ok(path)
}
