//! Per-source fetch → change check → extraction, run concurrently.
//!
//! Each source gets its own task; a failure (or panic) in one task is
//! captured as that source's [`Outcome`] and never touches the others.
//! Results come back in submission order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::http_client::{FetchError, PageFetcher};
use crate::llm::{
    BackendFactory, Extraction, ExtractionClient, ExtractionFailure, ExtractionRequest, LlmConfig,
    LlmError, LlmStats, ModelId, PromptError, PromptOverrides, PromptStore,
};
use crate::models::Source;
use crate::rate_limit::RetryPolicy;
use crate::services::change_detection::ChangeDetector;

/// Errors captured at a source's task boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),
    #[error("LLM backend unavailable: {0}")]
    Backend(#[from] LlmError),
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionFailure),
    #[error("task aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    /// Usage spent before the failure, if any.
    fn into_stats(self) -> Option<LlmStats> {
        match self {
            Self::Extraction(failure) => Some(failure.stats),
            _ => None,
        }
    }
}

/// A source whose content was extracted.
#[derive(Debug, Clone)]
pub struct ExtractedSource {
    pub extraction: Extraction,
    pub content_hash: String,
    /// False when extraction was forced over unchanged content.
    pub content_changed: bool,
    pub page_chars: usize,
}

/// Result of one source's task.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Content hash matched the checkpoint; extraction skipped.
    Unchanged { content_hash: String },
    Extracted(Box<ExtractedSource>),
    Failed {
        reason: String,
        /// Usage of a failed extraction (never persisted).
        stats: Option<LlmStats>,
    },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn content_changed(&self) -> bool {
        match self {
            Self::Extracted(extracted) => extracted.content_changed,
            _ => false,
        }
    }

    /// New hash to checkpoint, when the page was fetched.
    pub fn content_hash(&self) -> Option<&str> {
        match self {
            Self::Unchanged { content_hash } => Some(content_hash),
            Self::Extracted(extracted) => Some(&extracted.content_hash),
            Self::Failed { .. } => None,
        }
    }

    fn failed(err: PipelineError) -> Self {
        let reason = err.to_string();
        Self::Failed {
            reason,
            stats: err.into_stats(),
        }
    }
}

/// Progress notifications for UIs.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Started { source_id: i32, name: String },
    Fetched { source_id: i32, changed: bool },
    Finished { source_id: i32, ok: bool },
}

struct PipelineContext {
    fetcher: Arc<dyn PageFetcher>,
    backends: Arc<dyn BackendFactory>,
    prompts: PromptStore,
    llm: LlmConfig,
    detector: ChangeDetector,
    overrides: PromptOverrides,
    retry_delays: Option<(RetryPolicy, Duration)>,
    invalid_output_dir: Option<PathBuf>,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl PipelineContext {
    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

/// Drives all sources of one run.
pub struct SourcePipeline {
    ctx: PipelineContext,
}

impl SourcePipeline {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        backends: Arc<dyn BackendFactory>,
        prompts: PromptStore,
        llm: LlmConfig,
    ) -> Self {
        let invalid_output_dir = Some(PathBuf::from(&llm.invalid_output_dir));
        Self {
            ctx: PipelineContext {
                fetcher,
                backends,
                prompts,
                llm,
                detector: ChangeDetector::new(),
                overrides: PromptOverrides::default(),
                retry_delays: None,
                invalid_output_dir,
                events: None,
            },
        }
    }

    /// Ignore stored hashes and extract every source.
    pub fn with_force(mut self, force: bool) -> Self {
        self.ctx.detector = if force {
            ChangeDetector::forced()
        } else {
            ChangeDetector::new()
        };
        self
    }

    pub fn with_overrides(mut self, overrides: PromptOverrides) -> Self {
        self.ctx.overrides = overrides;
        self
    }

    /// Override LLM backoff delays (tests use zero).
    pub fn with_retry_delays(mut self, server: RetryPolicy, validation: Duration) -> Self {
        self.ctx.retry_delays = Some((server, validation));
        self
    }

    pub fn with_invalid_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.ctx.invalid_output_dir = dir;
        self
    }

    pub fn with_events(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.ctx.events = Some(tx);
        self
    }

    /// Process every source concurrently.
    ///
    /// `model_override` takes priority over prompt-file and default models.
    /// The returned vector is paired positionally with `sources`.
    pub async fn run(
        self,
        sources: Vec<Source>,
        model_override: Option<ModelId>,
    ) -> Vec<(Source, Outcome)> {
        let mut ctx = self.ctx;
        if model_override.is_some() {
            ctx.overrides.model = model_override;
        }
        let ctx = Arc::new(ctx);

        info!("Processing {} source(s)", sources.len());
        let handles: Vec<_> = sources
            .iter()
            .cloned()
            .map(|source| {
                let ctx = ctx.clone();
                tokio::spawn(async move { process_source(&ctx, &source).await })
            })
            .collect();

        let mut results = Vec::with_capacity(sources.len());
        for (source, handle) in sources.into_iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Task for source {} aborted: {}", source.id, e);
                    Outcome::failed(PipelineError::Aborted(e.to_string()))
                }
            };
            results.push((source, outcome));
        }
        results
    }
}

async fn process_source(ctx: &PipelineContext, source: &Source) -> Outcome {
    ctx.emit(PipelineEvent::Started {
        source_id: source.id,
        name: source.name.clone(),
    })
    .await;

    let outcome = match run_source(ctx, source).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!("{} ({}): {}", source.name, source.id, err);
            if let PipelineError::Extraction(failure) = &err {
                warn!(
                    "{}: failed extraction spent ${:.4} over {} attempt(s)",
                    source.name,
                    failure.stats.cost_usd(),
                    failure.stats.retry_count + 1
                );
            }
            Outcome::failed(err)
        }
    };

    ctx.emit(PipelineEvent::Finished {
        source_id: source.id,
        ok: !outcome.is_failure(),
    })
    .await;
    outcome
}

async fn run_source(ctx: &PipelineContext, source: &Source) -> Result<Outcome, PipelineError> {
    let page = ctx.fetcher.fetch_page(&source.url1).await?;

    let status = ctx
        .detector
        .check(&page.content_hash, source.content_hash.as_deref());
    ctx.emit(PipelineEvent::Fetched {
        source_id: source.id,
        changed: status.needs_extraction(),
    })
    .await;

    if !status.needs_extraction() {
        info!("{}: content unchanged, skipping extraction", source.name);
        return Ok(Outcome::Unchanged {
            content_hash: page.content_hash,
        });
    }

    let resolved = ctx
        .prompts
        .resolve(source, ctx.overrides, &ctx.llm)
        .await?;
    let backend = ctx.backends.backend(resolved.model)?;

    let mut client = ExtractionClient::new(backend, &ctx.llm)
        .with_invalid_output_dir(ctx.invalid_output_dir.clone());
    if let Some((server, validation)) = ctx.retry_delays {
        client = client.with_delays(server, validation);
    }

    let page_chars = page.text.chars().count();
    debug!(
        "{}: extracting from {} chars with {}",
        source.name, page_chars, resolved.model
    );
    let extraction = client
        .extract(ExtractionRequest {
            model: resolved.model,
            prompt: resolved.prompt,
            data: page.text,
            config: resolved.config,
            prompt_filename: resolved.filename,
        })
        .await?;

    Ok(Outcome::Extracted(Box::new(ExtractedSource {
        extraction,
        content_hash: page.content_hash,
        content_changed: status.content_changed(),
        page_chars,
    })))
}
