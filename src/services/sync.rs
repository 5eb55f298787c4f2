//! Applies pipeline outcomes to storage, one source at a time.
//!
//! Extraction runs concurrently; reconciliation and commits do not. Each
//! source's records and usage row are written in one transaction, and the
//! source checkpoint only moves after that commit succeeded.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::models::Source;
use crate::repository::{Checkpoint, PersistenceGateway};
use crate::services::notifier::{Notifier, UpdateCounts};
use crate::services::pipeline::{ExtractedSource, Outcome};
use crate::services::reconcile::{Reconciliation, RecordReconciler};
use crate::services::summary::RunSummary;

pub const SKIP_REASON_UNCHANGED: &str = "content unchanged";

/// Reconciliation computed for a source during a dry run.
#[derive(Debug, Clone)]
pub struct Preview {
    pub source: Source,
    pub reconciliation: Reconciliation,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub summary: RunSummary,
    /// Filled only in dry runs.
    pub previews: Vec<Preview>,
}

pub struct SyncRunner {
    gateway: Arc<dyn PersistenceGateway>,
    reconciler: RecordReconciler,
    notifier: Option<Notifier>,
    dry_run: bool,
}

impl SyncRunner {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, reconciler: RecordReconciler) -> Self {
        Self {
            gateway,
            reconciler,
            notifier: None,
            dry_run: false,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Reconcile without writing records, usage or checkpoints.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn apply(&mut self, results: Vec<(Source, Outcome)>) -> SyncReport {
        let mut report = SyncReport::default();

        for (source, outcome) in results {
            match outcome {
                Outcome::Failed { reason, stats } => {
                    if let Some(stats) = stats {
                        info!(
                            "{}: discarded usage of failed extraction (${:.4})",
                            source.name,
                            stats.cost_usd()
                        );
                    }
                    report.summary.error(source.id, &source.name, reason.clone());
                    if !self.dry_run {
                        self.notify_error(&source, &reason).await;
                    }
                }
                Outcome::Unchanged { content_hash } => {
                    if !self.dry_run {
                        if let Err(e) = self.checkpoint(&source, &content_hash, false).await {
                            report.summary.error(
                                source.id,
                                &source.name,
                                format!("checkpoint failed: {}", e),
                            );
                            continue;
                        }
                    }
                    report
                        .summary
                        .skipped(source.id, &source.name, SKIP_REASON_UNCHANGED);
                }
                Outcome::Extracted(extracted) => {
                    self.apply_extracted(&source, *extracted, &mut report).await;
                }
            }
        }

        report
    }

    async fn apply_extracted(
        &mut self,
        source: &Source,
        extracted: ExtractedSource,
        report: &mut SyncReport,
    ) {
        let ExtractedSource {
            extraction,
            content_hash,
            content_changed,
            ..
        } = extracted;

        let stored = match self.gateway.load_records(source.id).await {
            Ok(stored) => stored,
            Err(e) => {
                error!("{}: failed to load stored records: {}", source.name, e);
                report
                    .summary
                    .error(source.id, &source.name, format!("load failed: {}", e));
                return;
            }
        };

        let provenance = extraction.provenance();
        let reconciliation = self.reconciler.reconcile(
            source,
            &stored,
            &extraction.records,
            &provenance,
            Utc::now(),
        );
        for dup in &reconciliation.duplicate_warnings {
            warn!(
                "{}: candidate {} also matched stored record {:?} (score {:.3}), claimed by candidate {}",
                source.name, dup.candidate_index, dup.stored_id, dup.score, dup.claimed_by
            );
        }

        let extracted_count = extraction.records.len();
        let cost = extraction.stats.cost_usd();

        if self.dry_run {
            report.summary.success(
                source.id,
                &source.name,
                extracted_count,
                reconciliation.to_update.len(),
                reconciliation.to_create.len(),
                cost,
            );
            report.previews.push(Preview {
                source: source.clone(),
                reconciliation,
            });
            return;
        }

        let usage = extraction.stats.to_usage_record(source.id, true);
        let counts = match self
            .gateway
            .commit(&reconciliation.to_update, &reconciliation.to_create, &usage)
            .await
        {
            Ok(counts) => counts,
            Err(e) => {
                // Checkpoint stays put so the next run extracts again
                error!("{}: commit failed: {}", source.name, e);
                let message = format!("commit failed: {}", e);
                self.notify_error(source, &message).await;
                report.summary.error(source.id, &source.name, message);
                return;
            }
        };

        info!(
            "{}: {} record(s), {} updated, {} created (${:.4})",
            source.name, extracted_count, counts.updated, counts.created, cost
        );

        if let Err(e) = self.checkpoint(source, &content_hash, content_changed).await {
            error!("{}: checkpoint failed after commit: {}", source.name, e);
        }

        report.summary.success(
            source.id,
            &source.name,
            extracted_count,
            counts.updated,
            counts.created,
            cost,
        );

        if let Some(notifier) = &self.notifier {
            notifier
                .notify_update(
                    &source.name,
                    UpdateCounts {
                        updated: counts.updated,
                        created: counts.created,
                        total: extracted_count,
                        cost_usd: cost,
                    },
                )
                .await;
        }
    }

    async fn checkpoint(
        &self,
        source: &Source,
        content_hash: &str,
        content_changed: bool,
    ) -> Result<(), crate::repository::DieselError> {
        self.gateway
            .update_source_checkpoint(Checkpoint {
                source_id: source.id,
                content_hash,
                content_changed,
                checked_at: Utc::now(),
            })
            .await
    }

    async fn notify_error(&self, source: &Source, message: &str) {
        if let Some(notifier) = &self.notifier {
            notifier.notify_error(&source.name, message).await;
        }
    }
}
