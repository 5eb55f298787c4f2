//! Service layer for trailsync.
//!
//! Domain logic separated from the CLI: change detection, the per-source
//! pipeline, reconciliation, applying results to storage, notification
//! and run summaries.

pub mod change_detection;
pub mod notifier;
pub mod pipeline;
pub mod reconcile;
pub mod summary;
pub mod sync;

pub use change_detection::{ChangeDetector, ChangeStatus};
pub use notifier::{Notifier, UpdateCounts};
pub use pipeline::{ExtractedSource, Outcome, PipelineError, PipelineEvent, SourcePipeline};
pub use reconcile::{ReconcileConfig, Reconciliation, RecordReconciler};
pub use summary::{RunSummary, SourceReport, SourceStatus, Totals};
pub use sync::{Preview, SyncReport, SyncRunner};
