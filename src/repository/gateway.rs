//! Storage seam used by the sync command.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::pool::DieselError;
use crate::models::{Source, StoredRecord, UsageRecord};

/// Counts written by one [`PersistenceGateway::commit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitCounts {
    pub updated: usize,
    pub created: usize,
}

/// Where the checkpoint for a fetched source comes from.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint<'a> {
    pub source_id: i32,
    /// Hash of the page just fetched.
    pub content_hash: &'a str,
    /// Hash and scrape time are only written when this is set.
    pub content_changed: bool,
    pub checked_at: DateTime<Utc>,
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn list_sources(&self) -> Result<Vec<Source>, DieselError>;

    async fn get_source(&self, id: i32) -> Result<Option<Source>, DieselError>;

    /// Insert a new source. Fails if the id or prompt key is taken.
    async fn add_source(&self, source: &Source) -> Result<(), DieselError>;

    /// Enabled stored records of one source, oldest first.
    async fn load_records(&self, source_id: i32) -> Result<Vec<StoredRecord>, DieselError>;

    /// Apply a reconciliation result and its usage record atomically.
    ///
    /// Either every update, insert and the usage row are written, or none.
    async fn commit(
        &self,
        to_update: &[StoredRecord],
        to_create: &[StoredRecord],
        usage: &UsageRecord,
    ) -> Result<CommitCounts, DieselError>;

    /// Record that a source was visited.
    ///
    /// `last_checked_at` always moves; `content_hash` and `last_scraped_at`
    /// only when the content changed.
    async fn update_source_checkpoint(&self, checkpoint: Checkpoint<'_>)
        -> Result<(), DieselError>;

    /// Most recent usage rows first.
    async fn list_usage(
        &self,
        source_id: Option<i32>,
        limit: i64,
    ) -> Result<Vec<UsageRecord>, DieselError>;
}
