//! In-memory [`PersistenceGateway`] for tests and previews.

use std::sync::Mutex;

use async_trait::async_trait;

use super::gateway::{Checkpoint, CommitCounts, PersistenceGateway};
use super::pool::DieselError;
use super::util::to_diesel_error;
use crate::models::{Source, StoredRecord, UsageRecord};

#[derive(Debug, Default)]
struct State {
    sources: Vec<Source>,
    records: Vec<StoredRecord>,
    usage: Vec<UsageRecord>,
    next_record_id: i32,
    next_usage_id: i32,
}

/// Same semantics as the SQLite gateway, held in a mutex.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<State>,
    /// Make the next commit fail without writing anything.
    fail_next_commit: Mutex<bool>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed stored records directly, assigning ids to those without one.
    pub fn seed_records(&self, records: Vec<StoredRecord>) -> Result<(), DieselError> {
        let mut state = self.lock()?;
        for mut record in records {
            if record.id.is_none() {
                state.next_record_id += 1;
                record.id = Some(state.next_record_id);
            }
            state.records.push(record);
        }
        Ok(())
    }

    pub fn fail_next_commit(&self) {
        if let Ok(mut flag) = self.fail_next_commit.lock() {
            *flag = true;
        }
    }

    /// Every stored record, including disabled ones.
    pub fn all_records(&self) -> Vec<StoredRecord> {
        self.state
            .lock()
            .map(|state| state.records.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, DieselError> {
        self.state
            .lock()
            .map_err(|_| to_diesel_error("memory gateway lock poisoned"))
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn list_sources(&self) -> Result<Vec<Source>, DieselError> {
        let mut sources = self.lock()?.sources.clone();
        sources.sort_by_key(|s| s.id);
        Ok(sources)
    }

    async fn get_source(&self, id: i32) -> Result<Option<Source>, DieselError> {
        Ok(self.lock()?.sources.iter().find(|s| s.id == id).cloned())
    }

    async fn add_source(&self, source: &Source) -> Result<(), DieselError> {
        let mut state = self.lock()?;
        if state
            .sources
            .iter()
            .any(|s| s.id == source.id || s.prompt_key == source.prompt_key)
        {
            return Err(to_diesel_error(format!(
                "UNIQUE constraint failed for source {} ({})",
                source.id, source.prompt_key
            )));
        }
        state.sources.push(source.clone());
        Ok(())
    }

    async fn load_records(&self, source_id: i32) -> Result<Vec<StoredRecord>, DieselError> {
        Ok(self
            .lock()?
            .records
            .iter()
            .filter(|r| r.source_id == source_id && !r.disabled)
            .cloned()
            .collect())
    }

    async fn commit(
        &self,
        to_update: &[StoredRecord],
        to_create: &[StoredRecord],
        usage: &UsageRecord,
    ) -> Result<CommitCounts, DieselError> {
        if let Ok(mut flag) = self.fail_next_commit.lock() {
            if std::mem::take(&mut *flag) {
                return Err(to_diesel_error("simulated commit failure"));
            }
        }

        let mut state = self.lock()?;
        if !state.sources.iter().any(|s| s.id == usage.source_id) {
            return Err(to_diesel_error("FOREIGN KEY constraint failed"));
        }

        // Validate everything before mutating so a failure writes nothing
        let mut positions = Vec::with_capacity(to_update.len());
        for record in to_update {
            let id = record
                .id
                .ok_or_else(|| to_diesel_error("cannot update a record that was never stored"))?;
            let pos = state
                .records
                .iter()
                .position(|r| r.id == Some(id))
                .ok_or(DieselError::NotFound)?;
            positions.push(pos);
        }

        for (pos, record) in positions.into_iter().zip(to_update) {
            let stored = &mut state.records[pos];
            stored.title = record.title.clone();
            stored.description = record.description.clone();
            stored.status = record.status;
            stored.reported_at = record.reported_at;
            stored.resolved_at = record.resolved_at;
            stored.ai_model = record.ai_model.clone();
            stored.prompt_file = record.prompt_file.clone();
            stored.ai_config = record.ai_config;
            stored.updated_at = record.updated_at;
        }

        for record in to_create {
            state.next_record_id += 1;
            let mut record = record.clone();
            record.id = Some(state.next_record_id);
            state.records.push(record);
        }

        state.next_usage_id += 1;
        let mut usage = usage.clone();
        usage.id = Some(state.next_usage_id);
        state.usage.push(usage);

        Ok(CommitCounts {
            updated: to_update.len(),
            created: to_create.len(),
        })
    }

    async fn update_source_checkpoint(
        &self,
        checkpoint: Checkpoint<'_>,
    ) -> Result<(), DieselError> {
        let mut state = self.lock()?;
        let source = state
            .sources
            .iter_mut()
            .find(|s| s.id == checkpoint.source_id)
            .ok_or(DieselError::NotFound)?;

        source.last_checked_at = Some(checkpoint.checked_at);
        if checkpoint.content_changed {
            source.content_hash = Some(checkpoint.content_hash.to_string());
            source.last_scraped_at = Some(checkpoint.checked_at);
            source.updated_at = checkpoint.checked_at;
        }
        Ok(())
    }

    async fn list_usage(
        &self,
        source_id: Option<i32>,
        limit: i64,
    ) -> Result<Vec<UsageRecord>, DieselError> {
        let state = self.lock()?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state
            .usage
            .iter()
            .rev()
            .filter(|u| source_id.map_or(true, |id| u.source_id == id))
            .take(limit)
            .cloned()
            .collect())
    }
}
