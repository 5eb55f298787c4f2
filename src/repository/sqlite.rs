//! SQLite-backed [`PersistenceGateway`].

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::{debug, info};

use super::gateway::{Checkpoint, CommitCounts, PersistenceGateway};
use super::models::{
    LlmUsageRecord, NewLlmUsage, NewSource, NewTrailCondition, SourceRecord, TrailConditionRecord,
};
use super::pool::{AsyncSqlitePool, DieselError};
use super::util::to_diesel_error;
use crate::models::{Source, StoredRecord, UsageRecord};
use crate::schema::{llm_usage, sources, trail_conditions};

#[derive(Clone)]
pub struct SqliteGateway {
    pool: AsyncSqlitePool,
}

impl SqliteGateway {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AsyncSqlitePool {
        &self.pool
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn list_sources(&self) -> Result<Vec<Source>, DieselError> {
        let mut conn = self.pool.get().await?;

        sources::table
            .order(sources::id.asc())
            .select(SourceRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(Source::from).collect())
    }

    async fn get_source(&self, id: i32) -> Result<Option<Source>, DieselError> {
        let mut conn = self.pool.get().await?;

        sources::table
            .find(id)
            .select(SourceRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(Source::from))
    }

    async fn add_source(&self, source: &Source) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        diesel::insert_into(sources::table)
            .values(NewSource::from(source))
            .execute(&mut conn)
            .await?;
        info!("Added source {} ({})", source.id, source.name);
        Ok(())
    }

    async fn load_records(&self, source_id: i32) -> Result<Vec<StoredRecord>, DieselError> {
        let mut conn = self.pool.get().await?;

        trail_conditions::table
            .filter(trail_conditions::source_id.eq(source_id))
            .filter(trail_conditions::disabled.eq(false))
            .order(trail_conditions::id.asc())
            .select(TrailConditionRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(StoredRecord::from).collect())
    }

    async fn commit(
        &self,
        to_update: &[StoredRecord],
        to_create: &[StoredRecord],
        usage: &UsageRecord,
    ) -> Result<CommitCounts, DieselError> {
        let mut updates = Vec::with_capacity(to_update.len());
        for record in to_update {
            let id = record
                .id
                .ok_or_else(|| to_diesel_error("cannot update a record that was never stored"))?;
            updates.push((id, NewTrailCondition::from(record)));
        }
        let inserts: Vec<NewTrailCondition> =
            to_create.iter().map(NewTrailCondition::from).collect();
        let usage_row = NewLlmUsage::from(usage);

        let mut conn = self.pool.get().await?;
        let counts = conn
            .transaction::<_, DieselError, _>(|conn| {
                Box::pin(async move {
                    for (id, row) in &updates {
                        let rows = diesel::update(trail_conditions::table.find(*id))
                            .set((
                                trail_conditions::title.eq(&row.title),
                                trail_conditions::description.eq(&row.description),
                                trail_conditions::status.eq(&row.status),
                                trail_conditions::reported_at.eq(&row.reported_at),
                                trail_conditions::resolved_at.eq(&row.resolved_at),
                                trail_conditions::ai_model.eq(&row.ai_model),
                                trail_conditions::prompt_file.eq(&row.prompt_file),
                                trail_conditions::ai_config.eq(&row.ai_config),
                                trail_conditions::updated_at.eq(&row.updated_at),
                            ))
                            .execute(conn)
                            .await?;
                        if rows == 0 {
                            return Err(DieselError::NotFound);
                        }
                    }

                    for row in &inserts {
                        diesel::insert_into(trail_conditions::table)
                            .values(row)
                            .execute(conn)
                            .await?;
                    }

                    diesel::insert_into(llm_usage::table)
                        .values(&usage_row)
                        .execute(conn)
                        .await?;

                    Ok(CommitCounts {
                        updated: updates.len(),
                        created: inserts.len(),
                    })
                })
            })
            .await?;

        debug!(
            "Committed source {}: {} updated, {} created",
            usage.source_id, counts.updated, counts.created
        );
        Ok(counts)
    }

    async fn update_source_checkpoint(
        &self,
        checkpoint: Checkpoint<'_>,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let ts = checkpoint.checked_at.to_rfc3339();
        let target = sources::table.find(checkpoint.source_id);

        let rows = if checkpoint.content_changed {
            diesel::update(target)
                .set((
                    sources::last_checked_at.eq(Some(&ts)),
                    sources::content_hash.eq(Some(checkpoint.content_hash)),
                    sources::last_scraped_at.eq(Some(&ts)),
                    sources::updated_at.eq(&ts),
                ))
                .execute(&mut conn)
                .await?
        } else {
            diesel::update(target)
                .set(sources::last_checked_at.eq(Some(&ts)))
                .execute(&mut conn)
                .await?
        };

        if rows == 0 {
            return Err(DieselError::NotFound);
        }
        Ok(())
    }

    async fn list_usage(
        &self,
        source_id: Option<i32>,
        limit: i64,
    ) -> Result<Vec<UsageRecord>, DieselError> {
        let mut conn = self.pool.get().await?;

        let mut query = llm_usage::table
            .order((llm_usage::created_at.desc(), llm_usage::id.desc()))
            .limit(limit)
            .select(LlmUsageRecord::as_select())
            .into_boxed();
        if let Some(id) = source_id {
            query = query.filter(llm_usage::source_id.eq(id));
        }

        query
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(UsageRecord::from).collect())
    }
}
