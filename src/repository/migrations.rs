//! Embedded schema setup.
//!
//! Every statement is idempotent, so running it against an existing database
//! is a no-op.

use diesel_async::SimpleAsyncConnection;
use tracing::info;

use super::pool::{AsyncSqlitePool, DieselError};

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    organization_type TEXT NOT NULL DEFAULT 'ASSOCIATION',
    prompt_key TEXT NOT NULL UNIQUE,
    url1 TEXT NOT NULL,
    url2 TEXT,
    description TEXT NOT NULL DEFAULT '',
    data_format TEXT NOT NULL DEFAULT 'WEB',
    area TEXT,
    content_hash TEXT,
    last_scraped_at TEXT,
    last_checked_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS trail_conditions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE RESTRICT,
    url1 TEXT NOT NULL,
    trail_name TEXT NOT NULL,
    mountain_name_raw TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    reported_at TEXT,
    resolved_at TEXT,
    status TEXT NOT NULL,
    area TEXT NOT NULL,
    reference_url TEXT NOT NULL DEFAULT '',
    comment TEXT NOT NULL DEFAULT '',
    ai_model TEXT NOT NULL,
    prompt_file TEXT NOT NULL,
    ai_config TEXT NOT NULL DEFAULT '{}',
    mountain_group_id INTEGER,
    disabled BOOLEAN NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trail_conditions_source
    ON trail_conditions(source_id, disabled);

CREATE TABLE IF NOT EXISTS llm_usage (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE RESTRICT,
    model TEXT NOT NULL,
    prompt_tokens BIGINT NOT NULL DEFAULT 0,
    thinking_tokens BIGINT NOT NULL DEFAULT 0,
    output_tokens BIGINT NOT NULL DEFAULT 0,
    cost_usd DOUBLE NOT NULL DEFAULT 0,
    conditions_extracted INTEGER NOT NULL DEFAULT 0,
    success BOOLEAN NOT NULL DEFAULT 1,
    execution_time_seconds DOUBLE NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_llm_usage_created
    ON llm_usage(created_at);
"#;

/// Create any missing tables and indexes.
pub async fn run_migrations(pool: &AsyncSqlitePool) -> Result<(), DieselError> {
    let mut conn = pool.get().await?;
    conn.batch_execute(SCHEMA_SQL).await?;
    info!("Database schema ready at {}", pool.database_url());
    Ok(())
}
