//! Diesel row types and conversions to domain models.
//!
//! Timestamps are RFC 3339 text, dates `YYYY-MM-DD` text, enums their
//! upper-case wire names, and the generation config a JSON object.

use diesel::prelude::*;

use super::util::{format_date, parse_date_opt, parse_datetime, parse_datetime_opt};
use crate::models::{
    AreaName, DataFormat, GenerationConfig, OrganizationType, Source, StatusType, StoredRecord,
    UsageRecord,
};
use crate::schema;

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::sources)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SourceRecord {
    pub id: i32,
    pub name: String,
    pub organization_type: String,
    pub prompt_key: String,
    pub url1: String,
    pub url2: Option<String>,
    pub description: String,
    pub data_format: String,
    pub area: Option<String>,
    pub content_hash: Option<String>,
    pub last_scraped_at: Option<String>,
    pub last_checked_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::sources)]
pub struct NewSource<'a> {
    pub id: i32,
    pub name: &'a str,
    pub organization_type: &'a str,
    pub prompt_key: &'a str,
    pub url1: &'a str,
    pub url2: Option<&'a str>,
    pub description: &'a str,
    pub data_format: &'a str,
    pub area: Option<&'a str>,
    pub content_hash: Option<&'a str>,
    pub last_scraped_at: Option<String>,
    pub last_checked_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl<'a> From<&'a Source> for NewSource<'a> {
    fn from(source: &'a Source) -> Self {
        Self {
            id: source.id,
            name: &source.name,
            organization_type: source.organization_type.as_str(),
            prompt_key: &source.prompt_key,
            url1: &source.url1,
            url2: source.url2.as_deref(),
            description: &source.description,
            data_format: source.data_format.as_str(),
            area: source.area.map(|a| a.as_str()),
            content_hash: source.content_hash.as_deref(),
            last_scraped_at: source.last_scraped_at.map(|dt| dt.to_rfc3339()),
            last_checked_at: source.last_checked_at.map(|dt| dt.to_rfc3339()),
            created_at: source.created_at.to_rfc3339(),
            updated_at: source.updated_at.to_rfc3339(),
        }
    }
}

impl From<SourceRecord> for Source {
    fn from(record: SourceRecord) -> Self {
        Source {
            id: record.id,
            name: record.name,
            organization_type: OrganizationType::from_str(&record.organization_type)
                .unwrap_or_default(),
            prompt_key: record.prompt_key,
            url1: record.url1,
            url2: record.url2,
            description: record.description,
            data_format: DataFormat::from_str(&record.data_format).unwrap_or_default(),
            area: record.area.as_deref().and_then(AreaName::from_str),
            content_hash: record.content_hash,
            last_scraped_at: parse_datetime_opt(record.last_scraped_at),
            last_checked_at: parse_datetime_opt(record.last_checked_at),
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::trail_conditions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TrailConditionRecord {
    pub id: i32,
    pub source_id: i32,
    pub url1: String,
    pub trail_name: String,
    pub mountain_name_raw: String,
    pub title: String,
    pub description: String,
    pub reported_at: Option<String>,
    pub resolved_at: Option<String>,
    pub status: String,
    pub area: String,
    pub reference_url: String,
    pub comment: String,
    pub ai_model: String,
    pub prompt_file: String,
    pub ai_config: String,
    pub mountain_group_id: Option<i32>,
    pub disabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Owned row for insertion; also carries the columns an update rewrites.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = schema::trail_conditions)]
pub struct NewTrailCondition {
    pub source_id: i32,
    pub url1: String,
    pub trail_name: String,
    pub mountain_name_raw: String,
    pub title: String,
    pub description: String,
    pub reported_at: Option<String>,
    pub resolved_at: Option<String>,
    pub status: String,
    pub area: String,
    pub reference_url: String,
    pub comment: String,
    pub ai_model: String,
    pub prompt_file: String,
    pub ai_config: String,
    pub mountain_group_id: Option<i32>,
    pub disabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

fn config_json(config: &GenerationConfig) -> String {
    serde_json::to_string(config).unwrap_or_else(|_| "{}".to_string())
}

impl From<&StoredRecord> for NewTrailCondition {
    fn from(record: &StoredRecord) -> Self {
        Self {
            source_id: record.source_id,
            url1: record.url1.clone(),
            trail_name: record.trail_name.clone(),
            mountain_name_raw: record.mountain_name_raw.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            reported_at: format_date(record.reported_at),
            resolved_at: format_date(record.resolved_at),
            status: record.status.as_str().to_string(),
            area: record.area.as_str().to_string(),
            reference_url: record.reference_url.clone(),
            comment: record.comment.clone(),
            ai_model: record.ai_model.clone(),
            prompt_file: record.prompt_file.clone(),
            ai_config: config_json(&record.ai_config),
            mountain_group_id: record.mountain_group_id,
            disabled: record.disabled,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

impl From<TrailConditionRecord> for StoredRecord {
    fn from(record: TrailConditionRecord) -> Self {
        StoredRecord {
            id: Some(record.id),
            source_id: record.source_id,
            url1: record.url1,
            trail_name: record.trail_name,
            mountain_name_raw: record.mountain_name_raw,
            title: record.title,
            description: record.description,
            reported_at: parse_date_opt(record.reported_at),
            resolved_at: parse_date_opt(record.resolved_at),
            status: StatusType::from_str(&record.status).unwrap_or_default(),
            area: AreaName::from_str(&record.area).unwrap_or_default(),
            reference_url: record.reference_url,
            comment: record.comment,
            ai_model: record.ai_model,
            prompt_file: record.prompt_file,
            ai_config: serde_json::from_str(&record.ai_config).unwrap_or_default(),
            mountain_group_id: record.mountain_group_id,
            disabled: record.disabled,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::llm_usage)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LlmUsageRecord {
    pub id: i32,
    pub source_id: i32,
    pub model: String,
    pub prompt_tokens: i64,
    pub thinking_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub conditions_extracted: i32,
    pub success: bool,
    pub execution_time_seconds: f64,
    pub created_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::llm_usage)]
pub struct NewLlmUsage<'a> {
    pub source_id: i32,
    pub model: &'a str,
    pub prompt_tokens: i64,
    pub thinking_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub conditions_extracted: i32,
    pub success: bool,
    pub execution_time_seconds: f64,
    pub created_at: String,
}

impl<'a> From<&'a UsageRecord> for NewLlmUsage<'a> {
    fn from(usage: &'a UsageRecord) -> Self {
        Self {
            source_id: usage.source_id,
            model: &usage.model,
            prompt_tokens: usage.prompt_tokens,
            thinking_tokens: usage.thinking_tokens,
            output_tokens: usage.output_tokens,
            cost_usd: usage.cost_usd,
            conditions_extracted: usage.conditions_extracted,
            success: usage.success,
            execution_time_seconds: usage.execution_time_seconds,
            created_at: usage.created_at.to_rfc3339(),
        }
    }
}

impl From<LlmUsageRecord> for UsageRecord {
    fn from(record: LlmUsageRecord) -> Self {
        UsageRecord {
            id: Some(record.id),
            source_id: record.source_id,
            model: record.model,
            prompt_tokens: record.prompt_tokens,
            thinking_tokens: record.thinking_tokens,
            output_tokens: record.output_tokens,
            cost_usd: record.cost_usd,
            conditions_extracted: record.conditions_extracted,
            success: record.success,
            execution_time_seconds: record.execution_time_seconds,
            created_at: parse_datetime(&record.created_at),
        }
    }
}
