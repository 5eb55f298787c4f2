//! LLM usage accounting records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One extraction call's token usage and cost. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Option<i32>,
    pub source_id: i32,
    pub model: String,
    pub prompt_tokens: i64,
    pub thinking_tokens: i64,
    pub output_tokens: i64,
    /// Cost in USD.
    pub cost_usd: f64,
    pub conditions_extracted: i32,
    pub success: bool,
    pub execution_time_seconds: f64,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn total_tokens(&self) -> i64 {
        self.prompt_tokens + self.thinking_tokens + self.output_tokens
    }
}
