//! Token usage and cost statistics for extraction calls.

use std::time::Duration;

use chrono::Utc;

use super::pricing::{fee, rates_for};
use crate::models::UsageRecord;

/// Token counts reported by a provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    /// Reasoning/thinking tokens, billed at the output rate.
    pub thinking_tokens: u64,
    /// Visible output tokens, excluding thinking.
    pub output_tokens: u64,
}

/// Accumulated token counts and derived fees for one extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenStats {
    pub model: String,
    pub input_tokens: u64,
    pub thinking_tokens: u64,
    pub output_tokens: u64,
    pub input_chars: usize,
    pub output_chars: usize,
}

impl TokenStats {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            input_tokens: 0,
            thinking_tokens: 0,
            output_tokens: 0,
            input_chars: 0,
            output_chars: 0,
        }
    }

    /// Add one call's usage.
    pub fn record(&mut self, usage: &TokenUsage, input_chars: usize, output_chars: usize) {
        self.input_tokens += usage.input_tokens;
        self.thinking_tokens += usage.thinking_tokens;
        self.output_tokens += usage.output_tokens;
        self.input_chars += input_chars;
        self.output_chars += output_chars;
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.thinking_tokens + self.output_tokens
    }

    pub fn input_fee(&self) -> f64 {
        fee(self.input_tokens, rates_for(&self.model, self.input_tokens).input)
    }

    pub fn thinking_fee(&self) -> f64 {
        fee(self.thinking_tokens, rates_for(&self.model, self.input_tokens).output)
    }

    pub fn output_fee(&self) -> f64 {
        fee(self.output_tokens, rates_for(&self.model, self.input_tokens).output)
    }

    /// Total cost in USD.
    pub fn total_fee(&self) -> f64 {
        self.input_fee() + self.thinking_fee() + self.output_fee()
    }
}

/// Token stats plus run metadata for one extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmStats {
    pub tokens: TokenStats,
    pub execution_time: Duration,
    pub retry_count: u32,
    pub validation_success: bool,
    pub extraction_count: usize,
}

impl LlmStats {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            tokens: TokenStats::new(model),
            execution_time: Duration::ZERO,
            retry_count: 0,
            validation_success: false,
            extraction_count: 0,
        }
    }

    pub fn cost_usd(&self) -> f64 {
        self.tokens.total_fee()
    }

    /// Usage row for persistence.
    pub fn to_usage_record(&self, source_id: i32, success: bool) -> UsageRecord {
        UsageRecord {
            id: None,
            source_id,
            model: self.tokens.model.clone(),
            prompt_tokens: self.tokens.input_tokens as i64,
            thinking_tokens: self.tokens.thinking_tokens as i64,
            output_tokens: self.tokens.output_tokens as i64,
            cost_usd: self.cost_usd(),
            conditions_extracted: self.extraction_count as i32,
            success,
            execution_time_seconds: self.execution_time.as_secs_f64(),
            created_at: Utc::now(),
        }
    }
}
