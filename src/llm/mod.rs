//! LLM extraction: provider backends, prompts, schema validation and cost.

pub mod client;
mod error;
pub mod prompts;
pub mod providers;
pub mod pricing;
pub mod schema;
pub mod stats;

pub use client::{
    Extraction, ExtractionClient, ExtractionFailure, ExtractionRequest, LlmConfig, LlmProvider,
    ModelId,
};
pub use error::LlmError;
pub use prompts::{PromptError, PromptOverrides, PromptStore, ResolvedPrompt};
pub use providers::{BackendFactory, HttpBackendFactory, LlmBackend};
pub use stats::{LlmStats, TokenStats, TokenUsage};
