//! trailsync - mountain trail condition monitor.
//!
//! Fetches the pages of configured information sources, skips the ones whose
//! readable text did not change, extracts structured trail conditions with an
//! LLM, and reconciles them against previously stored records by fuzzy
//! matching before committing updates and inserts.

pub mod cli;
pub mod config;
pub mod http_client;
pub mod llm;
pub mod models;
pub mod rate_limit;
pub mod repository;
pub mod schema;
pub mod services;
pub mod utils;
