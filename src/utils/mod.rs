//! Shared utility functions.
//!
//! - `html`: readable-text extraction from fetched pages

pub mod html;

pub use html::{extract_readable_text, extract_readable_text_with_base, html_to_text};
