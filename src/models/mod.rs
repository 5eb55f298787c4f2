//! Data models for trailsync.

mod condition;
mod source;
mod usage;

pub use condition::{
    AreaName, CandidateRecord, GenerationConfig, Provenance, StatusType, StoredRecord,
};
pub use source::{DataFormat, OrganizationType, Source};
pub use usage::UsageRecord;
