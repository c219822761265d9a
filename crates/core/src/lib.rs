//! `bassline-core` -- job domain model and lifecycle rules.
//!
//! Pure domain types shared by every worker process: the [`Job`] record,
//! its status machine, and the core error taxonomy. Zero internal
//! dependency constraint: this crate must not depend on the store or on
//! any collaborator client.
//!
//! [`Job`]: domain::Job

pub mod domain;
pub mod error;

pub use domain::{Job, JobStatus, ResultMode, SourceMode};
pub use error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
