use crate::domain::JobStatus;

/// Domain-level errors.
///
/// Lock contention and "record not found" are deliberately absent: the
/// former is a normal skip signal and the latter belongs to the store
/// layer. Everything here fails a *job*, never a worker process.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A status transition that the linear lifecycle does not allow.
    /// Terminal states never transition again.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// A required input was missing or malformed.
    #[error("Validation failed: {0}")]
    Validation(String),
}
