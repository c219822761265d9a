/// Storage-layer errors.
///
/// `NotFound` is a structured signal, not an exception path: callers that
/// can treat "already cleaned up" as success should match on it instead
/// of propagating. Lock contention is not represented here at all --
/// [`acquire_lock`](crate::JobStore::acquire_lock) returns `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `create` was called for a job id that already has a live record.
    #[error("Job already exists: {job_id}")]
    AlreadyExists { job_id: String },

    /// `save` was called for a job id with no live record (never created,
    /// expired, or deleted).
    #[error("Job not found: {job_id}")]
    NotFound { job_id: String },

    /// The underlying store could not be reached or rejected a command.
    #[error("Store backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// A stored record could not be decoded back into a `Job`.
    #[error("Corrupt job record: {0}")]
    Decode(String),
}
