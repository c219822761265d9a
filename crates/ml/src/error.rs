/// Errors from external collaborators.
///
/// How these map onto job outcomes is the caller's decision: a failed
/// fetch or process call fails the job, while a failed status *query*
/// is retried on the next reconciliation cycle.
#[derive(Debug, thiserror::Error)]
pub enum MlError {
    /// The collaborator could not be reached, timed out, or reported a
    /// transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The collaborator answered, but the payload could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
