//! Job record and its linear status machine.
//!
//! A [`Job`] moves `Queued -> Submitted -> {Done | Failed}` and never
//! backwards. Every mutator bumps `updated_at`, which the reconciliation
//! stage uses as the base of its timeout deadline. The transition methods
//! are the only supported way to change `status`; they enforce the
//! invariants that `result_artifact_path` is set exactly on `Done` and
//! `error` exactly on `Failed`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::Timestamp;

// ---------------------------------------------------------------------------
// Status and mode enums
// ---------------------------------------------------------------------------

/// Job lifecycle status. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Submitted,
    Done,
    Failed,
}

impl JobStatus {
    /// Canonical wire token, also used as the stored hash field value.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Submitted => "submitted",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether the status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "submitted" => Ok(JobStatus::Submitted),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown job status token: \"{other}\""
            ))),
        }
    }
}

/// What the fetched input artifact represents: the full original mix or
/// an already isolated stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    #[default]
    Original,
    Separated,
}

impl SourceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceMode::Original => "original",
            SourceMode::Separated => "separated",
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(SourceMode::Original),
            "separated" => Ok(SourceMode::Separated),
            other => Err(CoreError::Validation(format!(
                "Unknown source mode token: \"{other}\""
            ))),
        }
    }
}

/// What the inference stage must produce for this job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultMode {
    /// Separated stem plus tempo and symbolic events.
    #[default]
    Full,
    /// Separated stem only.
    Separate,
    /// Tempo and note events only.
    Analyze,
    /// Tablature only.
    Tab,
}

impl ResultMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultMode::Full => "full",
            ResultMode::Separate => "separate",
            ResultMode::Analyze => "analyze",
            ResultMode::Tab => "tab",
        }
    }
}

impl fmt::Display for ResultMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ResultMode::Full),
            "separate" => Ok(ResultMode::Separate),
            "analyze" => Ok(ResultMode::Analyze),
            "tab" => Ok(ResultMode::Tab),
            other => Err(CoreError::Validation(format!(
                "Unknown result mode token: \"{other}\""
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Job record
// ---------------------------------------------------------------------------

/// A unit of work tracked from submission to a terminal outcome.
///
/// The struct is a plain snapshot; persistence and locking live in the
/// store layer. Mutators return [`CoreError::InvalidTransition`] for any
/// move the lifecycle does not allow.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Opaque globally unique id (UUID v4, simple format).
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Where to fetch the audio from (e.g. a YouTube URL). Required
    /// before the fetch stage may run; validated there, not here.
    pub source_reference: Option<String>,
    pub source_mode: SourceMode,
    pub result_mode: ResultMode,
    /// Local path of the fetched input artifact. Set when fetch completes.
    pub input_artifact_path: Option<String>,
    /// Path of the produced result. Set only on `Done`.
    pub result_artifact_path: Option<String>,
    /// Human-readable failure reason. Set only on `Failed`.
    pub error: Option<String>,
}

impl Job {
    /// Create a fresh `Queued` job with a generated id.
    pub fn new(
        source_reference: Option<String>,
        source_mode: SourceMode,
        result_mode: ResultMode,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            job_id: uuid::Uuid::new_v4().simple().to_string(),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            source_reference,
            source_mode,
            result_mode,
            input_artifact_path: None,
            result_artifact_path: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `Queued -> Submitted`: the input artifact has been fetched and the
    /// job handed to the inference stage.
    pub fn mark_submitted(&mut self, input_artifact_path: String) -> Result<(), CoreError> {
        if self.status != JobStatus::Queued {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: JobStatus::Submitted,
            });
        }
        self.status = JobStatus::Submitted;
        self.input_artifact_path = Some(input_artifact_path);
        self.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// `Submitted -> Done`: inference produced a result artifact.
    pub fn mark_done(&mut self, result_artifact_path: String) -> Result<(), CoreError> {
        if self.status != JobStatus::Submitted {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: JobStatus::Done,
            });
        }
        self.status = JobStatus::Done;
        self.result_artifact_path = Some(result_artifact_path);
        self.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// `{Queued, Submitted} -> Failed`. Terminal jobs are never reverted,
    /// so failing an already `Done` or `Failed` job is rejected.
    pub fn mark_failed(&mut self, error: String) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: JobStatus::Failed,
            });
        }
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.updated_at = chrono::Utc::now();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn queued_job() -> Job {
        Job::new(
            Some("https://youtube.com/watch?v=abc123".into()),
            SourceMode::Original,
            ResultMode::Full,
        )
    }

    // -- lifecycle ------------------------------------------------------------

    #[test]
    fn new_job_is_queued_with_generated_id() {
        let job = queued_job();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(!job.job_id.is_empty());
        assert_eq!(job.created_at, job.updated_at);
        assert!(job.input_artifact_path.is_none());
        assert!(job.result_artifact_path.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn queued_to_submitted_records_input_path() {
        let mut job = queued_job();
        job.mark_submitted("/tmp/in.wav".into()).unwrap();
        assert_eq!(job.status, JobStatus::Submitted);
        assert_eq!(job.input_artifact_path.as_deref(), Some("/tmp/in.wav"));
    }

    #[test]
    fn submitted_to_done_records_result_path() {
        let mut job = queued_job();
        job.mark_submitted("/tmp/in.wav".into()).unwrap();
        job.mark_done("/tmp/out.wav".into()).unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.result_artifact_path.as_deref(), Some("/tmp/out.wav"));
        assert!(job.error.is_none());
    }

    #[test]
    fn failure_records_reason_from_either_live_state() {
        let mut from_queued = queued_job();
        from_queued.mark_failed("missing source reference".into()).unwrap();
        assert_eq!(from_queued.status, JobStatus::Failed);
        assert_eq!(
            from_queued.error.as_deref(),
            Some("missing source reference")
        );

        let mut from_submitted = queued_job();
        from_submitted.mark_submitted("/tmp/in.wav".into()).unwrap();
        from_submitted.mark_failed("inference exploded".into()).unwrap();
        assert_eq!(from_submitted.status, JobStatus::Failed);
    }

    // -- illegal transitions --------------------------------------------------

    #[test]
    fn done_is_not_reachable_from_queued() {
        let mut job = queued_job();
        let err = job.mark_done("/tmp/out.wav".into()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTransition {
                from: JobStatus::Queued,
                to: JobStatus::Done,
            }
        ));
        // The failed attempt must not have touched the record.
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.result_artifact_path.is_none());
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut job = queued_job();
        job.mark_submitted("/tmp/in.wav".into()).unwrap();
        job.mark_done("/tmp/out.wav".into()).unwrap();

        assert!(job.mark_failed("late failure".into()).is_err());
        assert!(job.mark_submitted("/tmp/again.wav".into()).is_err());
        assert_eq!(job.status, JobStatus::Done);

        let mut failed = queued_job();
        failed.mark_failed("boom".into()).unwrap();
        assert!(failed.mark_done("/tmp/out.wav".into()).is_err());
        assert!(failed.mark_failed("boom again".into()).is_err());
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn submitted_cannot_be_resubmitted() {
        let mut job = queued_job();
        job.mark_submitted("/tmp/in.wav".into()).unwrap();
        assert!(job.mark_submitted("/tmp/other.wav".into()).is_err());
    }

    // -- tokens ---------------------------------------------------------------

    #[test]
    fn status_tokens_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Submitted,
            JobStatus::Done,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn mode_tokens_round_trip() {
        for mode in [SourceMode::Original, SourceMode::Separated] {
            assert_eq!(mode.as_str().parse::<SourceMode>().unwrap(), mode);
        }
        for mode in [
            ResultMode::Full,
            ResultMode::Separate,
            ResultMode::Analyze,
            ResultMode::Tab,
        ] {
            assert_eq!(mode.as_str().parse::<ResultMode>().unwrap(), mode);
        }
    }
}
