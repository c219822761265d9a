//! Collaborator traits and the wire shapes they exchange.
//!
//! Contracts only -- no transport details. The worker loops hold these
//! as `Arc<dyn ...>` so tests can substitute scripted fakes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bassline_core::{ResultMode, SourceMode};
use serde::{Deserialize, Serialize};

use crate::error::MlError;

/// Fetches the audio input artifact for a job.
///
/// Given a source reference (e.g. a YouTube URL) and the desired output
/// location, produces a local artifact and returns its path. May run
/// long; implementations must be safe to invoke concurrently from
/// independent workers with no shared state between invocations.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch(&self, source_reference: &str, output_path: &Path)
        -> Result<PathBuf, MlError>;
}

/// Talks to the ML inference service.
///
/// `process` is the synchronous request/response path used by the
/// submit stage; `status` is the polling path used by reconciliation
/// for work the service completes asynchronously.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn process(&self, request: &ProcessRequest) -> Result<ProcessResponse, MlError>;

    async fn status(&self, job_id: &str) -> Result<StatusResponse, MlError>;
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Payload for `POST /v1/process`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessRequest {
    pub job_id: String,
    pub input_artifact_path: String,
    pub source_mode: SourceMode,
    pub result_mode: ResultMode,
    /// Free-form caller metadata, e.g. which worker submitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// Outcome of a synchronous process call.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessResponse {
    pub ok: bool,
    #[serde(default)]
    pub result: Option<ProcessResult>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Structured result of a completed inference run: the produced artifact
/// plus derived attributes (tempo, symbolic events).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessResult {
    #[serde(default)]
    pub result_path: Option<String>,
    #[serde(default)]
    pub tempo_bpm: Option<f64>,
    #[serde(default)]
    pub notes: Option<Vec<NoteEvent>>,
    #[serde(default)]
    pub tabs: Option<Vec<TabEvent>>,
}

/// A detected note.
#[derive(Debug, Clone, Deserialize)]
pub struct NoteEvent {
    pub onset_secs: f64,
    pub duration_secs: f64,
    pub midi_pitch: u8,
}

/// A tablature event (string/fret placement).
#[derive(Debug, Clone, Deserialize)]
pub struct TabEvent {
    pub onset_secs: f64,
    pub string: u8,
    pub fret: u8,
}

/// Remote lifecycle state reported by `GET /v1/status/{job_id}`.
///
/// Anything the service reports that we do not recognize decodes to
/// `Unknown`, which reconciliation treats as "still in flight".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum RemoteStatus {
    Queued,
    Running,
    Done,
    Failed,
    Unknown,
}

impl From<String> for RemoteStatus {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "queued" => RemoteStatus::Queued,
            "running" => RemoteStatus::Running,
            "done" => RemoteStatus::Done,
            "failed" => RemoteStatus::Failed,
            _ => RemoteStatus::Unknown,
        }
    }
}

/// Reply to a status query.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: RemoteStatus,
    #[serde(default)]
    pub result: Option<ProcessResult>,
    #[serde(default)]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
