//! Flat string-field serialization of [`Job`] records.
//!
//! A job is stored as a string-keyed hash with exactly these fields:
//! `job_id, status, created_at, updated_at, source_reference,
//! source_mode, result_mode, input_artifact_path, result_artifact_path,
//! error`. Absent optional fields are stored as the empty string and
//! decode back to `None`. Enums use their canonical tokens. Timestamps
//! are RFC 3339 with full precision so that encode/decode round-trips
//! exactly.

use std::collections::HashMap;

use bassline_core::{Job, Timestamp};
use chrono::{DateTime, Utc};

use crate::error::StoreError;

pub const FIELD_JOB_ID: &str = "job_id";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_UPDATED_AT: &str = "updated_at";
pub const FIELD_SOURCE_REFERENCE: &str = "source_reference";
pub const FIELD_SOURCE_MODE: &str = "source_mode";
pub const FIELD_RESULT_MODE: &str = "result_mode";
pub const FIELD_INPUT_ARTIFACT_PATH: &str = "input_artifact_path";
pub const FIELD_RESULT_ARTIFACT_PATH: &str = "result_artifact_path";
pub const FIELD_ERROR: &str = "error";

/// Encode a job as ordered field/value pairs for a hash write.
pub fn encode(job: &Job) -> Vec<(String, String)> {
    fn opt(v: &Option<String>) -> String {
        v.clone().unwrap_or_default()
    }

    vec![
        (FIELD_JOB_ID.into(), job.job_id.clone()),
        (FIELD_STATUS.into(), job.status.as_str().into()),
        (FIELD_CREATED_AT.into(), job.created_at.to_rfc3339()),
        (FIELD_UPDATED_AT.into(), job.updated_at.to_rfc3339()),
        (FIELD_SOURCE_REFERENCE.into(), opt(&job.source_reference)),
        (FIELD_SOURCE_MODE.into(), job.source_mode.as_str().into()),
        (FIELD_RESULT_MODE.into(), job.result_mode.as_str().into()),
        (
            FIELD_INPUT_ARTIFACT_PATH.into(),
            opt(&job.input_artifact_path),
        ),
        (
            FIELD_RESULT_ARTIFACT_PATH.into(),
            opt(&job.result_artifact_path),
        ),
        (FIELD_ERROR.into(), opt(&job.error)),
    ]
}

/// Decode a hash snapshot back into a [`Job`].
///
/// Missing required fields or unknown tokens are a [`StoreError::Decode`]:
/// the record is corrupt, not absent.
pub fn decode(fields: &HashMap<String, String>) -> Result<Job, StoreError> {
    let get = |name: &str| -> &str { fields.get(name).map(String::as_str).unwrap_or("") };
    let opt = |name: &str| -> Option<String> {
        let v = get(name);
        if v.is_empty() {
            None
        } else {
            Some(v.to_string())
        }
    };

    let job_id = get(FIELD_JOB_ID);
    if job_id.is_empty() {
        return Err(StoreError::Decode("missing job_id field".into()));
    }

    let status = get(FIELD_STATUS)
        .parse()
        .map_err(|e| StoreError::Decode(format!("{job_id}: {e}")))?;
    let source_mode = get(FIELD_SOURCE_MODE)
        .parse()
        .map_err(|e| StoreError::Decode(format!("{job_id}: {e}")))?;
    let result_mode = get(FIELD_RESULT_MODE)
        .parse()
        .map_err(|e| StoreError::Decode(format!("{job_id}: {e}")))?;

    Ok(Job {
        job_id: job_id.to_string(),
        status,
        created_at: parse_timestamp(job_id, FIELD_CREATED_AT, get(FIELD_CREATED_AT))?,
        updated_at: parse_timestamp(job_id, FIELD_UPDATED_AT, get(FIELD_UPDATED_AT))?,
        source_reference: opt(FIELD_SOURCE_REFERENCE),
        source_mode,
        result_mode,
        input_artifact_path: opt(FIELD_INPUT_ARTIFACT_PATH),
        result_artifact_path: opt(FIELD_RESULT_ARTIFACT_PATH),
        error: opt(FIELD_ERROR),
    })
}

fn parse_timestamp(job_id: &str, field: &str, raw: &str) -> Result<Timestamp, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("{job_id}: bad {field} \"{raw}\": {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
