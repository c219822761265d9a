//! HTTP implementation of [`InferenceClient`].
//!
//! Endpoints, matching the ML server's v1 API:
//!
//! * `POST {base}/v1/process`       -- synchronous process request
//! * `GET  {base}/v1/status/{id}`   -- remote status query
//!
//! All transport failures surface as [`MlError::Transport`], decode
//! failures as [`MlError::Protocol`]; neither is interpreted here.

use std::time::Duration;

use async_trait::async_trait;

use crate::contract::{InferenceClient, ProcessRequest, ProcessResponse, StatusResponse};
use crate::error::MlError;

/// Reqwest-backed client for one ML inference service instance.
pub struct HttpInferenceClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpInferenceClient {
    /// Build a client for `base_url` (e.g. `http://127.0.0.1:8001`) with
    /// a per-request timeout.
    ///
    /// The timeout should comfortably cover a full synchronous process
    /// call, which may run for minutes on long inputs.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, MlError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MlError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn process(&self, request: &ProcessRequest) -> Result<ProcessResponse, MlError> {
        let url = format!("{}/v1/process", self.base_url);
        tracing::debug!(job_id = %request.job_id, url = %url, "Sending process request");

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| MlError::Transport(format!("process request failed: {e}")))?
            .error_for_status()
            .map_err(|e| MlError::Transport(format!("process request rejected: {e}")))?;

        response
            .json::<ProcessResponse>()
            .await
            .map_err(|e| MlError::Protocol(format!("bad process response: {e}")))
    }

    async fn status(&self, job_id: &str) -> Result<StatusResponse, MlError> {
        let url = format!("{}/v1/status/{}", self.base_url, job_id);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| MlError::Transport(format!("status query failed: {e}")))?
            .error_for_status()
            .map_err(|e| MlError::Transport(format!("status query rejected: {e}")))?;

        response
            .json::<StatusResponse>()
            .await
            .map_err(|e| MlError::Protocol(format!("bad status response: {e}")))
    }
}
