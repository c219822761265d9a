//! Submit-stage loop: `Submitted -> Done | Failed`.
//!
//! Pops job ids off the submit queue and drives one synchronous
//! inference call per job. The outcome is terminal either way: a
//! transport failure on `process` is indistinguishable from a lost
//! request, so the job is failed rather than retried. Terminal jobs
//! leave the submitted set.

use std::sync::Arc;

use bassline_core::{Job, JobStatus};
use bassline_ml::{InferenceClient, ProcessRequest};
use bassline_store::{JobStore, StoreError};

use crate::config::SubmitConfig;
use crate::shutdown::Shutdown;

pub struct SubmitWorker {
    store: Arc<dyn JobStore>,
    client: Arc<dyn InferenceClient>,
    config: SubmitConfig,
    shutdown: Shutdown,
}

impl SubmitWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        client: Arc<dyn InferenceClient>,
        config: SubmitConfig,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            store,
            client,
            config,
            shutdown,
        }
    }

    /// Run until shutdown, bounded per iteration by `dequeue_timeout`.
    pub async fn run(self) {
        tracing::info!(queue = %self.config.submit_queue, "Submit worker started");
        while !self.shutdown.is_triggered() {
            let job_id = match self
                .store
                .dequeue(&self.config.submit_queue, self.config.dequeue_timeout)
                .await
            {
                Ok(Some(job_id)) => job_id,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "Dequeue failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.dequeue_timeout) => {}
                        _ = self.shutdown.triggered() => {}
                    }
                    continue;
                }
            };

            if let Err(e) = self.process_one(&job_id).await {
                tracing::error!(job_id = %job_id, error = %e, "Submit processing failed");
            }
        }
        tracing::info!("Submit worker stopped");
    }

    /// Handle one dequeued id: validate, lock, call inference, persist,
    /// unlock.
    pub async fn process_one(&self, job_id: &str) -> Result<(), StoreError> {
        let Some(job) = self.store.get(job_id).await? else {
            tracing::debug!(job_id, "Dequeued id has no live record, skipping");
            return Ok(());
        };
        if job.status != JobStatus::Submitted {
            tracing::debug!(job_id, status = %job.status, "Skipping non-submitted entry");
            return Ok(());
        }

        let token = uuid::Uuid::new_v4().simple().to_string();
        if !self
            .store
            .acquire_lock(job_id, &token, self.config.lock_ttl)
            .await?
        {
            tracing::debug!(job_id, "Lock held elsewhere, skipping");
            return Ok(());
        }

        let outcome = self.submit_locked(job_id).await;

        match self.store.release_lock(job_id, &token).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(job_id, "Lock no longer owned at release; TTL elapsed mid-call?")
            }
            Err(e) => tracing::error!(job_id, error = %e, "Lock release failed"),
        }

        outcome
    }

    async fn submit_locked(&self, job_id: &str) -> Result<(), StoreError> {
        // Re-read under the lock: the pre-lock snapshot may be stale.
        let Some(mut job) = self.store.get(job_id).await? else {
            return Ok(());
        };
        if job.status != JobStatus::Submitted {
            tracing::debug!(job_id, status = %job.status, "Status changed before lock, skipping");
            return Ok(());
        }

        let Some(input_path) = job.input_artifact_path.clone() else {
            tracing::warn!(job_id, "Submitted job has no input artifact, failing");
            return self
                .finish(job, |j| j.mark_failed("missing input artifact".into()))
                .await;
        };

        let request = ProcessRequest {
            job_id: job.job_id.clone(),
            input_artifact_path: input_path,
            source_mode: job.source_mode,
            result_mode: job.result_mode,
            meta: None,
        };

        match self.client.process(&request).await {
            Ok(response) if response.ok => {
                let result = response.result.unwrap_or_default();
                match result.result_path {
                    Some(result_path) => {
                        tracing::info!(
                            job_id,
                            result_path = %result_path,
                            tempo_bpm = ?result.tempo_bpm,
                            notes = result.notes.as_ref().map(|n| n.len()),
                            tabs = result.tabs.as_ref().map(|t| t.len()),
                            "Inference complete",
                        );
                        self.finish(job, |j| j.mark_done(result_path)).await
                    }
                    None => {
                        tracing::warn!(job_id, "Inference reported ok without a result path");
                        self.finish(job, |j| {
                            j.mark_failed("inference succeeded without a result path".into())
                        })
                        .await
                    }
                }
            }
            Ok(response) => {
                let reason = response
                    .error
                    .unwrap_or_else(|| "inference rejected the request".to_string());
                tracing::warn!(job_id, reason = %reason, "Inference rejected job");
                self.finish(job, |j| j.mark_failed(reason)).await
            }
            Err(e) => {
                // The request may or may not have been received; without
                // an idempotency guarantee from the service, retrying
                // could double-process, so the job is failed.
                tracing::warn!(job_id, error = %e, "Inference call failed");
                self.finish(job, |j| j.mark_failed(format!("inference call failed: {e}")))
                    .await
            }
        }
    }

    /// Apply a terminal transition, persist it, and drop the job from
    /// the submitted set.
    async fn finish(
        &self,
        mut job: Job,
        transition: impl FnOnce(&mut Job) -> Result<(), bassline_core::CoreError>,
    ) -> Result<(), StoreError> {
        if transition(&mut job).is_err() {
            // Unreachable after the status re-check, but the transition
            // rules stay authoritative.
            tracing::warn!(job_id = %job.job_id, "Terminal transition rejected");
            return Ok(());
        }
        self.store.save(&job, Some(self.config.job_ttl)).await?;
        self.store.remove_submitted(&job.job_id).await?;
        Ok(())
    }
}
