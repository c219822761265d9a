//! Reconciliation loop for jobs parked in `Submitted`.
//!
//! The inference service may finish (or lose) work without any push
//! back to us. Each cycle samples a bounded random subset of the
//! submitted set, asks the service where each job stands, and closes
//! out the ones that are done, failed, or older than the submitted
//! timeout. A transport failure on a status query leaves the job
//! untouched; a later cycle will sample it again.
//!
//! Close-outs take the job lock and re-validate the status under it, so
//! a concurrent submit worker finishing the same job cannot be
//! overwritten.

use std::sync::Arc;

use bassline_core::JobStatus;
use bassline_ml::{InferenceClient, RemoteStatus};
use bassline_store::{JobStore, StoreError};
use chrono::Utc;
use tokio::sync::Semaphore;

use crate::config::ReconcileConfig;
use crate::shutdown::Shutdown;

pub struct ReconcileWorker {
    store: Arc<dyn JobStore>,
    client: Arc<dyn InferenceClient>,
    config: ReconcileConfig,
    shutdown: Shutdown,
}

/// What a single reconciliation decided to do with a job.
enum CloseOut {
    /// Remote finished; `Done` with this result path.
    RemoteDone(String),
    /// Remote failed with this reason.
    RemoteFailed(String),
    /// Remote claimed done but produced no artifact path.
    DoneWithoutResult,
    /// Submitted longer than the configured timeout.
    TimedOut,
}

impl ReconcileWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        client: Arc<dyn InferenceClient>,
        config: ReconcileConfig,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            store,
            client,
            config,
            shutdown,
        }
    }

    /// Run cycles until shutdown, sleeping `poll_interval` between them.
    pub async fn run(self) {
        tracing::info!(
            sample_size = self.config.sample_size,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Reconcile worker started",
        );
        while !self.shutdown.is_triggered() {
            self.run_cycle().await;
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = self.shutdown.triggered() => {}
            }
        }
        tracing::info!("Reconcile worker stopped");
    }

    /// Sample the submitted set once and reconcile each member, with at
    /// most `max_concurrent_checks` status queries in flight.
    pub async fn run_cycle(&self) {
        let sample = match self.store.sample_submitted(self.config.sample_size).await {
            Ok(sample) => sample,
            Err(e) => {
                tracing::error!(error = %e, "Sampling the submitted set failed");
                return;
            }
        };
        if sample.is_empty() {
            return;
        }
        tracing::debug!(count = sample.len(), "Reconciling submitted jobs");

        let limiter = Arc::new(Semaphore::new(self.config.max_concurrent_checks.max(1)));
        let checks = sample.into_iter().map(|job_id| {
            let limiter = Arc::clone(&limiter);
            async move {
                // acquire only fails if the semaphore is closed, which
                // it never is here.
                let Ok(_permit) = limiter.acquire().await else {
                    return;
                };
                if let Err(e) = self.reconcile_one(&job_id).await {
                    tracing::error!(job_id = %job_id, error = %e, "Reconciliation failed");
                }
            }
        });
        futures::future::join_all(checks).await;
    }

    /// Decide what, if anything, to do with one submitted-set member.
    pub async fn reconcile_one(&self, job_id: &str) -> Result<(), StoreError> {
        let Some(job) = self.store.get(job_id).await? else {
            // Record expired or was deleted; the set entry is an orphan.
            tracing::debug!(job_id, "Submitted-set member has no record, untracking");
            self.store.remove_submitted(job_id).await?;
            return Ok(());
        };

        if job.is_terminal() {
            // Closed out elsewhere without the set cleanup landing.
            tracing::debug!(job_id, status = %job.status, "Terminal job still tracked, untracking");
            self.store.remove_submitted(job_id).await?;
            return Ok(());
        }
        if job.status != JobStatus::Submitted {
            // Queued jobs do not belong in the set yet; leave them for
            // the fetch stage to sort out.
            return Ok(());
        }

        let age = Utc::now()
            .signed_duration_since(job.updated_at)
            .to_std()
            .unwrap_or_default();
        if age > self.config.submitted_timeout {
            tracing::warn!(job_id, age_secs = age.as_secs(), "Submitted job timed out");
            return self.close_out(job_id, CloseOut::TimedOut).await;
        }

        let reply = match self.client.status(job_id).await {
            Ok(reply) => reply,
            Err(e) => {
                // Could be transient; leave the job for a later cycle.
                tracing::debug!(job_id, error = %e, "Status query failed, leaving job tracked");
                return Ok(());
            }
        };

        match reply.status {
            RemoteStatus::Done => {
                let result_path = reply.result.and_then(|r| r.result_path);
                match result_path {
                    Some(path) => self.close_out(job_id, CloseOut::RemoteDone(path)).await,
                    None => self.close_out(job_id, CloseOut::DoneWithoutResult).await,
                }
            }
            RemoteStatus::Failed => {
                let reason = reply
                    .error
                    .unwrap_or_else(|| "remote processing failed".to_string());
                self.close_out(job_id, CloseOut::RemoteFailed(reason)).await
            }
            // Still in flight (or unintelligible); check again later.
            RemoteStatus::Queued | RemoteStatus::Running | RemoteStatus::Unknown => Ok(()),
        }
    }

    /// Apply a terminal outcome under the job lock.
    async fn close_out(&self, job_id: &str, outcome: CloseOut) -> Result<(), StoreError> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        if !self
            .store
            .acquire_lock(job_id, &token, self.config.lock_ttl)
            .await?
        {
            // A submit worker has it; whatever it decides wins.
            tracing::debug!(job_id, "Lock held elsewhere, deferring close-out");
            return Ok(());
        }

        let result = self.close_out_locked(job_id, outcome).await;

        match self.store.release_lock(job_id, &token).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(job_id, "Lock no longer owned at release"),
            Err(e) => tracing::error!(job_id, error = %e, "Lock release failed"),
        }

        result
    }

    async fn close_out_locked(&self, job_id: &str, outcome: CloseOut) -> Result<(), StoreError> {
        // Re-read under the lock; the job may have been finished between
        // our status query and the lock acquisition.
        let Some(mut job) = self.store.get(job_id).await? else {
            self.store.remove_submitted(job_id).await?;
            return Ok(());
        };
        if job.status != JobStatus::Submitted {
            tracing::debug!(job_id, status = %job.status, "Status changed before lock, skipping");
            if job.is_terminal() {
                self.store.remove_submitted(job_id).await?;
            }
            return Ok(());
        }

        let transition = match outcome {
            CloseOut::RemoteDone(path) => {
                tracing::info!(job_id, result_path = %path, "Remote finished job, closing out");
                job.mark_done(path)
            }
            CloseOut::RemoteFailed(reason) => {
                tracing::warn!(job_id, reason = %reason, "Remote failed job, closing out");
                job.mark_failed(reason)
            }
            CloseOut::DoneWithoutResult => {
                tracing::warn!(job_id, "Remote reported done without a result path");
                job.mark_failed("remote reported done without a result path".into())
            }
            CloseOut::TimedOut => job.mark_failed(format!(
                "timed out after {}s in submitted",
                self.config.submitted_timeout.as_secs()
            )),
        };
        if transition.is_err() {
            // Status was re-checked above, so this should not happen.
            tracing::warn!(job_id, "Terminal transition rejected");
            return Ok(());
        }

        self.store.save(&job, Some(self.config.job_ttl)).await?;
        self.store.remove_submitted(&job.job_id).await?;
        Ok(())
    }
}
