//! Fetch-stage loop: `Queued -> Submitted`.
//!
//! Pops job ids off the fetch queue, downloads the input artifact via
//! the [`AudioFetcher`] collaborator, and hands successful jobs to the
//! submit stage (submit queue + submitted set). Every mutation happens
//! under the job's lock; contention means another instance has it and
//! we skip. Per-job failures are persisted as `Failed` and never abort
//! the loop.

use std::sync::Arc;

use bassline_core::JobStatus;
use bassline_ml::AudioFetcher;
use bassline_store::{JobStore, StoreError};

use crate::config::FetchConfig;
use crate::shutdown::Shutdown;

pub struct FetchWorker {
    store: Arc<dyn JobStore>,
    fetcher: Arc<dyn AudioFetcher>,
    config: FetchConfig,
    shutdown: Shutdown,
}

impl FetchWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        fetcher: Arc<dyn AudioFetcher>,
        config: FetchConfig,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            store,
            fetcher,
            config,
            shutdown,
        }
    }

    /// Run until shutdown. The blocking pop is bounded by
    /// `dequeue_timeout`, which also bounds shutdown latency.
    pub async fn run(self) {
        tracing::info!(queue = %self.config.fetch_queue, "Fetch worker started");
        while !self.shutdown.is_triggered() {
            let job_id = match self
                .store
                .dequeue(&self.config.fetch_queue, self.config.dequeue_timeout)
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

            // A store error here is a per-job failure, not a loop failure.
            if let Err(e) = self.process_one(&job_id).await {
                tracing::error!(job_id = %job_id, error = %e, "Fetch processing failed");
            }
        }
        tracing::info!("Fetch worker stopped");
    }

    /// Handle one dequeued id: validate, lock, fetch, persist, unlock.
    pub async fn process_one(&self, job_id: &str) -> Result<(), StoreError> {
        let Some(job) = self.store.get(job_id).await? else {
            tracing::debug!(job_id, "Dequeued id has no live record, skipping");
            return Ok(());
        };
        if job.status != JobStatus::Queued {
            // Stale or duplicated queue entry; the record is authoritative.
            tracing::debug!(job_id, status = %job.status, "Skipping non-queued entry");
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

        let outcome = self.fetch_locked(job_id).await;

        // Guaranteed cleanup: the lock is released whatever happened above.
        match self.store.release_lock(job_id, &token).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(job_id, "Lock no longer owned at release; TTL elapsed mid-fetch?")
            }
            Err(e) => tracing::error!(job_id, error = %e, "Lock release failed"),
        }

        outcome
    }

    async fn fetch_locked(&self, job_id: &str) -> Result<(), StoreError> {
        // Re-read under the lock: the pre-lock snapshot may be stale. A
        // duplicate queue entry can mean another worker locked, fetched,
        // and released in the window before our acquisition.
        let Some(mut job) = self.store.get(job_id).await? else {
            return Ok(());
        };
        if job.status != JobStatus::Queued {
            tracing::debug!(job_id, status = %job.status, "Status changed before lock, skipping");
            return Ok(());
        }

        let Some(reference) = job.source_reference.clone() else {
            tracing::warn!(job_id, "Job has no source reference, failing");
            if job.mark_failed("missing source reference".into()).is_ok() {
                self.store.save(&job, Some(self.config.job_ttl)).await?;
            }
            // Never entered the submitted set; nothing to clean up there.
            return Ok(());
        };

        let output_path = self.config.output_dir.join(format!("{job_id}.wav"));
        match self.fetcher.fetch(&reference, &output_path).await {
            Ok(artifact) => {
                let artifact = artifact.to_string_lossy().into_owned();
                if job.mark_submitted(artifact.clone()).is_ok() {
                    self.store.save(&job, Some(self.config.job_ttl)).await?;
                    self.store.add_submitted(job_id).await?;
                    self.store
                        .enqueue(&self.config.submit_queue, job_id)
                        .await?;
                    tracing::info!(
                        job_id,
                        artifact = %artifact,
                        "Input artifact fetched, handed to submit stage",
                    );
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Fetch failed");
                if job.mark_failed(format!("fetch failed: {e}")).is_ok() {
                    self.store.save(&job, Some(self.config.job_ttl)).await?;
                }
                // Defensive: make sure a failed job is not tracked as
                // awaiting external completion.
                self.store.remove_submitted(job_id).await?;
                Ok(())
            }
        }
    }
}
