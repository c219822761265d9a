//! Job submission flow.
//!
//! Creates the `Queued` record and hands its id to the fetch stage in
//! two steps: persist first (the record store is the authority), then
//! enqueue (the queue is only a wake-up signal). If the enqueue is lost
//! the record simply expires with its TTL.

use std::time::Duration;

use bassline_core::{Job, ResultMode, SourceMode};
use bassline_store::{JobStore, StoreError};

/// Parameters for a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub source_reference: Option<String>,
    pub source_mode: SourceMode,
    pub result_mode: ResultMode,
}

/// Create a `Queued` job, persist it with `ttl`, and enqueue it on the
/// fetch queue. Returns the created snapshot.
pub async fn create_job(
    store: &dyn JobStore,
    new_job: NewJob,
    fetch_queue: &str,
    ttl: Duration,
) -> Result<Job, StoreError> {
    let job = Job::new(
        new_job.source_reference,
        new_job.source_mode,
        new_job.result_mode,
    );

    store.create(&job, ttl).await?;
    store.enqueue(fetch_queue, &job.job_id).await?;

    tracing::info!(
        job_id = %job.job_id,
        source_mode = %job.source_mode,
        result_mode = %job.result_mode,
        "Job created and queued for fetch",
    );
    Ok(job)
}
