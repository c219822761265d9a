//! The polymorphic [`JobStore`] interface.
//!
//! One trait covers all four coordination primitives so that worker code
//! is written once against `Arc<dyn JobStore>` and tested against the
//! in-memory implementation. The lock is a convention, not an enforced
//! guard: every mutator of a job record must `acquire_lock` before
//! calling `save`, and the store cannot check that it did.

use std::time::Duration;

use async_trait::async_trait;
use bassline_core::Job;

use crate::error::StoreError;

#[async_trait]
pub trait JobStore: Send + Sync {
    // ── Job records ──────────────────────────────────────────────────────

    /// Persist a new job record with the given TTL.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if a live record for the
    /// id is present. The write and the expiry are applied atomically in
    /// a single round trip.
    async fn create(&self, job: &Job, ttl: Duration) -> Result<(), StoreError>;

    /// Load a snapshot of the record, or `None` if it never existed or
    /// has expired. All fields are read atomically; no torn reads.
    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError>;

    /// Overwrite an existing record. Fails with [`StoreError::NotFound`]
    /// if absent. When `ttl` is given the expiry is refreshed atomically
    /// with the write; otherwise the current expiry is kept.
    async fn save(&self, job: &Job, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Remove the record. Idempotent.
    async fn delete(&self, job_id: &str) -> Result<(), StoreError>;

    /// Extend the record's expiry without touching its fields.
    async fn touch_ttl(&self, job_id: &str, ttl: Duration) -> Result<(), StoreError>;

    // ── Per-job lock ─────────────────────────────────────────────────────

    /// Try to take the job's lock with an ownership token.
    ///
    /// A single atomic set-if-absent-with-expiry; never check-then-set.
    /// `Ok(false)` means another holder has it -- a normal skip signal,
    /// not an error. The TTL guarantees eventual release after a crashed
    /// holder.
    async fn acquire_lock(
        &self,
        job_id: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Release the lock only if `token` still owns it.
    ///
    /// Atomic compare-and-delete; a holder whose TTL expired and whose
    /// lock was re-acquired elsewhere gets `Ok(false)` and must not
    /// retry. Returns whether the lock was actually released.
    async fn release_lock(&self, job_id: &str, token: &str) -> Result<bool, StoreError>;

    // ── Hand-off queues ──────────────────────────────────────────────────

    /// Append a job id to the named queue.
    async fn enqueue(&self, queue: &str, job_id: &str) -> Result<(), StoreError>;

    /// Block up to `timeout` for the oldest entry of the named queue.
    ///
    /// Strict FIFO: push and blocking pop use opposite ends of the same
    /// list. Each entry is delivered to exactly one of many competing
    /// consumers. `Ok(None)` on timeout. The queue is only a wake-up
    /// signal; the job record's `status` stays authoritative.
    async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<String>, StoreError>;

    // ── Submitted set ────────────────────────────────────────────────────

    /// Track a job as awaiting asynchronous external completion. Idempotent.
    async fn add_submitted(&self, job_id: &str) -> Result<(), StoreError>;

    /// Stop tracking a job. Idempotent.
    async fn remove_submitted(&self, job_id: &str) -> Result<(), StoreError>;

    /// Up to `n` members, unordered and non-deterministic across calls,
    /// so a large backlog is reconciled in bounded slices.
    async fn sample_submitted(&self, n: usize) -> Result<Vec<String>, StoreError>;
}
