//! In-process [`JobStore`] used by tests and local development.
//!
//! Same contracts as the Redis implementation -- TTL-bound records,
//! token-checked lock release, strict FIFO queues with a blocking pop,
//! random submitted-set sampling -- backed by mutex-guarded maps.
//! Expiry is evaluated lazily on access against [`tokio::time::Instant`],
//! so tests can drive it with a paused clock.
//!
//! Records round-trip through the same [`codec`](crate::codec) as the
//! Redis store, so codec behavior is exercised by every test that
//! touches this type.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bassline_core::Job;
use rand::seq::IteratorRandom;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::codec;
use crate::error::StoreError;
use crate::store::JobStore;

struct StoredRecord {
    fields: HashMap<String, String>,
    expires_at: Instant,
}

struct LockEntry {
    token: String,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, StoredRecord>,
    locks: HashMap<String, LockEntry>,
    queues: HashMap<String, VecDeque<String>>,
    submitted: HashSet<String>,
}

/// Mutex-guarded in-memory store.
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
    /// Wakes consumers blocked in `dequeue` when anything is enqueued.
    enqueued: Notify,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            enqueued: Notify::new(),
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned mutex means a panic mid-update in this process;
        // the maps themselves are always left consistent per operation.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drop the record if its TTL has lapsed, then hand out a live reference.
fn live_record<'a>(
    inner: &'a mut Inner,
    job_id: &str,
    now: Instant,
) -> Option<&'a mut StoredRecord> {
    let expired = match inner.jobs.get(job_id) {
        Some(record) => record.expires_at <= now,
        None => return None,
    };
    if expired {
        inner.jobs.remove(job_id);
        return None;
    }
    inner.jobs.get_mut(job_id)
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        if live_record(&mut inner, &job.job_id, now).is_some() {
            return Err(StoreError::AlreadyExists {
                job_id: job.job_id.clone(),
            });
        }
        inner.jobs.insert(
            job.job_id.clone(),
            StoredRecord {
                fields: codec::encode(job).into_iter().collect(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        match live_record(&mut inner, job_id, now) {
            Some(record) => codec::decode(&record.fields).map(Some),
            None => Ok(None),
        }
    }

    async fn save(&self, job: &Job, ttl: Option<Duration>) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        let Some(record) = live_record(&mut inner, &job.job_id, now) else {
            return Err(StoreError::NotFound {
                job_id: job.job_id.clone(),
            });
        };
        record.fields = codec::encode(job).into_iter().collect();
        if let Some(ttl) = ttl {
            record.expires_at = now + ttl;
        }
        Ok(())
    }

    async fn delete(&self, job_id: &str) -> Result<(), StoreError> {
        self.lock_inner().jobs.remove(job_id);
        Ok(())
    }

    async fn touch_ttl(&self, job_id: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        if let Some(record) = live_record(&mut inner, job_id, now) {
            record.expires_at = now + ttl;
        }
        Ok(())
    }

    async fn acquire_lock(
        &self,
        job_id: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        if let Some(held) = inner.locks.get(job_id) {
            if held.expires_at > now {
                return Ok(false);
            }
        }
        inner.locks.insert(
            job_id.to_string(),
            LockEntry {
                token: token.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release_lock(&self, job_id: &str, token: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        match inner.locks.get(job_id) {
            Some(held) if held.expires_at > now && held.token == token => {
                inner.locks.remove(job_id);
                Ok(true)
            }
            // Wrong token or an expired hold: leave whatever is there.
            _ => Ok(false),
        }
    }

    async fn enqueue(&self, queue: &str, job_id: &str) -> Result<(), StoreError> {
        {
            let mut inner = self.lock_inner();
            inner
                .queues
                .entry(queue.to_string())
                .or_default()
                .push_back(job_id.to_string());
        }
        self.enqueued.notify_waiters();
        Ok(())
    }

    async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking, so a push landing between
            // the check and the wait still wakes us.
            let notified = self.enqueued.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock_inner();
                if let Some(job_id) = inner
                    .queues
                    .get_mut(queue)
                    .and_then(|entries| entries.pop_front())
                {
                    return Ok(Some(job_id));
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn add_submitted(&self, job_id: &str) -> Result<(), StoreError> {
        self.lock_inner().submitted.insert(job_id.to_string());
        Ok(())
    }

    async fn remove_submitted(&self, job_id: &str) -> Result<(), StoreError> {
        self.lock_inner().submitted.remove(job_id);
        Ok(())
    }

    async fn sample_submitted(&self, n: usize) -> Result<Vec<String>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let inner = self.lock_inner();
        let mut rng = rand::rng();
        Ok(inner
            .submitted
            .iter()
            .cloned()
            .choose_multiple(&mut rng, n))
    }
}
