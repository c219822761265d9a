//! Redis-backed [`JobStore`].
//!
//! Key scheme, with a configurable instance prefix:
//!
//! ```text
//! {prefix}job:{job_id}        job record        (HASH, TTL)
//! {prefix}lock:job:{job_id}   ownership token   (STRING, TTL)
//! {prefix}queue:{name}        hand-off queue    (LIST)
//! {prefix}set:submitted       reconciliation    (SET)
//! ```
//!
//! Queue end selection: `enqueue` is `LPUSH`, `dequeue` is `BRPOP` --
//! opposite ends, so the oldest entry comes out first (strict FIFO).
//! Same-ended push/pop would silently turn this into a LIFO stack; the
//! contract test in `tests/store_contract.rs` pins the order.
//!
//! Atomicity: `create` and `save` run as server-side Lua scripts so the
//! existence check, hash write, and expiry land in one round trip.
//! `release_lock` is the classic compare-and-delete script; a plain
//! read-then-delete would let a worker whose lock TTL expired delete a
//! lock that a different holder has since re-acquired.
//!
//! A blocking pop stalls the one multiplexed connection until it
//! returns, which is fine for the loop-per-process usage here: each
//! worker process either blocks on its queue or talks to the store,
//! never both at once.

use std::collections::HashMap;
use std::time::Duration;

use std::sync::Arc;

use async_trait::async_trait;
use bassline_core::Job;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use crate::codec;
use crate::error::StoreError;
use crate::store::JobStore;

/// `create`: fail if the key exists, otherwise write every field and set
/// the expiry, all server-side. ARGV[1] = ttl seconds, ARGV[2..] =
/// alternating field/value pairs.
const CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV, 2))
redis.call('EXPIRE', KEYS[1], ARGV[1])
return 1
"#;

/// `save`: fail if the key is gone, otherwise overwrite the fields and,
/// when ARGV[1] > 0, refresh the expiry in the same round trip.
const SAVE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV, 2))
if tonumber(ARGV[1]) > 0 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return 1
"#;

/// `release_lock`: delete the lock only while our token still owns it.
const UNLOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of [`JobStore`].
///
/// Holds a cloneable multiplexed connection with an explicit lifecycle:
/// opened (and PINGed) in [`connect`](Self::connect) at process start,
/// dropped when the worker shuts down. No ambient globals. The Lua
/// scripts are [`redis::Script`] handles, so after the first call each
/// invocation is an `EVALSHA` of the cached script rather than a resend
/// of the source (the handle reloads it transparently on NOSCRIPT).
#[derive(Clone)]
pub struct RedisJobStore {
    conn: ConnectionManager,
    prefix: String,
    create_script: Arc<Script>,
    save_script: Arc<Script>,
    unlock_script: Arc<Script>,
}

impl RedisJobStore {
    /// Open a connection to the store and verify it with a PING.
    ///
    /// A failure here is an infrastructure failure; callers at process
    /// startup treat it as fatal.
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        tracing::info!(url = %url, prefix = %key_prefix, "Connected to coordination store");
        Ok(Self {
            conn,
            prefix: key_prefix.to_string(),
            create_script: Arc::new(Script::new(CREATE_SCRIPT)),
            save_script: Arc::new(Script::new(SAVE_SCRIPT)),
            unlock_script: Arc::new(Script::new(UNLOCK_SCRIPT)),
        })
    }

    fn job_key(&self, job_id: &str) -> String {
        format!("{}job:{}", self.prefix, job_id)
    }

    fn lock_key(&self, job_id: &str) -> String {
        format!("{}lock:job:{}", self.prefix, job_id)
    }

    fn queue_key(&self, queue: &str) -> String {
        format!("{}queue:{}", self.prefix, queue)
    }

    fn submitted_key(&self) -> String {
        format!("{}set:submitted", self.prefix)
    }
}

/// EXPIRE with 0 deletes the key, so TTLs are clamped to at least 1s.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Build the script invocation shared by `create` and `save`: the record
/// key, the ttl as ARGV[1], then the encoded field/value pairs.
fn record_write<'a>(
    script: &'a Script,
    key: &str,
    ttl: u64,
    job: &Job,
) -> redis::ScriptInvocation<'a> {
    let mut invocation = script.prepare_invoke();
    invocation.key(key).arg(ttl);
    for (field, value) in codec::encode(job) {
        invocation.arg(field).arg(value);
    }
    invocation
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, job: &Job, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = self.job_key(&job.job_id);
        let created: i64 = record_write(&self.create_script, &key, ttl_secs(ttl), job)
            .invoke_async(&mut conn)
            .await?;
        if created == 0 {
            return Err(StoreError::AlreadyExists {
                job_id: job.job_id.clone(),
            });
        }
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let mut conn = self.conn.clone();
        // HGETALL returns the whole hash in one atomic reply.
        let fields: HashMap<String, String> = conn.hgetall(self.job_key(job_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        codec::decode(&fields).map(Some)
    }

    async fn save(&self, job: &Job, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = self.job_key(&job.job_id);
        let ttl = ttl.map(ttl_secs).unwrap_or(0);
        let saved: i64 = record_write(&self.save_script, &key, ttl, job)
            .invoke_async(&mut conn)
            .await?;
        if saved == 0 {
            return Err(StoreError::NotFound {
                job_id: job.job_id.clone(),
            });
        }
        Ok(())
    }

    async fn delete(&self, job_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(self.job_key(job_id)).await?;
        Ok(())
    }

    async fn touch_ttl(&self, job_id: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: bool = conn
            .expire(self.job_key(job_id), ttl_secs(ttl) as i64)
            .await?;
        Ok(())
    }

    async fn acquire_lock(
        &self,
        job_id: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        // SET NX EX is the whole acquisition; no check-then-set window.
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.lock_key(job_id))
            .arg(token)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn release_lock(&self, job_id: &str, token: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.unlock_script.prepare_invoke();
        invocation.key(self.lock_key(job_id)).arg(token);
        let released: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(released == 1)
    }

    async fn enqueue(&self, queue: &str, job_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(self.queue_key(queue), job_id).await?;
        Ok(())
    }

    async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        // BRPOP timeout 0 would block forever; keep it strictly positive
        // so shutdown latency stays bounded by the caller's timeout.
        let secs = timeout.as_secs_f64().max(0.1);
        let popped: Option<(String, String)> = conn.brpop(self.queue_key(queue), secs).await?;
        Ok(popped.map(|(_list, job_id)| job_id))
    }

    async fn add_submitted(&self, job_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.sadd(self.submitted_key(), job_id).await?;
        Ok(())
    }

    async fn remove_submitted(&self, job_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.srem(self.submitted_key(), job_id).await?;
        Ok(())
    }

    async fn sample_submitted(&self, n: usize) -> Result<Vec<String>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.srandmember_multiple(self.submitted_key(), n).await?;
        Ok(members)
    }
}
