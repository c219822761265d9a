//! `bassline-store` -- the shared coordination layer over the key-value
//! store.
//!
//! Everything the workers share goes through the [`JobStore`] trait: job
//! record persistence with TTL, the per-job distributed lock, the FIFO
//! hand-off queues, and the submitted set polled by reconciliation. Two
//! implementations exist: [`RedisJobStore`] for production and
//! [`MemoryJobStore`] as an in-process stand-in for tests.
//!
//! The store does not know about worker loops or collaborators; it only
//! enforces the storage-level contracts (atomicity, TTL, token-checked
//! lock release, FIFO queue order).

pub mod codec;
pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryJobStore;
pub use redis_store::RedisJobStore;
pub use store::JobStore;
