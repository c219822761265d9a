//! `bassline-worker` -- the three polling loops that drive jobs through
//! the pipeline.
//!
//! Each loop runs as an independent long-running process (see the
//! binaries under `src/bin/`), and any number of instances of each may
//! run concurrently across machines: all coordination goes through the
//! shared store. Mutation of a job record always happens under that
//! job's lock; the loops skip silently on contention.
//!
//! * [`fetch::FetchWorker`] -- pops the fetch queue, downloads the input
//!   artifact, moves `Queued -> Submitted`.
//! * [`submit::SubmitWorker`] -- pops the submit queue, drives a
//!   synchronous inference call, moves `Submitted -> Done | Failed`.
//! * [`reconcile::ReconcileWorker`] -- periodically samples the
//!   submitted set and closes out jobs the inference service finished
//!   (or lost) without a push notification.

pub mod config;
pub mod fetch;
pub mod intake;
pub mod reconcile;
pub mod shutdown;
pub mod submit;
