//! End-to-end worker-loop behavior against the in-memory store with
//! scripted collaborators.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bassline_core::{Job, JobStatus, ResultMode, SourceMode};
use bassline_ml::{
    AudioFetcher, InferenceClient, MlError, ProcessRequest, ProcessResponse, ProcessResult,
    RemoteStatus, StatusResponse,
};
use bassline_store::{JobStore, MemoryJobStore, StoreError};
use bassline_worker::config::{FetchConfig, ReconcileConfig, SubmitConfig};
use bassline_worker::fetch::FetchWorker;
use bassline_worker::intake::{self, NewJob};
use bassline_worker::reconcile::ReconcileWorker;
use bassline_worker::shutdown::Shutdown;
use bassline_worker::submit::SubmitWorker;

const TTL: Duration = Duration::from_secs(1800);

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

struct ScriptedFetcher {
    /// `Some(reason)` makes every fetch fail with a transport error.
    fail_with: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn succeeding() -> Self {
        Self {
            fail_with: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AudioFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        _source_reference: &str,
        output_path: &Path,
    ) -> Result<PathBuf, MlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(reason) => Err(MlError::Transport(reason.clone())),
            None => Ok(output_path.to_path_buf()),
        }
    }
}

struct ScriptedClient {
    /// `Err(msg)` is surfaced as a transport error.
    process_reply: Result<ProcessResponse, String>,
    status_reply: Result<StatusResponse, String>,
    process_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl ScriptedClient {
    fn with_process(reply: Result<ProcessResponse, String>) -> Self {
        Self {
            process_reply: reply,
            status_reply: Err("status not scripted".into()),
            process_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    fn with_status(reply: Result<StatusResponse, String>) -> Self {
        Self {
            process_reply: Err("process not scripted".into()),
            status_reply: reply,
            process_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl InferenceClient for ScriptedClient {
    async fn process(&self, _request: &ProcessRequest) -> Result<ProcessResponse, MlError> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        self.process_reply
            .clone()
            .map_err(MlError::Transport)
    }

    async fn status(&self, _job_id: &str) -> Result<StatusResponse, MlError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status_reply.clone().map_err(MlError::Transport)
    }
}

/// Delegating store that, on `acquire_lock`, first moves the still-Queued
/// job to `Submitted` -- a concurrent worker winning the window between a
/// caller's snapshot read and its lock grant (duplicate queue entries make
/// that window real).
struct RaceToSubmitStore {
    inner: Arc<MemoryJobStore>,
}

#[async_trait]
impl JobStore for RaceToSubmitStore {
    async fn create(&self, job: &Job, ttl: Duration) -> Result<(), StoreError> {
        self.inner.create(job, ttl).await
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        self.inner.get(job_id).await
    }

    async fn save(&self, job: &Job, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.inner.save(job, ttl).await
    }

    async fn delete(&self, job_id: &str) -> Result<(), StoreError> {
        self.inner.delete(job_id).await
    }

    async fn touch_ttl(&self, job_id: &str, ttl: Duration) -> Result<(), StoreError> {
        self.inner.touch_ttl(job_id, ttl).await
    }

    async fn acquire_lock(
        &self,
        job_id: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        if let Some(mut job) = self.inner.get(job_id).await? {
            if job.status == JobStatus::Queued {
                job.mark_submitted(format!("/tmp/bassline-test/{job_id}-raced.wav"))
                    .expect("queued job accepts submission");
                self.inner.save(&job, None).await?;
                self.inner.add_submitted(job_id).await?;
            }
        }
        self.inner.acquire_lock(job_id, token, ttl).await
    }

    async fn release_lock(&self, job_id: &str, token: &str) -> Result<bool, StoreError> {
        self.inner.release_lock(job_id, token).await
    }

    async fn enqueue(&self, queue: &str, job_id: &str) -> Result<(), StoreError> {
        self.inner.enqueue(queue, job_id).await
    }

    async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        self.inner.dequeue(queue, timeout).await
    }

    async fn add_submitted(&self, job_id: &str) -> Result<(), StoreError> {
        self.inner.add_submitted(job_id).await
    }

    async fn remove_submitted(&self, job_id: &str) -> Result<(), StoreError> {
        self.inner.remove_submitted(job_id).await
    }

    async fn sample_submitted(&self, n: usize) -> Result<Vec<String>, StoreError> {
        self.inner.sample_submitted(n).await
    }
}

fn done_response(result_path: &str) -> ProcessResponse {
    ProcessResponse {
        ok: true,
        result: Some(ProcessResult {
            result_path: Some(result_path.to_string()),
            tempo_bpm: Some(120.0),
            notes: None,
            tabs: None,
        }),
        error: None,
    }
}

// ---------------------------------------------------------------------------
// Config and seeding helpers
// ---------------------------------------------------------------------------

fn fetch_config() -> FetchConfig {
    FetchConfig {
        redis_url: "unused".into(),
        key_prefix: "test:".into(),
        fetch_queue: "fetch".into(),
        submit_queue: "submit".into(),
        job_ttl: TTL,
        lock_ttl: Duration::from_secs(60),
        dequeue_timeout: Duration::from_millis(50),
        output_dir: PathBuf::from("/tmp/bassline-test"),
    }
}

fn submit_config() -> SubmitConfig {
    SubmitConfig {
        redis_url: "unused".into(),
        key_prefix: "test:".into(),
        submit_queue: "submit".into(),
        job_ttl: TTL,
        lock_ttl: Duration::from_secs(60),
        dequeue_timeout: Duration::from_millis(50),
        ml_base_url: "http://unused".into(),
        ml_timeout: Duration::from_secs(1),
    }
}

fn reconcile_config() -> ReconcileConfig {
    ReconcileConfig {
        redis_url: "unused".into(),
        key_prefix: "test:".into(),
        sample_size: 20,
        poll_interval: Duration::from_millis(50),
        submitted_timeout: TTL,
        job_ttl: TTL,
        lock_ttl: Duration::from_secs(60),
        max_concurrent_checks: 4,
        ml_base_url: "http://unused".into(),
        ml_timeout: Duration::from_secs(1),
    }
}

/// Create a `Queued` job through the intake flow.
async fn seed_queued(store: &MemoryJobStore, source: Option<&str>) -> Job {
    intake::create_job(
        store,
        NewJob {
            source_reference: source.map(str::to_string),
            source_mode: SourceMode::Original,
            result_mode: ResultMode::Full,
        },
        "fetch",
        TTL,
    )
    .await
    .expect("create_job should succeed")
}

/// Persist a `Submitted` job and track it in the submitted set.
async fn seed_submitted(store: &MemoryJobStore, job_id: &str) -> Job {
    let mut job = Job::new(
        Some("https://example.com/v/1".into()),
        SourceMode::Original,
        ResultMode::Full,
    );
    job.job_id = job_id.to_string();
    job.mark_submitted(format!("/tmp/bassline-test/{job_id}.wav"))
        .expect("queued job accepts submission");
    store.create(&job, TTL).await.expect("create should succeed");
    store
        .add_submitted(job_id)
        .await
        .expect("tracking should succeed");
    job
}

async fn status_of(store: &MemoryJobStore, job_id: &str) -> Job {
    store
        .get(job_id)
        .await
        .expect("get should succeed")
        .expect("record should be live")
}

async fn is_tracked(store: &MemoryJobStore, job_id: &str) -> bool {
    store
        .sample_submitted(64)
        .await
        .expect("sampling should succeed")
        .iter()
        .any(|id| id == job_id)
}

// ---------------------------------------------------------------------------
// Fetch stage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_success_hands_job_to_submit_stage() {
    let store = Arc::new(MemoryJobStore::new());
    let fetcher = Arc::new(ScriptedFetcher::succeeding());
    let worker = FetchWorker::new(
        store.clone(),
        fetcher.clone(),
        fetch_config(),
        Shutdown::new(),
    );

    let job = seed_queued(&store, Some("https://example.com/v/1")).await;
    worker
        .process_one(&job.job_id)
        .await
        .expect("processing should succeed");

    let job = status_of(&store, &job.job_id).await;
    assert_eq!(job.status, JobStatus::Submitted);
    assert_eq!(
        job.input_artifact_path.as_deref(),
        Some(format!("/tmp/bassline-test/{}.wav", job.job_id).as_str()),
    );
    assert!(is_tracked(&store, &job.job_id).await);
    assert_eq!(
        store
            .dequeue("submit", Duration::from_millis(10))
            .await
            .expect("dequeue should succeed"),
        Some(job.job_id.clone()),
    );
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fetch_failure_fails_job_without_tracking_it() {
    let store = Arc::new(MemoryJobStore::new());
    let worker = FetchWorker::new(
        store.clone(),
        Arc::new(ScriptedFetcher::failing("network down")),
        fetch_config(),
        Shutdown::new(),
    );

    let job = seed_queued(&store, Some("https://example.com/v/1")).await;
    worker
        .process_one(&job.job_id)
        .await
        .expect("processing should succeed");

    let job = status_of(&store, &job.job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.expect("failure reason should be recorded");
    assert!(error.contains("network down"), "got: {error}");
    assert!(!is_tracked(&store, &job.job_id).await);
    assert_eq!(
        store
            .dequeue("submit", Duration::from_millis(10))
            .await
            .expect("dequeue should succeed"),
        None,
    );
}

#[tokio::test]
async fn fetch_fails_job_missing_source_reference_without_fetching() {
    let store = Arc::new(MemoryJobStore::new());
    let fetcher = Arc::new(ScriptedFetcher::succeeding());
    let worker = FetchWorker::new(
        store.clone(),
        fetcher.clone(),
        fetch_config(),
        Shutdown::new(),
    );

    let job = seed_queued(&store, None).await;
    worker
        .process_one(&job.job_id)
        .await
        .expect("processing should succeed");

    let job = status_of(&store, &job.job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("missing source reference"));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fetch_skips_entries_whose_record_moved_on() {
    let store = Arc::new(MemoryJobStore::new());
    let fetcher = Arc::new(ScriptedFetcher::succeeding());
    let worker = FetchWorker::new(
        store.clone(),
        fetcher.clone(),
        fetch_config(),
        Shutdown::new(),
    );

    // Already past the fetch stage; the stale queue entry must be a no-op.
    let job = seed_submitted(&store, "already-moved").await;
    worker
        .process_one(&job.job_id)
        .await
        .expect("processing should succeed");

    assert_eq!(
        status_of(&store, &job.job_id).await.status,
        JobStatus::Submitted
    );
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fetch_skips_locked_jobs_untouched() {
    let store = Arc::new(MemoryJobStore::new());
    let fetcher = Arc::new(ScriptedFetcher::succeeding());
    let worker = FetchWorker::new(
        store.clone(),
        fetcher.clone(),
        fetch_config(),
        Shutdown::new(),
    );

    let job = seed_queued(&store, Some("https://example.com/v/1")).await;
    assert!(store
        .acquire_lock(&job.job_id, "other-holder", Duration::from_secs(60))
        .await
        .expect("lock should succeed"));

    worker
        .process_one(&job.job_id)
        .await
        .expect("processing should succeed");

    assert_eq!(
        status_of(&store, &job.job_id).await.status,
        JobStatus::Queued
    );
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    // The foreign lock survives the skip.
    assert!(store
        .release_lock(&job.job_id, "other-holder")
        .await
        .expect("release should succeed"));
}

#[tokio::test]
async fn fetch_revalidates_under_lock_and_never_clobbers_a_racing_completion() {
    let inner = Arc::new(MemoryJobStore::new());
    let fetcher = Arc::new(ScriptedFetcher::failing("network down"));
    let worker = FetchWorker::new(
        Arc::new(RaceToSubmitStore {
            inner: inner.clone(),
        }),
        fetcher.clone(),
        fetch_config(),
        Shutdown::new(),
    );

    let job = seed_queued(&inner, Some("https://example.com/v/1")).await;
    worker
        .process_one(&job.job_id)
        .await
        .expect("processing should succeed");

    // The concurrent completion wins: this worker must not re-fetch,
    // must not fail the job, and must not erase the recorded artifact
    // or drop the id from reconciliation.
    let job = status_of(&inner, &job.job_id).await;
    assert_eq!(job.status, JobStatus::Submitted);
    assert_eq!(
        job.input_artifact_path.as_deref(),
        Some(format!("/tmp/bassline-test/{}-raced.wav", job.job_id).as_str()),
    );
    assert!(job.error.is_none());
    assert!(is_tracked(&inner, &job.job_id).await);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fetch_run_loop_stops_on_shutdown() {
    let store = Arc::new(MemoryJobStore::new());
    let shutdown = Shutdown::new();
    let worker = FetchWorker::new(
        store.clone(),
        Arc::new(ScriptedFetcher::succeeding()),
        fetch_config(),
        shutdown.clone(),
    );

    let handle = tokio::spawn(worker.run());
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("loop should stop within the dequeue timeout")
        .expect("loop task should not panic");
}

// ---------------------------------------------------------------------------
// Submit stage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_success_completes_job_and_untracks_it() {
    let store = Arc::new(MemoryJobStore::new());
    let client = Arc::new(ScriptedClient::with_process(Ok(done_response(
        "/tmp/out/j1.wav",
    ))));
    let worker = SubmitWorker::new(
        store.clone(),
        client.clone(),
        submit_config(),
        Shutdown::new(),
    );

    let job = seed_submitted(&store, "j1").await;
    worker
        .process_one(&job.job_id)
        .await
        .expect("processing should succeed");

    let job = status_of(&store, "j1").await;
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.result_artifact_path.as_deref(), Some("/tmp/out/j1.wav"));
    assert!(job.error.is_none());
    assert!(!is_tracked(&store, "j1").await);
    assert_eq!(client.process_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn submit_rejection_fails_job_with_reported_reason() {
    let store = Arc::new(MemoryJobStore::new());
    let client = Arc::new(ScriptedClient::with_process(Ok(ProcessResponse {
        ok: false,
        result: None,
        error: Some("unsupported sample rate".into()),
    })));
    let worker = SubmitWorker::new(store.clone(), client, submit_config(), Shutdown::new());

    seed_submitted(&store, "j1").await;
    worker
        .process_one("j1")
        .await
        .expect("processing should succeed");

    let job = status_of(&store, "j1").await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("unsupported sample rate"));
    assert!(!is_tracked(&store, "j1").await);
}

#[tokio::test]
async fn submit_ok_without_result_path_is_a_failure() {
    let store = Arc::new(MemoryJobStore::new());
    let client = Arc::new(ScriptedClient::with_process(Ok(ProcessResponse {
        ok: true,
        result: None,
        error: None,
    })));
    let worker = SubmitWorker::new(store.clone(), client, submit_config(), Shutdown::new());

    seed_submitted(&store, "j1").await;
    worker
        .process_one("j1")
        .await
        .expect("processing should succeed");

    let job = status_of(&store, "j1").await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.error.as_deref(),
        Some("inference succeeded without a result path"),
    );
    assert!(!is_tracked(&store, "j1").await);
}

#[tokio::test]
async fn submit_transport_failure_is_terminal() {
    let store = Arc::new(MemoryJobStore::new());
    let client = Arc::new(ScriptedClient::with_process(Err(
        "connection refused".into()
    )));
    let worker = SubmitWorker::new(store.clone(), client, submit_config(), Shutdown::new());

    seed_submitted(&store, "j1").await;
    worker
        .process_one("j1")
        .await
        .expect("processing should succeed");

    let job = status_of(&store, "j1").await;
    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.expect("failure reason should be recorded");
    assert!(error.contains("connection refused"), "got: {error}");
    assert!(!is_tracked(&store, "j1").await);
}

#[tokio::test]
async fn submit_skips_terminal_jobs_without_calling_inference() {
    let store = Arc::new(MemoryJobStore::new());
    let client = Arc::new(ScriptedClient::with_process(Ok(done_response(
        "/tmp/out/j1.wav",
    ))));
    let worker = SubmitWorker::new(
        store.clone(),
        client.clone(),
        submit_config(),
        Shutdown::new(),
    );

    let mut job = seed_submitted(&store, "j1").await;
    job.mark_done("/tmp/out/earlier.wav".into())
        .expect("submitted job accepts completion");
    store
        .save(&job, None)
        .await
        .expect("save should succeed");

    worker
        .process_one("j1")
        .await
        .expect("processing should succeed");

    let job = status_of(&store, "j1").await;
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(
        job.result_artifact_path.as_deref(),
        Some("/tmp/out/earlier.wav"),
    );
    assert_eq!(client.process_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn submit_skips_locked_jobs_untouched() {
    let store = Arc::new(MemoryJobStore::new());
    let client = Arc::new(ScriptedClient::with_process(Ok(done_response(
        "/tmp/out/j1.wav",
    ))));
    let worker = SubmitWorker::new(
        store.clone(),
        client.clone(),
        submit_config(),
        Shutdown::new(),
    );

    seed_submitted(&store, "j1").await;
    assert!(store
        .acquire_lock("j1", "other-holder", Duration::from_secs(60))
        .await
        .expect("lock should succeed"));

    worker
        .process_one("j1")
        .await
        .expect("processing should succeed");

    assert_eq!(status_of(&store, "j1").await.status, JobStatus::Submitted);
    assert!(is_tracked(&store, "j1").await);
    assert_eq!(client.process_calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconcile_closes_out_remotely_done_jobs() {
    let store = Arc::new(MemoryJobStore::new());
    let client = Arc::new(ScriptedClient::with_status(Ok(StatusResponse {
        status: RemoteStatus::Done,
        result: Some(ProcessResult {
            result_path: Some("/tmp/out/j1.wav".into()),
            ..ProcessResult::default()
        }),
        error: None,
    })));
    let worker = ReconcileWorker::new(
        store.clone(),
        client,
        reconcile_config(),
        Shutdown::new(),
    );

    seed_submitted(&store, "j1").await;
    worker.run_cycle().await;

    let job = status_of(&store, "j1").await;
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.result_artifact_path.as_deref(), Some("/tmp/out/j1.wav"));
    assert!(!is_tracked(&store, "j1").await);
}

#[tokio::test]
async fn reconcile_closes_out_remotely_failed_jobs() {
    let store = Arc::new(MemoryJobStore::new());
    let client = Arc::new(ScriptedClient::with_status(Ok(StatusResponse {
        status: RemoteStatus::Failed,
        result: None,
        error: Some("model crashed".into()),
    })));
    let worker = ReconcileWorker::new(
        store.clone(),
        client,
        reconcile_config(),
        Shutdown::new(),
    );

    seed_submitted(&store, "j1").await;
    worker.run_cycle().await;

    let job = status_of(&store, "j1").await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("model crashed"));
    assert!(!is_tracked(&store, "j1").await);
}

#[tokio::test]
async fn reconcile_remote_done_without_result_path_is_a_failure() {
    let store = Arc::new(MemoryJobStore::new());
    let client = Arc::new(ScriptedClient::with_status(Ok(StatusResponse {
        status: RemoteStatus::Done,
        result: None,
        error: None,
    })));
    let worker = ReconcileWorker::new(
        store.clone(),
        client,
        reconcile_config(),
        Shutdown::new(),
    );

    seed_submitted(&store, "j1").await;
    worker.run_cycle().await;

    let job = status_of(&store, "j1").await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.error.as_deref(),
        Some("remote reported done without a result path"),
    );
    assert!(!is_tracked(&store, "j1").await);
}

#[tokio::test]
async fn reconcile_leaves_in_flight_jobs_alone() {
    let store = Arc::new(MemoryJobStore::new());
    let client = Arc::new(ScriptedClient::with_status(Ok(StatusResponse {
        status: RemoteStatus::Running,
        result: None,
        error: None,
    })));
    let worker = ReconcileWorker::new(
        store.clone(),
        client.clone(),
        reconcile_config(),
        Shutdown::new(),
    );

    seed_submitted(&store, "j1").await;
    worker.run_cycle().await;

    assert_eq!(status_of(&store, "j1").await.status, JobStatus::Submitted);
    assert!(is_tracked(&store, "j1").await);
    assert_eq!(client.status_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reconcile_status_transport_failure_leaves_job_tracked() {
    let store = Arc::new(MemoryJobStore::new());
    let client = Arc::new(ScriptedClient::with_status(Err("timeout".into())));
    let worker = ReconcileWorker::new(
        store.clone(),
        client,
        reconcile_config(),
        Shutdown::new(),
    );

    seed_submitted(&store, "j1").await;
    worker.run_cycle().await;

    assert_eq!(status_of(&store, "j1").await.status, JobStatus::Submitted);
    assert!(is_tracked(&store, "j1").await);
}

#[tokio::test]
async fn reconcile_times_out_stale_submitted_jobs_without_querying() {
    let store = Arc::new(MemoryJobStore::new());
    let client = Arc::new(ScriptedClient::with_status(Ok(StatusResponse {
        status: RemoteStatus::Running,
        result: None,
        error: None,
    })));
    let mut config = reconcile_config();
    config.submitted_timeout = Duration::from_secs(60);
    let worker = ReconcileWorker::new(store.clone(), client.clone(), config, Shutdown::new());

    let mut job = seed_submitted(&store, "j1").await;
    job.updated_at = chrono::Utc::now() - chrono::Duration::seconds(3600);
    store
        .save(&job, None)
        .await
        .expect("save should succeed");

    worker.run_cycle().await;

    let job = status_of(&store, "j1").await;
    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.expect("failure reason should be recorded");
    assert!(error.contains("timed out"), "got: {error}");
    assert!(!is_tracked(&store, "j1").await);
    assert_eq!(client.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn reconcile_untracks_orphaned_set_members() {
    let store = Arc::new(MemoryJobStore::new());
    let client = Arc::new(ScriptedClient::with_status(Err("unreachable".into())));
    let worker = ReconcileWorker::new(
        store.clone(),
        client.clone(),
        reconcile_config(),
        Shutdown::new(),
    );

    // Tracked id with no record behind it (expired or deleted).
    store
        .add_submitted("ghost")
        .await
        .expect("tracking should succeed");
    worker.run_cycle().await;

    assert!(!is_tracked(&store, "ghost").await);
    assert_eq!(client.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn reconcile_untracks_jobs_already_terminal() {
    let store = Arc::new(MemoryJobStore::new());
    let client = Arc::new(ScriptedClient::with_status(Err("unreachable".into())));
    let worker = ReconcileWorker::new(
        store.clone(),
        client.clone(),
        reconcile_config(),
        Shutdown::new(),
    );

    let mut job = seed_submitted(&store, "j1").await;
    job.mark_done("/tmp/out/j1.wav".into())
        .expect("submitted job accepts completion");
    store
        .save(&job, None)
        .await
        .expect("save should succeed");

    worker.run_cycle().await;

    assert!(!is_tracked(&store, "j1").await);
    assert_eq!(status_of(&store, "j1").await.status, JobStatus::Done);
    assert_eq!(client.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn reconcile_defers_close_out_on_lock_contention() {
    let store = Arc::new(MemoryJobStore::new());
    let client = Arc::new(ScriptedClient::with_status(Ok(StatusResponse {
        status: RemoteStatus::Done,
        result: Some(ProcessResult {
            result_path: Some("/tmp/out/j1.wav".into()),
            ..ProcessResult::default()
        }),
        error: None,
    })));
    let worker = ReconcileWorker::new(
        store.clone(),
        client,
        reconcile_config(),
        Shutdown::new(),
    );

    seed_submitted(&store, "j1").await;
    assert!(store
        .acquire_lock("j1", "other-holder", Duration::from_secs(60))
        .await
        .expect("lock should succeed"));

    worker.run_cycle().await;

    // Whoever holds the lock decides; this cycle changes nothing.
    assert_eq!(status_of(&store, "j1").await.status, JobStatus::Submitted);
    assert!(is_tracked(&store, "j1").await);
}

#[tokio::test]
async fn reconcile_run_loop_stops_on_shutdown() {
    let store = Arc::new(MemoryJobStore::new());
    let shutdown = Shutdown::new();
    let worker = ReconcileWorker::new(
        store.clone(),
        Arc::new(ScriptedClient::with_status(Err("unreachable".into()))),
        reconcile_config(),
        shutdown.clone(),
    );

    let handle = tokio::spawn(worker.run());
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("loop should stop within the poll interval")
        .expect("loop task should not panic");
}
