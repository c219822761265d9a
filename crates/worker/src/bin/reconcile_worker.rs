//! Reconciliation worker process.
//!
//! Environment:
//!
//! | Variable                       | Required | Default     |
//! |--------------------------------|----------|-------------|
//! | `REDIS_URL`                    | yes      | --          |
//! | `ML_BASE_URL`                  | yes      | --          |
//! | `JOB_KEY_PREFIX`               | no       | `bassline:` |
//! | `SAMPLE_SIZE`                  | no       | `20`        |
//! | `POLL_INTERVAL_SECS`           | no       | `2`         |
//! | `SUBMITTED_TIMEOUT_SECS`       | no       | `1800`      |
//! | `JOB_TTL_SECS`                 | no       | `1800`      |
//! | `LOCK_TTL_SECS`                | no       | `600`       |
//! | `MAX_CONCURRENT_STATUS_CHECKS` | no       | `10`        |
//! | `ML_TIMEOUT_SECS`              | no       | `10`        |
//! | `RUST_LOG`                     | no       | see below   |

use std::sync::Arc;

use bassline_ml::HttpInferenceClient;
use bassline_store::RedisJobStore;
use bassline_worker::config::ReconcileConfig;
use bassline_worker::reconcile::ReconcileWorker;
use bassline_worker::shutdown::Shutdown;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reconcile_worker=debug,bassline_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ReconcileConfig::from_env()?;
    let store = RedisJobStore::connect(&config.redis_url, &config.key_prefix).await?;
    let client = HttpInferenceClient::new(&config.ml_base_url, config.ml_timeout)?;

    let shutdown = Shutdown::new();
    shutdown.install_signals();

    ReconcileWorker::new(Arc::new(store), Arc::new(client), config, shutdown)
        .run()
        .await;
    Ok(())
}
