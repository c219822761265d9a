//! Submit-stage worker process.
//!
//! Environment:
//!
//! | Variable               | Required | Default     |
//! |------------------------|----------|-------------|
//! | `REDIS_URL`            | yes      | --          |
//! | `ML_BASE_URL`          | yes      | --          |
//! | `JOB_KEY_PREFIX`       | no       | `bassline:` |
//! | `SUBMIT_QUEUE`         | no       | `submit`    |
//! | `JOB_TTL_SECS`         | no       | `1800`      |
//! | `LOCK_TTL_SECS`        | no       | `600`       |
//! | `DEQUEUE_TIMEOUT_SECS` | no       | `3`         |
//! | `ML_TIMEOUT_SECS`      | no       | `120`       |
//! | `RUST_LOG`             | no       | see below   |

use std::sync::Arc;

use bassline_ml::HttpInferenceClient;
use bassline_store::RedisJobStore;
use bassline_worker::config::SubmitConfig;
use bassline_worker::shutdown::Shutdown;
use bassline_worker::submit::SubmitWorker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "submit_worker=debug,bassline_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SubmitConfig::from_env()?;
    let store = RedisJobStore::connect(&config.redis_url, &config.key_prefix).await?;
    let client = HttpInferenceClient::new(&config.ml_base_url, config.ml_timeout)?;

    let shutdown = Shutdown::new();
    shutdown.install_signals();

    SubmitWorker::new(Arc::new(store), Arc::new(client), config, shutdown)
        .run()
        .await;
    Ok(())
}
