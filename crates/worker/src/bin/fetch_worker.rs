//! Fetch-stage worker process.
//!
//! Environment:
//!
//! | Variable               | Required | Default        |
//! |------------------------|----------|----------------|
//! | `REDIS_URL`            | yes      | --             |
//! | `JOB_KEY_PREFIX`       | no       | `bassline:`    |
//! | `FETCH_QUEUE`          | no       | `fetch`        |
//! | `SUBMIT_QUEUE`         | no       | `submit`       |
//! | `JOB_TTL_SECS`         | no       | `1800`         |
//! | `LOCK_TTL_SECS`        | no       | `600`          |
//! | `DEQUEUE_TIMEOUT_SECS` | no       | `3`            |
//! | `OUTPUT_DIR`           | no       | `./data/input` |
//! | `YTDLP_BIN`            | no       | `yt-dlp`       |
//! | `RUST_LOG`             | no       | see below      |

use std::sync::Arc;

use bassline_ml::YtDlpFetcher;
use bassline_store::RedisJobStore;
use bassline_worker::config::FetchConfig;
use bassline_worker::fetch::FetchWorker;
use bassline_worker::shutdown::Shutdown;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fetch_worker=debug,bassline_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = FetchConfig::from_env()?;
    let store = RedisJobStore::connect(&config.redis_url, &config.key_prefix).await?;

    let ytdlp_bin = std::env::var("YTDLP_BIN").unwrap_or_else(|_| "yt-dlp".to_string());
    let fetcher = YtDlpFetcher::with_binary(&ytdlp_bin);

    let shutdown = Shutdown::new();
    shutdown.install_signals();

    FetchWorker::new(Arc::new(store), Arc::new(fetcher), config, shutdown)
        .run()
        .await;
    Ok(())
}
