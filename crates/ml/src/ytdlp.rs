//! [`AudioFetcher`] implementation backed by the `yt-dlp` binary.
//!
//! Downloads the best available audio for a source URL and has ffmpeg
//! (via yt-dlp's extract-audio postprocessor) convert it to WAV at the
//! requested output path. Each invocation is an independent subprocess,
//! so concurrent fetches from many workers need no coordination.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::contract::AudioFetcher;
use crate::error::MlError;

/// Shell-out fetcher. `binary` is the yt-dlp executable to invoke,
/// `yt-dlp` from `PATH` by default.
pub struct YtDlpFetcher {
    binary: String,
}

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self::with_binary("yt-dlp")
    }

    pub fn with_binary(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioFetcher for YtDlpFetcher {
    async fn fetch(
        &self,
        source_reference: &str,
        output_path: &Path,
    ) -> Result<PathBuf, MlError> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MlError::Transport(format!("cannot create output dir: {e}")))?;
        }

        // yt-dlp wants the output template without an extension; the
        // extract-audio postprocessor appends `.wav` itself.
        let template = output_path.with_extension("");
        let produced = template.with_extension("wav");

        tracing::info!(
            source = %source_reference,
            output = %produced.display(),
            "Starting yt-dlp download",
        );

        let output = Command::new(&self.binary)
            .arg("--format")
            .arg("bestaudio/best")
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg("wav")
            .arg("--audio-quality")
            .arg("0")
            .arg("--retries")
            .arg("3")
            .arg("--socket-timeout")
            .arg("30")
            .arg("--no-warnings")
            .arg("--quiet")
            .arg("--output")
            .arg(&template)
            .arg("--")
            .arg(source_reference)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| MlError::Transport(format!("failed to spawn {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MlError::Transport(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim(),
            )));
        }

        // The postprocessor decides the final name; verify it landed.
        tokio::fs::metadata(&produced)
            .await
            .map_err(|e| MlError::Protocol(format!(
                "download finished but {} is missing: {e}",
                produced.display(),
            )))?;

        Ok(produced)
    }
}
