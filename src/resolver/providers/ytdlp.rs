// Local yt-dlp provider
//
// Fallback when the API cannot help: runs yt-dlp out of process, downloads
// the clip into a fresh temporary directory and hands back the file.
//
// - Every call gets its own directory, removed on any failure
// - The child is killed on deadline or when the call is abandoned
// - A semaphore bounds how many downloads run at once; waiting for a slot
//   counts against the same deadline

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};

use crate::config::YtDlpConfig;
use crate::resolver::errors::ProviderError;
use crate::resolver::models::MediaReference;
use crate::resolver::traits::Provider;
use crate::resolver::utils::{run_blocking, run_output_with_timeout, stderr_tail};

/// Extensions accepted when scanning the download directory
const MEDIA_EXTENSIONS: [&str; 5] = ["mp4", "mkv", "webm", "mov", "m4v"];

const TEMP_PREFIX: &str = "clip_";

/// Provider that downloads media with the yt-dlp command line tool
pub struct YtDlpProvider {
    config: YtDlpConfig,
    permits: Semaphore,
}

impl YtDlpProvider {
    pub fn new(config: YtDlpConfig) -> Self {
        let permits = Semaphore::new(config.max_concurrent.max(1));
        Self { config, permits }
    }

    pub fn config(&self) -> &YtDlpConfig {
        &self.config
    }

    /// Build command arguments
    fn build_args(&self, url: &str, output_template: &str) -> Vec<String> {
        let config = &self.config;
        let mut args = config.leading_args.clone();
        args.extend([
            "-o".to_string(),
            output_template.to_string(),
            "-f".to_string(),
            config.format.clone(),
            "--merge-output-format".to_string(),
            config.merge_output_format.clone(),
            "--user-agent".to_string(),
            config.user_agent.clone(),
            "--referer".to_string(),
            config.referer.clone(),
            "--no-check-certificates".to_string(),
            "--socket-timeout".to_string(),
            config.socket_timeout_secs.to_string(),
            "--retries".to_string(),
            config.retries.to_string(),
            "--fragment-retries".to_string(),
            config.fragment_retries.to_string(),
            "--concurrent-fragments".to_string(),
            config.concurrent_fragments.to_string(),
            "--http-chunk-size".to_string(),
            config.http_chunk_size.clone(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-simulate".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
        ]);

        if let Some(proxy) = &config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args.push(url.to_string());
        args
    }

    /// Run yt-dlp inside `dir` and return the downloaded file
    async fn download_into(
        &self,
        dir: &Path,
        url: &str,
        deadline: Instant,
    ) -> Result<PathBuf, ProviderError> {
        let limit = self.config.timeout();
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ProviderError::Timeout(limit));
        }

        let template = dir.join("%(id)s.%(ext)s");
        let args = self.build_args(url, &template.to_string_lossy());

        tracing::info!(program = %self.config.program, url, ?remaining, "Starting yt-dlp download");
        let output = run_output_with_timeout(&self.config.program, &args, remaining)
            .await
            .map_err(|e| match e {
                ProviderError::Timeout(_) => ProviderError::Timeout(limit),
                other => other,
            })?;

        if !output.status.success() {
            let tail = stderr_tail(&output.stderr, 5);
            let reason = if tail.is_empty() {
                format!("yt-dlp exited with {}", output.status)
            } else {
                tail
            };
            return Err(ProviderError::Extraction(reason));
        }

        let dir = dir.to_path_buf();
        run_blocking(move || locate_output(&dir, &output.stdout)).await
    }
}

#[async_trait]
impl Provider for YtDlpProvider {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve(&self, url: &str) -> Result<MediaReference, ProviderError> {
        let limit = self.config.timeout();
        // Queueing for a slot counts against the deadline
        let deadline = Instant::now() + limit;

        let _permit = match timeout_at(deadline, self.permits.acquire()).await {
            Ok(permit) => permit.map_err(|_| ProviderError::Closed)?,
            Err(_) => {
                tracing::warn!(?limit, "No yt-dlp slot freed up before the deadline");
                return Err(ProviderError::Timeout(limit));
            }
        };

        let parent = self.config.work_dir();
        let workdir = run_blocking(move || {
            std::fs::create_dir_all(&parent)?;
            Ok(tempfile::Builder::new().prefix(TEMP_PREFIX).tempdir_in(&parent)?)
        })
        .await?;

        match self.download_into(workdir.path(), url.trim(), deadline).await {
            Ok(path) => {
                tracing::info!(path = %path.display(), "yt-dlp download finished");
                Ok(MediaReference::LocalFile { path, workdir })
            }
            Err(e) => {
                let dir = workdir.path().to_path_buf();
                if let Err(cleanup) = run_blocking(move || Ok(workdir.close()?)).await {
                    tracing::warn!(dir = %dir.display(), "Failed to remove temp dir: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    async fn close(&self) -> Result<(), ProviderError> {
        if !self.permits.is_closed() {
            self.permits.close();
            tracing::debug!("yt-dlp provider closed");
        }
        Ok(())
    }
}

/// Find the downloaded file: the path yt-dlp printed, else a media file in `dir`
fn locate_output(dir: &Path, stdout: &[u8]) -> Result<PathBuf, ProviderError> {
    let stdout = String::from_utf8_lossy(stdout);
    let reported = stdout
        .lines()
        .map(str::trim)
        .rev()
        .find(|line| !line.is_empty())
        .map(|line| dir.join(line));

    if let Some(path) = reported {
        if path.starts_with(dir) && path.is_file() {
            return Ok(path);
        }
        tracing::debug!(path = %path.display(), "Reported output not usable, scanning directory");
    }

    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_media_file(path))
        .collect();
    found.sort();

    found.into_iter().next().ok_or(ProviderError::NoOutput)
}

fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            MEDIA_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
