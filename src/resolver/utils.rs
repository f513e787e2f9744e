// Helper functions for provider implementations

use std::io::ErrorKind;
use std::process::{Command as StdCommand, Output, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use super::errors::ProviderError;

/// Run a command, collecting its output, with a hard deadline.
///
/// The deadline covers the wait and draining both pipes. The child runs in
/// its own process group; the group is killed when the deadline passes, when
/// the child exits (helpers it left behind would hold the pipes open) and
/// when the returned future is dropped before completion.
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    deadline: Duration,
) -> Result<Output, ProviderError> {
    let mut command = TokioCommand::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|e| match e.kind() {
        ErrorKind::NotFound => ProviderError::ToolNotFound(program.to_string()),
        _ => ProviderError::Extraction(format!("Failed to start {}: {}", program, e)),
    })?;
    let group = ProcessGroup::new(child.id());

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| ProviderError::Extraction(format!("Failed to capture stdout from {}", program)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| ProviderError::Extraction(format!("Failed to capture stderr from {}", program)))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let readers = [stdout_task.abort_handle(), stderr_task.abort_handle()];

    let collect = async {
        let status = child.wait().await?;
        group.kill();
        let stdout = join_pipe(stdout_task.await)?;
        let stderr = join_pipe(stderr_task.await)?;
        Ok::<_, ProviderError>(Output { status, stdout, stderr })
    };
    let outcome = timeout(deadline, collect).await;

    match outcome {
        Ok(output) => output,
        Err(_) => {
            tracing::warn!(program, ?deadline, "Process exceeded deadline, killing");
            group.kill();
            if let Err(e) = child.kill().await {
                tracing::debug!(program, "Failed to kill process: {}", e);
            }
            for reader in readers {
                reader.abort();
            }
            Err(ProviderError::Timeout(deadline))
        }
    }
}

/// Process group led by a spawned child, killed at most once
struct ProcessGroup(AtomicU32);

impl ProcessGroup {
    fn new(leader: Option<u32>) -> Self {
        Self(AtomicU32::new(leader.unwrap_or(0)))
    }

    fn kill(&self) {
        let pgid = self.0.swap(0, Ordering::SeqCst);
        if pgid != 0 {
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    // SAFETY: killpg only sends a signal; ESRCH for an empty group is ignored
    unsafe {
        libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Run blocking filesystem work on the blocking pool
pub async fn run_blocking<T, F>(work: F) -> Result<T, ProviderError>
where
    F: FnOnce() -> Result<T, ProviderError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ProviderError::Io(format!("Blocking task failed: {}", e)))?
}

fn join_pipe(
    joined: Result<std::io::Result<Vec<u8>>, tokio::task::JoinError>,
) -> Result<Vec<u8>, ProviderError> {
    joined
        .map_err(|e| ProviderError::Extraction(format!("Pipe reader failed: {}", e)))?
        .map_err(ProviderError::from)
}

/// Last few lines of a process' stderr, for error messages
pub fn stderr_tail(stderr: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// Find yt-dlp binary
pub fn find_ytdlp() -> String {
    let common_paths = [
        "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
        "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac
        "/usr/bin/yt-dlp",          // System installation
    ];

    for path in common_paths {
        if std::path::Path::new(path).exists() {
            return path.to_string();
        }
    }

    if let Ok(output) = StdCommand::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            if let Ok(path) = String::from_utf8(output.stdout) {
                let trimmed = path.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
    }

    "yt-dlp".to_string()
}

/// Find the first supported short-video link in free text.
///
/// Surrounding brackets, quotes and trailing punctuation are stripped and
/// `https://` is added when the scheme is missing.
pub fn extract_link(text: &str) -> Option<String> {
    lazy_static::lazy_static! {
        static ref LINK_RE: Regex = Regex::new(
            r"(?i)(?:https?://)?(?:(?:www\.|m\.)?tiktok\.com/\S+|v[tm]\.tiktok\.com/\S+|(?:www\.)?tiktokv\.com/\S+)"
        ).unwrap();
    }

    let found = LINK_RE.find(text)?.as_str();
    let url = found
        .trim_start_matches(['<', '[', '(', '"'])
        .trim_end_matches(['.', ',', '!', '?', ')', '"', ']', '>']);
    if url.is_empty() {
        return None;
    }

    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Some(url.to_string())
    } else {
        Some(format!("https://{}", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_link_plain() {
        assert_eq!(
            extract_link("look https://vm.tiktok.com/ZMabc123/ lol").as_deref(),
            Some("https://vm.tiktok.com/ZMabc123/")
        );
    }

    #[test]
    fn test_extract_link_adds_scheme_and_strips_punctuation() {
        assert_eq!(
            extract_link("watch this: www.tiktok.com/@user/video/123!").as_deref(),
            Some("https://www.tiktok.com/@user/video/123")
        );
        assert_eq!(
            extract_link("(vt.tiktok.com/ZSxyz).").as_deref(),
            Some("https://vt.tiktok.com/ZSxyz")
        );
    }

    #[test]
    fn test_extract_link_case_insensitive() {
        assert_eq!(
            extract_link("HTTPS://M.TikTok.com/v/42.html").as_deref(),
            Some("HTTPS://M.TikTok.com/v/42.html")
        );
    }

    #[test]
    fn test_extract_link_none() {
        assert_eq!(extract_link(""), None);
        assert_eq!(extract_link("https://youtube.com/watch?v=1"), None);
        assert_eq!(extract_link("just text"), None);
    }

    #[test]
    fn test_stderr_tail() {
        let stderr = b"line1\n\nline2\nERROR: boom\n";
        assert_eq!(stderr_tail(stderr, 2), "line2\nERROR: boom");
        assert_eq!(stderr_tail(b"", 3), "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_output_collects_streams() {
        let args = vec!["-c".to_string(), "echo out; echo err >&2".to_string()];
        let output = run_output_with_timeout("sh", &args, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "out");
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_output_times_out() {
        let args = vec!["-c".to_string(), "sleep 5".to_string()];
        let started = std::time::Instant::now();
        let err = run_output_with_timeout("sh", &args, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_output_not_held_by_background_helper() {
        let args = vec!["-c".to_string(), "sleep 4 & echo done".to_string()];
        let started = std::time::Instant::now();
        let output = run_output_with_timeout("sh", &args, Duration::from_secs(3))
            .await
            .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "done");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_output_deadline_covers_helpers() {
        let args = vec!["-c".to_string(), "sleep 5 & sleep 5".to_string()];
        let started = std::time::Instant::now();
        let err = run_output_with_timeout("sh", &args, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_run_blocking_passes_result_through() {
        assert_eq!(run_blocking(|| Ok(7)).await.unwrap(), 7);
        let err = run_blocking::<(), _>(|| Err(ProviderError::NoOutput)).await.unwrap_err();
        assert!(matches!(err, ProviderError::NoOutput));
    }

    #[tokio::test]
    async fn test_run_output_missing_program() {
        let err = run_output_with_timeout("definitely-not-a-real-tool-xyz", &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ToolNotFound(_)));
    }
}
