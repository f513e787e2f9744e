// Common data models for the resolver

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;

use super::errors::ProviderError;

/// Result of a successful resolution
///
/// A `LocalFile` owns the temporary directory it was downloaded into.
/// Dropping the reference removes the directory, so callers keep it alive
/// until the bytes have been consumed (e.g. uploaded).
#[derive(Debug)]
pub enum MediaReference {
    /// Remote playable URL (always `http://` or `https://`)
    Remote { url: String },
    /// Downloaded file inside its own temporary directory
    LocalFile { path: PathBuf, workdir: TempDir },
}

impl MediaReference {
    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote { url: url.into() }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::LocalFile { .. })
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Remote { url } => Some(url),
            Self::LocalFile { .. } => None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Remote { .. } => None,
            Self::LocalFile { path, .. } => Some(path),
        }
    }

    /// Remove the downloaded file and its directory now, reporting errors.
    /// No-op for remote references.
    pub fn cleanup(self) -> io::Result<()> {
        match self {
            Self::Remote { .. } => Ok(()),
            Self::LocalFile { workdir, .. } => workdir.close(),
        }
    }

    /// Detach the temporary directory so it outlives this value.
    /// Returns the file path; the caller is now responsible for deleting it.
    pub fn keep(self) -> Option<PathBuf> {
        match self {
            Self::Remote { .. } => None,
            Self::LocalFile { path, workdir } => {
                let _ = workdir.keep();
                Some(path)
            }
        }
    }

    /// Serializable view for printing
    pub fn summary(&self) -> MediaSummary {
        match self {
            Self::Remote { url } => MediaSummary {
                kind: "url",
                location: url.clone(),
            },
            Self::LocalFile { path, .. } => MediaSummary {
                kind: "file",
                location: path.display().to_string(),
            },
        }
    }
}

impl fmt::Display for MediaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote { url } => write!(f, "{}", url),
            Self::LocalFile { path, .. } => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaSummary {
    pub kind: &'static str,
    pub location: String,
}

/// Failure of one provider inside the chain
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    /// Zero-based position in the chain
    pub index: usize,
    pub provider: &'static str,
    pub error: ProviderError,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider {} ({}): {}", self.index + 1, self.provider, self.error)
    }
}

/// Whether a string is an absolute http(s) URL
pub fn is_http_url(candidate: &str) -> bool {
    let lower = candidate.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_accessors() {
        let media = MediaReference::remote("https://cdn.example.com/v.mp4");
        assert!(!media.is_local());
        assert_eq!(media.url(), Some("https://cdn.example.com/v.mp4"));
        assert!(media.path().is_none());
        assert_eq!(
            media.summary(),
            MediaSummary {
                kind: "url",
                location: "https://cdn.example.com/v.mp4".to_string()
            }
        );
        assert!(media.cleanup().is_ok());
    }

    #[test]
    fn test_local_cleanup_removes_directory() {
        let workdir = tempfile::tempdir().unwrap();
        let dir = workdir.path().to_path_buf();
        let path = dir.join("clip.mp4");
        std::fs::write(&path, b"data").unwrap();

        let media = MediaReference::LocalFile { path: path.clone(), workdir };
        assert!(media.is_local());
        assert_eq!(media.path(), Some(path.as_path()));

        media.cleanup().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_local_drop_removes_directory() {
        let workdir = tempfile::tempdir().unwrap();
        let dir = workdir.path().to_path_buf();
        let path = dir.join("clip.mp4");
        std::fs::write(&path, b"data").unwrap();

        drop(MediaReference::LocalFile { path, workdir });
        assert!(!dir.exists());
    }

    #[test]
    fn test_keep_detaches_directory() {
        let workdir = tempfile::tempdir().unwrap();
        let dir = workdir.path().to_path_buf();
        let path = dir.join("clip.mp4");
        std::fs::write(&path, b"data").unwrap();

        let kept = MediaReference::LocalFile { path: path.clone(), workdir }.keep();
        assert_eq!(kept.as_deref(), Some(path.as_path()));
        assert!(path.exists());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("https://v16.tiktokcdn.com/a.mp4"));
        assert!(is_http_url("HTTP://example.com"));
        assert!(!is_http_url("ftp://example.com"));
        assert!(!is_http_url("/tmp/clip.mp4"));
        assert!(!is_http_url(""));
    }
}
