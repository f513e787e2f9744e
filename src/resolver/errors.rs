// Error types for providers and the resolver chain

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use super::models::ProviderFailure;

/// Message shown when the backends are overloaded or down.
pub const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "Service is temporarily unavailable. Please try again later.";

/// Message shown for every other resolution failure.
pub const DOWNLOAD_FAILED_MESSAGE: &str =
    "Could not retrieve the video. Check the link and try again.";

/// Failure of a single provider
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Connection, DNS or transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Deadline exceeded (request, process or chain attempt)
    #[error("Timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    /// Upstream answered with a non-success status
    #[error("HTTP error {status} for {url}")]
    Http { status: StatusCode, url: String },

    /// Upstream answered with an error code in its payload
    #[error("API error (code {code}): {message}")]
    Api { code: String, message: String },

    /// Payload could not be decoded or has the wrong shape
    #[error("Malformed payload: {0}")]
    Payload(String),

    /// Payload was valid but carried no playable URL
    #[error("No playable URL in response")]
    NoPlayableUrl,

    /// Extraction tool reported success without producing a file
    #[error("Extraction finished but produced no output file")]
    NoOutput,

    /// Extraction tool exited with a failure
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Extraction tool is not installed
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    /// Provider was closed before the call
    #[error("Provider is closed")]
    Closed,

    /// Provider is switched off for maintenance
    #[error("Service temporarily unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Network trouble, rate limiting, server errors and deadlines.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => is_transient_status(*status),
            _ => false,
        }
    }
}

/// Statuses the upstream uses for overload and temporary outages.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            let url = err.url().map(|u| u.to_string()).unwrap_or_default();
            return Self::Http { status, url };
        }
        if err.is_decode() {
            return Self::Payload(err.to_string());
        }
        Self::Network(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for ProviderError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Failure of a whole resolution
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The chain has no providers to try
    #[error("No providers configured")]
    NoProviders,

    /// Every provider failed; only the last failure is kept
    #[error("All providers failed, last: {last}")]
    Exhausted { last: ProviderFailure },
}

impl ResolveError {
    /// Last provider failure, if any provider was tried
    pub fn last_failure(&self) -> Option<&ProviderFailure> {
        match self {
            Self::NoProviders => None,
            Self::Exhausted { last } => Some(last),
        }
    }

    pub fn is_service_unavailable(&self) -> bool {
        match self {
            Self::NoProviders => false,
            Self::Exhausted { last } => {
                matches!(last.error, ProviderError::Unavailable(_)) || last.error.is_transient()
            }
        }
    }

    /// Single user-facing line for chat front-ends.
    pub fn user_message(&self) -> &'static str {
        if self.is_service_unavailable() {
            SERVICE_UNAVAILABLE_MESSAGE
        } else {
            DOWNLOAD_FAILED_MESSAGE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exhausted(error: ProviderError) -> ResolveError {
        ResolveError::Exhausted {
            last: ProviderFailure {
                index: 1,
                provider: "test",
                error,
            },
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(ProviderError::Http {
            status: StatusCode::TOO_MANY_REQUESTS,
            url: String::new(),
        }
        .is_transient());
        assert!(!ProviderError::Http {
            status: StatusCode::NOT_FOUND,
            url: String::new(),
        }
        .is_transient());
        assert!(!ProviderError::NoPlayableUrl.is_transient());
        assert!(!ProviderError::NoOutput.is_transient());
    }

    #[test]
    fn test_transient_statuses() {
        for code in [429u16, 500, 502, 503, 504] {
            assert!(is_transient_status(StatusCode::from_u16(code).unwrap()), "{code}");
        }
        for code in [400u16, 401, 403, 404, 501] {
            assert!(!is_transient_status(StatusCode::from_u16(code).unwrap()), "{code}");
        }
    }

    #[test]
    fn test_timeout_display() {
        let err = ProviderError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Timed out after 1.5s");
    }

    #[test]
    fn test_user_message_unavailable() {
        let err = exhausted(ProviderError::Unavailable("maintenance".into()));
        assert!(err.is_service_unavailable());
        assert_eq!(err.user_message(), SERVICE_UNAVAILABLE_MESSAGE);

        let err = exhausted(ProviderError::Http {
            status: StatusCode::SERVICE_UNAVAILABLE,
            url: "https://www.tikwm.com/api/".into(),
        });
        assert_eq!(err.user_message(), SERVICE_UNAVAILABLE_MESSAGE);
    }

    #[test]
    fn test_user_message_generic() {
        let err = exhausted(ProviderError::NoOutput);
        assert!(!err.is_service_unavailable());
        assert_eq!(err.user_message(), DOWNLOAD_FAILED_MESSAGE);
        assert_eq!(ResolveError::NoProviders.user_message(), DOWNLOAD_FAILED_MESSAGE);
    }

    #[test]
    fn test_exhausted_display_names_last_provider() {
        let err = exhausted(ProviderError::NoOutput);
        let msg = err.to_string();
        assert!(msg.contains("provider 2 (test)"), "{msg}");
        assert!(msg.contains("no output file"), "{msg}");
    }
}
