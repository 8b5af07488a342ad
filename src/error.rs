//! Fetch-boundary errors
//!
//! Everything past the fetch boundary uses `anyhow`. A `FetchError` never aborts a
//! cycle: the affected resource is skipped and retried on the next poll.

use thiserror::Error;

/// Failure to obtain one resource snapshot from the backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Backend answered with a non-2xx status
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Connection, TLS or other transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Fetch exceeded the configured per-request bound
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// Body could not be decoded into the expected records
    #[error("decode error: {0}")]
    Decode(String),

    /// Resource explicitly unavailable (fixture-injected or misconfigured)
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(0)
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Http {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}
