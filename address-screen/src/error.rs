//! Error types for address screening
//!
//! Two levels of failure exist:
//! - [`ScreenError`] aborts the whole run (bad input, bad configuration,
//!   cancellation, output I/O). No output file is produced.
//! - [`ScreeningError`] belongs to a single address. It is recorded in that
//!   address's output row and never stops the batch.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for run-level operations
pub type Result<T> = std::result::Result<T, ScreenError>;

/// Fatal, run-level errors
#[derive(Error, Debug)]
pub enum ScreenError {
    /// Input file missing, unreadable, or with the wrong shape
    #[error("Input error: {0}")]
    Input(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Exposure category catalog could not be loaded
    #[error("Category catalog unavailable: {0}")]
    Catalog(String),

    /// Run aborted before every address was screened
    #[error("Run cancelled after {completed}/{total} addresses")]
    Cancelled {
        /// Addresses finished when the run stopped
        completed: usize,
        /// Addresses in the batch
        total: usize,
    },

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ScreenError {
    fn from(err: config::ConfigError) -> Self {
        ScreenError::Config(err.to_string())
    }
}

/// What went wrong while screening one address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningErrorKind {
    /// Address rejected before any call was made
    InvalidAddress,
    /// Service answered with a non-success status
    Api,
    /// Connection failure
    Transport,
    /// Call (or the whole per-address deadline) timed out
    Timeout,
    /// Response body did not have the expected shape
    Malformed,
    /// Service answered but the screening is not complete
    Incomplete,
}

/// Terminal failure for one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningError {
    pub kind: ScreeningErrorKind,
    /// HTTP status, when the service answered
    pub code: Option<u16>,
    pub message: String,
    /// Response body or transport detail, kept for logs
    pub detail: Option<String>,
}

impl ScreeningError {
    pub fn invalid_address(message: impl Into<String>) -> Self {
        Self::new(ScreeningErrorKind::InvalidAddress, None, message)
    }

    /// Non-success response. The message is the canonical reason phrase.
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown Status");
        let body = body.into();
        Self {
            kind: ScreeningErrorKind::Api,
            code: Some(status),
            message: reason.to_string(),
            detail: (!body.is_empty()).then_some(body),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ScreeningErrorKind::Transport, None, message)
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::new(
            ScreeningErrorKind::Timeout,
            None,
            format!("no response after {}s", seconds),
        )
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ScreeningErrorKind::Malformed, None, message)
    }

    pub fn incomplete(status: &str) -> Self {
        Self::new(
            ScreeningErrorKind::Incomplete,
            None,
            format!("screening status {}", status.to_lowercase()),
        )
    }

    fn new(kind: ScreeningErrorKind, code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Whether a fresh attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ScreeningErrorKind::Transport | ScreeningErrorKind::Timeout => true,
            ScreeningErrorKind::Api => self.code == Some(429),
            _ => false,
        }
    }

    /// Text written to the `screenStatus` column
    pub fn status_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ScreeningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.code) {
            (ScreeningErrorKind::Api, Some(code)) => write!(f, "{} {}", code, self.message),
            (ScreeningErrorKind::InvalidAddress, _) => write!(f, "invalid address: {}", self.message),
            (ScreeningErrorKind::Transport, _) => write!(f, "transport error: {}", self.message),
            (ScreeningErrorKind::Timeout, _) => write!(f, "timeout: {}", self.message),
            (ScreeningErrorKind::Malformed, _) => write!(f, "malformed response: {}", self.message),
            (ScreeningErrorKind::Incomplete, _) => write!(f, "incomplete: {}", self.message),
            (_, _) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ScreeningError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_uses_reason_phrase() {
        let err = ScreeningError::api(400, r#"{"message":"bad address"}"#);
        assert_eq!(err.to_string(), "400 Bad Request");
        assert_eq!(err.code, Some(400));
        assert!(err.detail.is_some());

        let err = ScreeningError::api(404, "");
        assert_eq!(err.status_text(), "404 Not Found");
        assert!(err.detail.is_none());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ScreeningError::transport("connection reset").is_retryable());
        assert!(ScreeningError::timeout(30).is_retryable());
        assert!(ScreeningError::api(429, "").is_retryable());

        assert!(!ScreeningError::api(503, "").is_retryable());
        assert!(!ScreeningError::api(400, "").is_retryable());
        assert!(!ScreeningError::api(401, "").is_retryable());
        assert!(!ScreeningError::malformed("missing risk").is_retryable());
        assert!(!ScreeningError::invalid_address("empty").is_retryable());
    }

    #[test]
    fn test_status_text_never_empty() {
        let errors = [
            ScreeningError::invalid_address("empty"),
            ScreeningError::transport("dns"),
            ScreeningError::timeout(5),
            ScreeningError::malformed("eof"),
            ScreeningError::incomplete("IN_PROGRESS"),
        ];
        for err in errors {
            assert!(!err.status_text().is_empty());
        }
        assert_eq!(
            ScreeningError::incomplete("IN_PROGRESS").status_text(),
            "incomplete: screening status in_progress"
        );
    }
}
