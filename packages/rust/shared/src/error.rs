//! Error types for answerbank.
//!
//! Library crates use [`AnswerBankError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all answerbank operations.
#[derive(Debug, thiserror::Error)]
pub enum AnswerBankError {
    /// Configuration loading or validation error (including missing credentials).
    #[error("config error: {message}")]
    Config { message: String },

    /// Connection failure, timeout, or unreadable response body.
    #[error("network error: {0}")]
    Network(String),

    /// Upstream asked us to slow down (HTTP 429).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Upstream answered with a non-success status not covered elsewhere.
    #[error("upstream error (HTTP {status}): {message}")]
    Upstream { status: u16, message: String },

    /// Credentials rejected by an upstream service.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// HTML or JSON payload could not be interpreted.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Every configured question source failed after retries.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Answer generation failed for a single question.
    #[error("enrichment failed: {0}")]
    Enrichment(String),

    /// The dataset file could not be written.
    #[error("write error at {path:?}: {message}")]
    Write { path: PathBuf, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed dataset line, bad input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AnswerBankError>;

impl AnswerBankError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a dataset write error.
    pub fn write(path: impl Into<PathBuf>, msg: impl std::fmt::Display) -> Self {
        Self::Write {
            path: path.into(),
            message: msg.to_string(),
        }
    }

    /// Map a non-success HTTP status to the matching error variant.
    pub fn from_status(context: &str, status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        let message = if snippet.is_empty() {
            context.to_string()
        } else {
            format!("{context}: {snippet}")
        };

        match status {
            429 => Self::RateLimited(message),
            401 | 403 => Self::Auth(message),
            _ => Self::Upstream { status, message },
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Rate limits, timeouts, connection failures, and 5xx responses are
    /// transient. Auth failures and malformed input are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited(_) => true,
            Self::Upstream { status, .. } => *status >= 500 || *status == 408,
            _ => false,
        }
    }
}
