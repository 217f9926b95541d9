//! Error types for ctaflow.
//!
//! Library crates use [`CtaFlowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ctaflow operations.
#[derive(Debug, thiserror::Error)]
pub enum CtaFlowError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The content endpoint answered with a non-2xx status.
    #[error("transport error: HTTP {status} from {url}")]
    Transport { status: u16, url: String },

    /// Connection-level failure before any status was received.
    #[error("network error: {0}")]
    Network(String),

    /// The response body was not valid JSON.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Well-formed JSON that lacks the expected item.
    #[error("missing data: {message}")]
    MissingData { message: String },

    /// Path mapping lookup failed. Never fatal to a resolution.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad URL, invalid config value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CtaFlowError>;

impl CtaFlowError {
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

    /// Create a missing-data error from any displayable message.
    pub fn missing_data(msg: impl Into<String>) -> Self {
        Self::MissingData {
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

    /// Short machine-readable kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Transport { .. } => "transport",
            Self::Network(_) => "network",
            Self::Parse { .. } => "parse",
            Self::MissingData { .. } => "missing_data",
            Self::Mapping(_) => "mapping",
            Self::Io { .. } => "io",
            Self::Validation { .. } => "validation",
        }
    }
}
