use std::path::PathBuf;

use thiserror::Error;

/// CLI-level error carrying the process exit code.
///
/// - `2`: usage, configuration or local I/O problems
/// - `3`: no data to work with
/// - `4`: the HTTP client could not be set up
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::new(2, err.to_string())
    }
}

/// Why a single batch produced no data.
///
/// None of these abort a multi-batch run: the batch degrades to an empty
/// result and the error is kept alongside it for display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Network, TLS or timeout failure (after the relaxed-TLS retry).
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Non-2xx HTTP status.
    #[error("CENACE responded {status} for {url}: {snippet}")]
    UpstreamStatus {
        status: u16,
        url: String,
        snippet: String,
    },

    /// The payload did not match any known response shape.
    #[error("unparsable CENACE response (keys: [{}]): {detail}", .keys.join(", "))]
    UnparsableResponse { keys: Vec<String>, detail: String },
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport { .. } => "transport",
            FetchError::UpstreamStatus { .. } => "upstream-status",
            FetchError::UnparsableResponse { .. } => "unparsable",
        }
    }
}

/// Cache file failures. Callers treat both as non-fatal.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read cache file '{}': {message}", .path.display())]
    Read { path: PathBuf, message: String },

    #[error("failed to write cache file '{}': {message}", .path.display())]
    Write { path: PathBuf, message: String },
}
