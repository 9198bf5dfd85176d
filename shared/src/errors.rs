/// Unified error types for the Mediablob system.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for the Mediablob system.
#[derive(Debug, Error)]
pub enum MediaBlobError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Catalog client error: {0}")]
    Client(#[from] ClientError),

    #[error("Asset store error: {0}")]
    Store(#[from] StoreError),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("Asset not in catalog: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while building a catalog listing on the server.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Unable to scan media directory {}: {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No reachable non-loopback IPv4 address is bound to this host")]
    NoReachableAddress,
}

/// Errors raised by the catalog client while fetching `/media-list`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Catalog payload did not decode: {0}")]
    Decode(String),
}

/// Errors raised by the local asset store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to commit {name}: {source}")]
    Commit {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Reason a single asset transfer ended in `Failed`.
///
/// Kept `Clone + Eq` so it can be carried inside a download state and compared in tests.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum DownloadError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server answered with status {0}")]
    Status(u16),

    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),

    #[error("Local IO error: {0}")]
    Io(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Download cancelled")]
    Cancelled,

    #[error("A download of {0} is already in progress")]
    AlreadyInProgress(String),
}

impl DownloadError {
    /// Whether re-running the download could plausibly succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            DownloadError::Transport(_) | DownloadError::Io(_) | DownloadError::Commit(_) => true,
            DownloadError::Status(code) => *code >= 500 || *code == 408 || *code == 429,
            DownloadError::InvalidUrl(_)
            | DownloadError::Cancelled
            | DownloadError::AlreadyInProgress(_) => false,
        }
    }
}

impl From<StoreError> for DownloadError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Commit { .. } => DownloadError::Commit(err.to_string()),
            StoreError::Io { .. } => DownloadError::Io(err.to_string()),
        }
    }
}

/// Result type alias for Mediablob operations.
pub type MediaBlobResult<T> = Result<T, MediaBlobError>;
