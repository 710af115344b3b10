//! Error types for download synchronization and archiving.

use thiserror::Error;

/// Failure while waiting for or archiving a downloaded artifact.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// No new stable artifact appeared within the budget.
    #[error("Download timeout: {0}")]
    DownloadTimeout(String),

    /// The archive is corrupt, empty, or entirely unsafe to unpack.
    #[error("Extraction failure: {0}")]
    ExtractionFailure(String),

    /// Filesystem operation failed underneath the watcher/archiver.
    #[error("I/O failure: {0}")]
    Io(String),
}

impl DownloadError {
    pub(crate) fn io(context: &str, err: std::io::Error) -> Self {
        DownloadError::Io(format!("{context}: {err}"))
    }
}
