//! Error types for pagination traversal.

use thiserror::Error;
use ui_actions::ActionError;

/// Traversal failure. Row-level staleness is reported so the visitor can
/// skip the row; anything else aborts the traversal.
#[derive(Debug, Error, Clone)]
pub enum PagerError {
    /// A row handle went stale while reading it.
    #[error("Stale row: {0}")]
    StaleRow(String),

    /// Clicking the next control failed.
    #[error("Action error: {0}")]
    Action(String),

    /// Protocol-level failure underneath the pager.
    #[error("Driver error: {0}")]
    Driver(String),

    /// The page visitor aborted the traversal.
    #[error("Visitor error: {0}")]
    Visitor(String),
}

impl From<ActionError> for PagerError {
    fn from(err: ActionError) -> Self {
        PagerError::Action(err.to_string())
    }
}
