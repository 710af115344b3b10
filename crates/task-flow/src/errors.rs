//! Error types for workflow orchestration.

use std::time::Duration;

use thiserror::Error;

use crate::types::RowStage;

/// Failure inside one pipeline step. Carries only what the report needs:
/// the message. Classification into row-level vs task-level comes from
/// where the failure happened, not from its type.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct StepError {
    pub message: String,
}

impl StepError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<ui_actions::ActionError> for StepError {
    fn from(err: ui_actions::ActionError) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<session_nav::NavError> for StepError {
    fn from(err: session_nav::NavError) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<download_watch::DownloadError> for StepError {
    fn from(err: download_watch::DownloadError) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<row_pager::PagerError> for StepError {
    fn from(err: row_pager::PagerError) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<element_locator::LocatorError> for StepError {
    fn from(err: element_locator::LocatorError) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<cdp_driver::DriverError> for StepError {
    fn from(err: cdp_driver::DriverError) -> Self {
        Self::msg(err.to_string())
    }
}

/// A row bailed out at some point of its sub-machine; the batch continues.
#[derive(Debug, Error, Clone)]
#[error("row skipped at {stage}: {reason}")]
pub struct RowSkip {
    pub stage: RowStage,
    pub reason: String,
}

impl RowSkip {
    pub fn at(stage: RowStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

/// Task-level failure recorded into the report.
#[derive(Debug, Error, Clone)]
pub enum FlowError {
    #[error("stage '{stage}' failed: {reason}")]
    StageFailed { stage: String, reason: String },

    #[error("stage '{stage}' timed out after {timeout:?}")]
    StageTimeout { stage: String, timeout: Duration },
}
