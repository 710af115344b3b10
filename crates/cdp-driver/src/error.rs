//! Error surface of the driver boundary.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// High-level error categories surfaced by driver implementations.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DriverErrorKind {
    #[error("target element not found")]
    TargetNotFound,
    #[error("element handle went stale")]
    StaleHandle,
    #[error("element not interactable")]
    NotInteractable,
    #[error("option not found")]
    OptionNotFound,
    #[error("navigation timed out")]
    NavTimeout,
    #[error("cdp i/o failure")]
    CdpIo,
    #[error("internal error")]
    Internal,
}

/// Enriched error metadata passed back to higher layers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub hint: Option<String>,
    pub retriable: bool,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for DriverError {}

impl DriverError {
    pub fn new(kind: DriverErrorKind) -> Self {
        Self {
            kind,
            hint: None,
            retriable: false,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn retriable(mut self, flag: bool) -> Self {
        self.retriable = flag;
        self
    }

    pub fn is_stale(&self) -> bool {
        self.kind == DriverErrorKind::StaleHandle
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == DriverErrorKind::TargetNotFound
    }

    pub fn is_not_interactable(&self) -> bool {
        self.kind == DriverErrorKind::NotInteractable
    }
}

pub type DriverResult<T> = Result<T, DriverError>;
