//! Error types for locator resolution.

use thiserror::Error;

/// Locator resolution failure.
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Every candidate was attempted at least once and none matched.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The candidate list itself is unusable.
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// The driver failed in a way polling cannot recover from.
    #[error("Driver error: {0}")]
    Driver(String),
}

impl LocatorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LocatorError::ElementNotFound(_))
    }
}
