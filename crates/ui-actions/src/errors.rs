//! Error types for action execution.

use cdp_driver::{DriverError, DriverErrorKind};
use element_locator::LocatorError;
use thiserror::Error;

/// Failure of one UI action.
#[derive(Debug, Error, Clone)]
pub enum ActionError {
    /// All locator fallbacks were exhausted.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The DOM mutated between resolution and the action.
    #[error("Stale element: {0}")]
    StaleElement(String),

    /// Neither the native nor the script click could land.
    #[error("Element not clickable: {0}")]
    NotClickable(String),

    /// No dropdown option matched the wanted text.
    #[error("Option not found in dropdown: {0}")]
    OptionNotFound(String),

    /// A bounded wait ran out of budget.
    #[error("Wait timeout: {0}")]
    WaitTimeout(String),

    /// Protocol-level failure underneath the action.
    #[error("Driver error: {0}")]
    Driver(String),
}

impl ActionError {
    /// Whether re-resolving the element could make a retry meaningful.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::StaleElement(_)
                | ActionError::NotClickable(_)
                | ActionError::WaitTimeout(_)
        )
    }

    pub(crate) fn from_driver(err: DriverError, context: &str) -> Self {
        match err.kind {
            DriverErrorKind::StaleHandle => ActionError::StaleElement(format!("{context}: {err}")),
            DriverErrorKind::TargetNotFound => {
                ActionError::ElementNotFound(format!("{context}: {err}"))
            }
            DriverErrorKind::NotInteractable => {
                ActionError::NotClickable(format!("{context}: {err}"))
            }
            DriverErrorKind::OptionNotFound => {
                ActionError::OptionNotFound(format!("{context}: {err}"))
            }
            DriverErrorKind::NavTimeout => ActionError::WaitTimeout(format!("{context}: {err}")),
            _ => ActionError::Driver(format!("{context}: {err}")),
        }
    }
}

impl From<LocatorError> for ActionError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::ElementNotFound(detail) => ActionError::ElementNotFound(detail),
            LocatorError::InvalidLocator(detail) => ActionError::ElementNotFound(detail),
            LocatorError::Driver(detail) => ActionError::Driver(detail),
        }
    }
}
