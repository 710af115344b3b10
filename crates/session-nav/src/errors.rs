//! Error types for session navigation.

use thiserror::Error;

/// Navigation-level failure. Authentication and navigation timeouts are
/// task-fatal for the orchestrator; frame/window misses are usually
/// recoverable fallbacks.
#[derive(Debug, Error, Clone)]
pub enum NavError {
    /// Manual login did not complete within the long wait window.
    #[error("Authentication timeout: {0}")]
    AuthenticationTimeout(String),

    /// A post-navigation landmark never appeared.
    #[error("Navigation timeout: {0}")]
    NavigationTimeout(String),

    /// No scanned frame contained the wanted element.
    #[error("Frame not found: {0}")]
    FrameNotFound(String),

    /// A window handle disappeared or never showed up.
    #[error("Window not found: {0}")]
    WindowNotFound(String),

    /// Protocol-level failure underneath the navigator.
    #[error("Driver error: {0}")]
    Driver(String),
}

impl NavError {
    pub fn is_fatal_for_task(&self) -> bool {
        matches!(
            self,
            NavError::AuthenticationTimeout(_) | NavError::NavigationTimeout(_)
        )
    }
}
