//! Popup-window handoff.
//!
//! Some portals open the generated PDF in a fresh window/tab, some swap
//! the current page, and some just start a download in place. The
//! navigator snapshots the handles before the triggering action and then
//! reports whichever of the three happened.

use std::sync::Arc;
use std::time::Duration;

use cdp_driver::{Driver, WindowHandle};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::errors::NavError;
use crate::navigator::SessionNavigator;

/// Window handles plus current URL, captured before a triggering action.
#[derive(Clone, Debug)]
pub struct WindowSnapshot {
    pub original: WindowHandle,
    pub handles: Vec<WindowHandle>,
    pub url: String,
}

/// What happened after the triggering action.
pub enum WindowChange {
    /// A window spawned; the session is switched into it. Close it and
    /// restore the original through the guard when done.
    NewWindow(WindowGuard),
    /// Same window, new URL.
    Navigated(String),
    /// Nothing observable changed (e.g. the download started in place).
    None,
}

/// Scoped excursion into a spawned window. The caller is responsible for
/// [`close_and_restore`](WindowGuard::close_and_restore); dropping the
/// guard without doing so leaves the spawned window open and logs.
#[must_use = "call close_and_restore() to return to the original window"]
pub struct WindowGuard {
    driver: Arc<dyn Driver>,
    original: WindowHandle,
    spawned: WindowHandle,
    finished: bool,
}

impl WindowGuard {
    pub fn spawned(&self) -> &WindowHandle {
        &self.spawned
    }

    /// Close the spawned window and re-activate the original. When the
    /// original is gone too, fall back to the first surviving window.
    pub async fn close_and_restore(mut self) -> Result<(), NavError> {
        self.finished = true;
        if let Err(err) = self.driver.close_window(&self.spawned).await {
            debug!(%err, "spawned window already gone");
        }
        if self.driver.switch_window(&self.original).await.is_err() {
            let survivors = self
                .driver
                .window_handles()
                .await
                .map_err(|err| NavError::Driver(err.to_string()))?;
            let fallback = survivors.into_iter().next().ok_or_else(|| {
                NavError::WindowNotFound("no window left to restore".to_string())
            })?;
            self.driver
                .switch_window(&fallback)
                .await
                .map_err(|err| NavError::Driver(err.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for WindowGuard {
    fn drop(&mut self) {
        if !self.finished {
            warn!(window = %self.spawned, "window guard dropped without restore");
        }
    }
}

impl SessionNavigator {
    /// Capture the window handles and URL before a triggering action.
    pub async fn snapshot_windows(&self) -> Result<WindowSnapshot, NavError> {
        let original = self
            .driver
            .active_window()
            .await
            .map_err(|err| NavError::Driver(err.to_string()))?;
        let handles = self
            .driver
            .window_handles()
            .await
            .map_err(|err| NavError::Driver(err.to_string()))?;
        let url = self
            .driver
            .current_url()
            .await
            .map_err(|err| NavError::Driver(err.to_string()))?;
        Ok(WindowSnapshot {
            original,
            handles,
            url,
        })
    }

    /// Detect a spawned window or a URL change after a triggering action.
    /// No observable change within `timeout` is [`WindowChange::None`],
    /// not an error: downloads regularly start without either.
    pub async fn follow_new_window(
        &self,
        prior: &WindowSnapshot,
        timeout: Duration,
    ) -> Result<WindowChange, NavError> {
        let deadline = Instant::now() + timeout;
        loop {
            let handles = self
                .driver
                .window_handles()
                .await
                .map_err(|err| NavError::Driver(err.to_string()))?;
            if let Some(fresh) = handles
                .into_iter()
                .find(|handle| !prior.handles.contains(handle))
            {
                self.driver
                    .switch_window(&fresh)
                    .await
                    .map_err(|err| NavError::Driver(err.to_string()))?;
                info!(window = %fresh, "following spawned window");
                return Ok(WindowChange::NewWindow(WindowGuard {
                    driver: self.driver.clone(),
                    original: prior.original.clone(),
                    spawned: fresh,
                    finished: false,
                }));
            }

            let url = self
                .driver
                .current_url()
                .await
                .map_err(|err| NavError::Driver(err.to_string()))?;
            if url != prior.url {
                info!(%url, "navigation detected");
                return Ok(WindowChange::Navigated(url));
            }

            if Instant::now() >= deadline {
                return Ok(WindowChange::None);
            }
            sleep(self.cfg.window_poll_interval()).await;
        }
    }
}
