//! Iframe descent with guaranteed context restore.

use std::sync::Arc;

use cdp_driver::{Driver, FrameRef};
use element_locator::LocatorList;
use tracing::{debug, info, warn};

use crate::errors::NavError;
use crate::navigator::SessionNavigator;

/// Scoped frame context. Holds the session inside one iframe (or the top
/// document) until [`restore`](FrameGuard::restore) is called.
///
/// Restore is explicit because it needs the driver; dropping the guard
/// without restoring leaves the scope in place and logs a warning.
#[must_use = "call restore() to return to the top-level document"]
pub struct FrameGuard {
    driver: Arc<dyn Driver>,
    entered: Option<FrameRef>,
    restored: bool,
}

impl std::fmt::Debug for FrameGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameGuard")
            .field("entered", &self.entered)
            .field("restored", &self.restored)
            .finish_non_exhaustive()
    }
}

impl FrameGuard {
    /// Which frame was entered; `None` means the match was at top level.
    pub fn frame(&self) -> Option<&FrameRef> {
        self.entered.as_ref()
    }

    /// Return to the top-level document.
    pub async fn restore(mut self) -> Result<(), NavError> {
        self.restored = true;
        self.driver
            .reset_frame()
            .await
            .map_err(|err| NavError::Driver(err.to_string()))
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if !self.restored && self.entered.is_some() {
            warn!("frame guard dropped without restore; scope left in frame");
        }
    }
}

impl SessionNavigator {
    /// Find the frame containing `locators`, starting at the top document
    /// and scanning at most `max_frames` child iframes. The scope stays
    /// inside the first frame with a match; on failure the scope is always
    /// reset to top level.
    pub async fn descend_to_frame_containing(
        &self,
        locators: &LocatorList,
        max_frames: usize,
    ) -> Result<FrameGuard, NavError> {
        self.driver
            .reset_frame()
            .await
            .map_err(|err| NavError::Driver(err.to_string()))?;

        let probe_budget = self.cfg.frame_probe_timeout();
        if self
            .resolver
            .resolve_first(locators, probe_budget)
            .await
            .is_ok()
        {
            debug!(%locators, "match at top-level document");
            return Ok(FrameGuard {
                driver: self.driver.clone(),
                entered: None,
                restored: false,
            });
        }

        let frames = self
            .driver
            .list_frames()
            .await
            .map_err(|err| NavError::Driver(err.to_string()))?;

        for frame in frames.into_iter().take(max_frames) {
            if self.driver.enter_frame(&frame).await.is_err() {
                continue;
            }
            if self
                .resolver
                .resolve_first(locators, probe_budget)
                .await
                .is_ok()
            {
                info!(frame = %frame, %locators, "descended into frame");
                return Ok(FrameGuard {
                    driver: self.driver.clone(),
                    entered: Some(frame),
                    restored: false,
                });
            }
            self.driver
                .reset_frame()
                .await
                .map_err(|err| NavError::Driver(err.to_string()))?;
        }

        self.driver
            .reset_frame()
            .await
            .map_err(|err| NavError::Driver(err.to_string()))?;
        Err(NavError::FrameNotFound(format!(
            "no frame contains {locators}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::NavConfig;
    use cdp_driver::{FakeDriver, FakeElement, Strategy};
    use element_locator::Locator;

    fn navigator(fake: &FakeDriver) -> SessionNavigator {
        SessionNavigator::with_config(
            Arc::new(fake.clone()),
            NavConfig {
                auth_poll_interval_ms: 10,
                frame_probe_timeout_ms: 0,
                window_poll_interval_ms: 10,
            },
        )
    }

    #[tokio::test]
    async fn match_at_top_level_enters_no_frame() {
        let fake = FakeDriver::new();
        fake.add_element(FakeElement::new().by_css("select#ano"));

        let guard = navigator(&fake)
            .descend_to_frame_containing(&Locator::css("select#ano").into(), 5)
            .await
            .unwrap();
        assert!(guard.frame().is_none());
        guard.restore().await.unwrap();
    }

    #[tokio::test]
    async fn descends_into_the_frame_with_the_match() {
        let fake = FakeDriver::new();
        fake.add_frame(0, "iframe[data-fiscobot-frame=\"fb-frame-0\"]");
        fake.add_frame(0, "iframe[data-fiscobot-frame=\"fb-frame-1\"]");
        fake.add_element(
            FakeElement::new()
                .by_css("select#exercicio")
                .in_frame("iframe[data-fiscobot-frame=\"fb-frame-1\"]"),
        );

        let nav = navigator(&fake);
        let guard = nav
            .descend_to_frame_containing(&Locator::css("select#exercicio").into(), 5)
            .await
            .unwrap();
        assert_eq!(
            guard.frame().map(|f| f.selector.as_str()),
            Some("iframe[data-fiscobot-frame=\"fb-frame-1\"]")
        );

        // Scope is inside the frame until restored.
        assert_eq!(
            fake.query(Strategy::Css, "select#exercicio")
                .await
                .unwrap()
                .len(),
            1
        );
        guard.restore().await.unwrap();
        assert!(fake
            .query(Strategy::Css, "select#exercicio")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn scan_is_bounded_and_resets_on_failure() {
        let fake = FakeDriver::new();
        fake.add_frame(0, "iframe[data-fiscobot-frame=\"fb-frame-0\"]");
        fake.add_frame(0, "iframe[data-fiscobot-frame=\"fb-frame-1\"]");
        // Element lives in the second frame, but the scan stops after one.
        fake.add_element(
            FakeElement::new()
                .by_css("#deep")
                .in_frame("iframe[data-fiscobot-frame=\"fb-frame-1\"]"),
        );

        let err = navigator(&fake)
            .descend_to_frame_containing(&Locator::css("#deep").into(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::FrameNotFound(_)));
        assert!(fake.current_frame().await.unwrap().is_none());
    }
}
