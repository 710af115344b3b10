//! Blocking-overlay and modal handling.
//!
//! ASP-era portals throw `ui-dialog` alerts and full-page overlays at
//! arbitrary points; actions must not fire into them. The guard clears
//! overlays (force-removing them as a last resort, since some never
//! self-dismiss under automation) and dismisses modals under a bounded
//! iteration budget.

use std::sync::Arc;
use std::time::Duration;

use cdp_driver::{Driver, Strategy};
use element_locator::{Locator, LocatorList, Resolver, ResolverConfig};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::errors::ActionError;

/// Overlay/modal marker configuration. Defaults cover the jQuery-UI and
/// Bootstrap stacks the fiscal portals run on.
#[derive(Clone, Debug)]
pub struct OverlayConfig {
    /// CSS markers of full-page blocking layers.
    pub overlay_markers: Vec<String>,
    /// Locators for a visible modal dialog container.
    pub dialog_locators: LocatorList,
    /// Closing controls searched inside the dialog, in fallback order.
    pub close_locators: Vec<Locator>,
    pub poll_interval: Duration,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            overlay_markers: vec![
                ".ui-widget-overlay".to_string(),
                ".modal-backdrop".to_string(),
                ".blockUI".to_string(),
            ],
            dialog_locators: LocatorList::of(vec![Locator::xpath(
                "//div[contains(@class,'ui-dialog') and contains(@class,'ui-widget') and not(contains(@style,'display: none'))]",
            )]),
            close_locators: vec![
                Locator::xpath(
                    ".//button[contains(.,'Fechar') or contains(.,'OK') or contains(.,'Ok')]",
                ),
                Locator::xpath(
                    ".//input[@type='button' and (contains(@value,'Fechar') or contains(@value,'OK') or contains(@value,'Ok'))]",
                ),
                Locator::xpath(".//a[contains(@class,'ui-dialog-titlebar-close')]"),
            ],
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// Detects and clears blocking UI states before/after actions.
pub struct OverlayGuard {
    driver: Arc<dyn Driver>,
    resolver: Resolver,
    cfg: OverlayConfig,
}

impl OverlayGuard {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self::with_config(driver, OverlayConfig::default())
    }

    pub fn with_config(driver: Arc<dyn Driver>, cfg: OverlayConfig) -> Self {
        let resolver = Resolver::with_config(
            driver.clone(),
            ResolverConfig {
                poll_interval: cfg.poll_interval,
            },
        );
        Self {
            driver,
            resolver,
            cfg,
        }
    }

    async fn any_overlay_visible(&self) -> Result<bool, ActionError> {
        for marker in &self.cfg.overlay_markers {
            let handles = self
                .driver
                .query(Strategy::Css, marker)
                .await
                .map_err(|err| ActionError::Driver(err.to_string()))?;
            for handle in handles {
                match self.driver.is_displayed(&handle).await {
                    Ok(true) => return Ok(true),
                    Ok(false) => {}
                    // An overlay that vanished mid-check is a cleared overlay.
                    Err(err) if err.is_stale() => {}
                    Err(err) => return Err(ActionError::Driver(err.to_string())),
                }
            }
        }
        Ok(false)
    }

    /// Wait until no blocking overlay is visible. After `timeout`, remaining
    /// overlays are stripped from the DOM and the wait reports success.
    pub async fn await_clear(&self, timeout: Duration) -> Result<(), ActionError> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.any_overlay_visible().await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(self.cfg.poll_interval).await;
        }

        let css = self.cfg.overlay_markers.join(",");
        let removed = self
            .driver
            .remove_matching_nodes(&css)
            .await
            .map_err(|err| ActionError::Driver(err.to_string()))?;
        warn!(removed, "overlay never cleared, removed by force");
        Ok(())
    }

    /// Repeatedly close the topmost visible modal, up to `max_iterations`.
    ///
    /// A bounded-retry policy, not a correctness guarantee: a dialog whose
    /// close control does nothing stops the loop at the bound. Returns how
    /// many dialogs were dismissed; callers use a non-zero count as a
    /// "portal refused the request" signal.
    pub async fn dismiss_modals(&self, max_iterations: usize) -> Result<usize, ActionError> {
        let mut dismissed = 0;
        for _ in 0..max_iterations {
            let Some(dialog) = self.resolver.try_resolve_now(&self.cfg.dialog_locators).await?
            else {
                break;
            };
            match self.driver.is_displayed(&dialog.handle).await {
                Ok(true) => {}
                _ => break,
            }

            let mut close_handle = None;
            for locator in &self.cfg.close_locators {
                let found = self
                    .driver
                    .query_within(&dialog.handle, locator.strategy, &locator.selector)
                    .await
                    .unwrap_or_default();
                if let Some(handle) = found.into_iter().next() {
                    close_handle = Some(handle);
                    break;
                }
            }
            let Some(close_handle) = close_handle else {
                debug!("modal has no known close control");
                break;
            };

            // Script dispatch: close buttons routinely sit under the overlay
            // they are meant to clear.
            if let Err(err) = self.driver.click_script(&close_handle).await {
                debug!(%err, "modal close click failed");
                break;
            }
            dismissed += 1;
            self.await_clear(Duration::from_secs(6)).await?;
            sleep(self.cfg.poll_interval).await;
        }

        if dismissed > 0 {
            info!(dismissed, "closed alert dialog(s)");
        }
        Ok(dismissed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_driver::{FakeDriver, FakeEffect, FakeElement};

    fn guard(fake: &FakeDriver) -> OverlayGuard {
        let mut cfg = OverlayConfig::default();
        cfg.poll_interval = Duration::from_millis(5);
        OverlayGuard::with_config(Arc::new(fake.clone()), cfg)
    }

    #[tokio::test]
    async fn clear_page_returns_immediately() {
        let fake = FakeDriver::new();
        guard(&fake)
            .await_clear(Duration::from_millis(50))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stuck_overlay_is_removed_by_force() {
        let fake = FakeDriver::new();
        fake.add_element(FakeElement::new().by_css(".ui-widget-overlay"));

        guard(&fake)
            .await_clear(Duration::from_millis(30))
            .await
            .unwrap();
        // The overlay was stripped out of the DOM.
        assert!(fake
            .query(Strategy::Css, ".ui-widget-overlay")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn dismisses_modal_through_its_close_button() {
        let fake = FakeDriver::new();
        let dialog = fake.add_element(FakeElement::new().by_xpath(
            "//div[contains(@class,'ui-dialog') and contains(@class,'ui-widget') and not(contains(@style,'display: none'))]",
        ));
        fake.add_element(
            FakeElement::new()
                .child_of(dialog)
                .by_xpath(".//button[contains(.,'Fechar') or contains(.,'OK') or contains(.,'Ok')]")
                .on_click(FakeEffect::RemoveElement(dialog)),
        );

        let dismissed = guard(&fake).dismiss_modals(4).await.unwrap();
        assert_eq!(dismissed, 1);
        assert_eq!(guard(&fake).dismiss_modals(4).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stuck_modal_stops_at_the_iteration_bound() {
        let fake = FakeDriver::new();
        let dialog = fake.add_element(FakeElement::new().by_xpath(
            "//div[contains(@class,'ui-dialog') and contains(@class,'ui-widget') and not(contains(@style,'display: none'))]",
        ));
        // Close control that does nothing.
        fake.add_element(
            FakeElement::new()
                .child_of(dialog)
                .by_xpath(".//button[contains(.,'Fechar') or contains(.,'OK') or contains(.,'Ok')]"),
        );

        let dismissed = guard(&fake).dismiss_modals(3).await.unwrap();
        assert_eq!(dismissed, 3);
    }
}
