//! Session navigation.
//!
//! [`SessionNavigator`] owns the navigational context of one browser
//! session: the long manual-login wait, bounded iframe descent, and
//! popup-window handoff. Frame and window excursions return guards whose
//! restore puts the session back at the known root before the next
//! logical operation.

pub mod errors;
pub mod frames;
pub mod navigator;
pub mod windows;

pub use errors::NavError;
pub use frames::FrameGuard;
pub use navigator::{Landmark, NavConfig, SessionNavigator};
pub use windows::{WindowChange, WindowGuard, WindowSnapshot};

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_driver::{FakeDriver, FakeElement};
    use element_locator::Locator;
    use std::sync::Arc;
    use std::time::Duration;

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
    async fn authentication_detected_by_url_landmark() {
        let fake = FakeDriver::with_url("https://portal/Login.aspx");
        let nav = navigator(&fake);

        let background = {
            let fake = fake.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                fake.set_url(0, "https://portal/EmissorNacional");
            })
        };

        nav.await_authenticated(
            &[Landmark::UrlContains("/EmissorNacional".to_string())],
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        background.await.unwrap();
    }

    #[tokio::test]
    async fn authentication_detected_by_characteristic_control() {
        let fake = FakeDriver::with_url("https://portal/login");
        fake.add_element(FakeElement::new().anchor("Notas Fiscais").appears_after(2));
        let nav = navigator(&fake);

        nav.await_authenticated(
            &[
                Landmark::UrlContains("/Home".to_string()),
                Landmark::Control(Locator::link_text("Notas Fiscais").into()),
            ],
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn authentication_times_out() {
        let fake = FakeDriver::with_url("https://portal/login");
        let nav = navigator(&fake);

        let err = nav
            .await_authenticated(
                &[Landmark::UrlContains("/Home".to_string())],
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::AuthenticationTimeout(_)));
        assert!(err.is_fatal_for_task());
    }

    #[tokio::test]
    async fn landmark_wait_reports_navigation_timeout() {
        let fake = FakeDriver::with_url("https://portal/somewhere");
        let nav = navigator(&fake);

        let err = nav
            .await_landmark(
                &Landmark::UrlContains("/Notas/Emitidas".to_string()),
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::NavigationTimeout(_)));
    }
}
