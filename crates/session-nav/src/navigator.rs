//! Session navigator: one struct owning the navigational context of a
//! browser session. Frame and window excursions hand back guards that
//! restore the root context.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cdp_driver::Driver;
use element_locator::{LocatorList, Resolver, ResolverConfig};
use fiscobot_core_types::{poll_until, PollSpec};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::NavError;

/// Navigator tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NavConfig {
    /// Cadence of the long authentication poll.
    pub auth_poll_interval_ms: u64,
    /// Budget given to the wanted locator inside each scanned frame.
    pub frame_probe_timeout_ms: u64,
    /// Cadence of the new-window poll.
    pub window_poll_interval_ms: u64,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            auth_poll_interval_ms: 1_000,
            frame_probe_timeout_ms: 2_000,
            window_poll_interval_ms: 200,
        }
    }
}

impl NavConfig {
    pub(crate) fn auth_poll_interval(&self) -> Duration {
        Duration::from_millis(self.auth_poll_interval_ms)
    }

    pub(crate) fn frame_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_probe_timeout_ms)
    }

    pub(crate) fn window_poll_interval(&self) -> Duration {
        Duration::from_millis(self.window_poll_interval_ms)
    }
}

/// A UI condition signalling a session-state transition, e.g. "logged in".
#[derive(Clone, Debug)]
pub enum Landmark {
    /// The current URL contains this fragment.
    UrlContains(String),
    /// A characteristic control resolves.
    Control(LocatorList),
}

impl fmt::Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Landmark::UrlContains(fragment) => write!(f, "url contains '{fragment}'"),
            Landmark::Control(list) => write!(f, "control {list}"),
        }
    }
}

/// Manages authentication waits, iframe descent, and window handoff for
/// one session.
pub struct SessionNavigator {
    pub(crate) driver: Arc<dyn Driver>,
    pub(crate) resolver: Resolver,
    pub(crate) cfg: NavConfig,
}

impl SessionNavigator {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self::with_config(driver, NavConfig::default())
    }

    pub fn with_config(driver: Arc<dyn Driver>, cfg: NavConfig) -> Self {
        let resolver = Resolver::with_config(
            driver.clone(),
            ResolverConfig {
                poll_interval: Duration::from_millis(250),
            },
        );
        Self {
            driver,
            resolver,
            cfg,
        }
    }

    pub fn driver(&self) -> Arc<dyn Driver> {
        self.driver.clone()
    }

    pub(crate) async fn landmark_present(&self, landmark: &Landmark) -> Result<bool, NavError> {
        match landmark {
            Landmark::UrlContains(fragment) => {
                let url = self
                    .driver
                    .current_url()
                    .await
                    .map_err(|err| NavError::Driver(err.to_string()))?;
                Ok(url.contains(fragment.as_str()))
            }
            Landmark::Control(list) => {
                let resolved = self
                    .resolver
                    .try_resolve_now(list)
                    .await
                    .map_err(|err| NavError::Driver(err.to_string()))?;
                Ok(resolved.is_some())
            }
        }
    }

    async fn await_any_landmark(
        &self,
        landmarks: &[Landmark],
        timeout: Duration,
        interval: Duration,
    ) -> Result<Option<usize>, NavError> {
        let outcome = poll_until(PollSpec::new(timeout, interval), || async {
            for (index, landmark) in landmarks.iter().enumerate() {
                match self.landmark_present(landmark).await {
                    Ok(true) => return Some(Ok(index)),
                    Ok(false) => {}
                    Err(err) => return Some(Err(err)),
                }
            }
            None
        })
        .await;

        match outcome {
            Ok(Ok(index)) => Ok(Some(index)),
            Ok(Err(err)) => Err(err),
            Err(_) => Ok(None),
        }
    }

    /// Block until a post-login landmark appears. This is the long wait
    /// (minutes) that covers the human typing credentials and solving
    /// whatever the portal throws at them; the engine only detects
    /// completion.
    pub async fn await_authenticated(
        &self,
        landmarks: &[Landmark],
        timeout: Duration,
    ) -> Result<(), NavError> {
        info!("waiting for manual login");
        match self
            .await_any_landmark(landmarks, timeout, self.cfg.auth_poll_interval())
            .await?
        {
            Some(index) => {
                info!(landmark = %landmarks[index], "login detected");
                Ok(())
            }
            None => Err(NavError::AuthenticationTimeout(format!(
                "no login landmark within {timeout:?}"
            ))),
        }
    }

    /// Wait for a navigation landmark with the short UI cadence.
    pub async fn await_landmark(
        &self,
        landmark: &Landmark,
        timeout: Duration,
    ) -> Result<(), NavError> {
        match self
            .await_any_landmark(
                std::slice::from_ref(landmark),
                timeout,
                Duration::from_millis(250),
            )
            .await?
        {
            Some(_) => Ok(()),
            None => Err(NavError::NavigationTimeout(format!(
                "{landmark} not reached within {timeout:?}"
            ))),
        }
    }
}
