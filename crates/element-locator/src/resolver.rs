//! Ordered-fallback resolution.

use std::sync::Arc;
use std::time::Duration;

use cdp_driver::{Driver, ElementHandle};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::errors::LocatorError;
use crate::types::{Locator, LocatorList};

/// Resolver tuning.
#[derive(Clone, Copy, Debug)]
pub struct ResolverConfig {
    /// Sleep between candidate rounds.
    pub poll_interval: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Successful resolution: the element plus which candidate won.
#[derive(Clone, Debug)]
pub struct Resolved {
    pub handle: ElementHandle,
    pub winner: usize,
    pub locator: Locator,
}

/// Tries an ordered candidate list until one matches.
pub struct Resolver {
    driver: Arc<dyn Driver>,
    cfg: ResolverConfig,
}

impl Resolver {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            cfg: ResolverConfig::default(),
        }
    }

    pub fn with_config(driver: Arc<dyn Driver>, cfg: ResolverConfig) -> Self {
        Self { driver, cfg }
    }

    pub fn driver(&self) -> Arc<dyn Driver> {
        self.driver.clone()
    }

    /// Resolve the first matching candidate within `budget`.
    ///
    /// Candidates are attempted in list order, round after round, so an
    /// earlier candidate always beats a later one inside the same round.
    /// The first round always runs to completion: failure is reported only
    /// after every candidate was attempted at least once.
    pub async fn resolve_first(
        &self,
        list: &LocatorList,
        budget: Duration,
    ) -> Result<Resolved, LocatorError> {
        if list.is_empty() {
            return Err(LocatorError::InvalidLocator(
                "empty candidate list".to_string(),
            ));
        }

        let deadline = Instant::now() + budget;
        let mut last_driver_hint: Option<String> = None;

        loop {
            for (index, candidate) in list.candidates().iter().enumerate() {
                match self
                    .driver
                    .query(candidate.strategy, &candidate.selector)
                    .await
                {
                    Ok(handles) => {
                        if let Some(handle) = handles.into_iter().next() {
                            debug!(
                                locator = %candidate,
                                winner = index,
                                "resolved element"
                            );
                            return Ok(Resolved {
                                handle,
                                winner: index,
                                locator: candidate.clone(),
                            });
                        }
                    }
                    Err(err) => {
                        warn!(locator = %candidate, %err, "query attempt failed");
                        last_driver_hint = Some(err.to_string());
                    }
                }
            }

            if Instant::now() >= deadline {
                let mut message = list.to_string();
                if let Some(hint) = last_driver_hint {
                    message.push_str(" (last driver error: ");
                    message.push_str(&hint);
                    message.push(')');
                }
                return Err(LocatorError::ElementNotFound(message));
            }
            sleep(self.cfg.poll_interval).await;
        }
    }

    /// Single-locator convenience over [`resolve_first`].
    ///
    /// [`resolve_first`]: Resolver::resolve_first
    pub async fn resolve(
        &self,
        locator: &Locator,
        budget: Duration,
    ) -> Result<Resolved, LocatorError> {
        self.resolve_first(&LocatorList::single(locator.clone()), budget)
            .await
    }

    /// One non-waiting pass over the candidates.
    pub async fn try_resolve_now(
        &self,
        list: &LocatorList,
    ) -> Result<Option<Resolved>, LocatorError> {
        match self.resolve_first(list, Duration::ZERO).await {
            Ok(resolved) => Ok(Some(resolved)),
            Err(LocatorError::ElementNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_driver::{FakeDriver, FakeElement};

    fn resolver(fake: &FakeDriver) -> Resolver {
        Resolver::with_config(
            Arc::new(fake.clone()),
            ResolverConfig {
                poll_interval: Duration::from_millis(5),
            },
        )
    }

    #[tokio::test]
    async fn first_resolvable_candidate_wins_regardless_of_position() {
        let fake = FakeDriver::new();
        fake.add_element(FakeElement::new().by_css(".icon-excel"));

        let list = LocatorList::of(vec![
            Locator::id("missing"),
            Locator::xpath("//nothing"),
            Locator::css(".icon-excel"),
        ]);
        let resolved = resolver(&fake)
            .resolve_first(&list, Duration::from_millis(200))
            .await
            .expect("third candidate resolves");
        assert_eq!(resolved.winner, 2);
        assert_eq!(resolved.locator.selector, ".icon-excel");
    }

    #[tokio::test]
    async fn earlier_candidate_beats_later_in_same_round() {
        let fake = FakeDriver::new();
        fake.add_element(FakeElement::new().by_id("primary"));
        fake.add_element(FakeElement::new().by_css(".fallback"));

        let list = LocatorList::of(vec![Locator::id("primary"), Locator::css(".fallback")]);
        let resolved = resolver(&fake)
            .resolve_first(&list, Duration::from_millis(200))
            .await
            .expect("resolves");
        assert_eq!(resolved.winner, 0);
    }

    #[tokio::test]
    async fn waits_for_element_that_appears_later() {
        let fake = FakeDriver::new();
        fake.add_element(FakeElement::new().by_id("slow").appears_after(3));

        let resolved = resolver(&fake)
            .resolve(&Locator::id("slow"), Duration::from_secs(2))
            .await
            .expect("appears within budget");
        assert_eq!(resolved.winner, 0);
    }

    #[tokio::test]
    async fn exhaustion_reports_element_not_found_after_trying_all() {
        let fake = FakeDriver::new();
        // Both candidates would match on their second attempt; a zero
        // budget still gives each exactly one try.
        fake.add_element(FakeElement::new().by_id("a").appears_after(1));
        fake.add_element(FakeElement::new().by_css(".b").appears_after(1));

        let list = LocatorList::of(vec![Locator::id("a"), Locator::css(".b")]);
        let err = resolver(&fake)
            .resolve_first(&list, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        // One more round: both were already attempted once above.
        let resolved = resolver(&fake)
            .resolve_first(&list, Duration::ZERO)
            .await
            .expect("second pass finds first candidate");
        assert_eq!(resolved.winner, 0);
    }

    #[tokio::test]
    async fn empty_list_is_invalid() {
        let fake = FakeDriver::new();
        let err = resolver(&fake)
            .resolve_first(&LocatorList::of(vec![]), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::InvalidLocator(_)));
    }

    #[tokio::test]
    async fn try_resolve_now_maps_absence_to_none() {
        let fake = FakeDriver::new();
        let list = LocatorList::single(Locator::css(".nope"));
        let outcome = resolver(&fake).try_resolve_now(&list).await.unwrap();
        assert!(outcome.is_none());
    }
}
