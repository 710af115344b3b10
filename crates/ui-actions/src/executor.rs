//! Resolve-then-act execution with native-to-script fallback.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cdp_driver::{Driver, SelectChoice};
use element_locator::{LocatorList, Resolved, Resolver, ResolverConfig};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::errors::ActionError;
use crate::textmatch::{contains_folded, fold_pt};

/// Executor tuning.
#[derive(Clone, Copy, Debug)]
pub struct ActionConfig {
    /// Budget for locator resolution per action.
    pub resolve_timeout: Duration,
    /// Window for the native click before the script fallback kicks in.
    pub native_click_timeout: Duration,
    /// Sleep between click retries inside the native window.
    pub poll_interval: Duration,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            resolve_timeout: Duration::from_secs(50),
            native_click_timeout: Duration::from_secs(4),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Per-click options.
#[derive(Clone, Copy, Debug)]
pub struct ClickOptions {
    pub scroll_into_view: bool,
    pub prefer_native: bool,
    /// Override of the resolve budget for this click.
    pub timeout: Option<Duration>,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            scroll_into_view: true,
            prefer_native: true,
            timeout: None,
        }
    }
}

/// Stateless action executor: resolve, act, log the label, report the
/// typed outcome. Holds no state machine of its own; effects are only
/// observable through subsequent DOM state.
pub struct ActionExecutor {
    driver: Arc<dyn Driver>,
    resolver: Resolver,
    cfg: ActionConfig,
}

impl ActionExecutor {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self::with_config(driver, ActionConfig::default())
    }

    pub fn with_config(driver: Arc<dyn Driver>, cfg: ActionConfig) -> Self {
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

    pub fn driver(&self) -> Arc<dyn Driver> {
        self.driver.clone()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn config(&self) -> &ActionConfig {
        &self.cfg
    }

    /// Resolve and click with the default options.
    pub async fn perform_click(
        &self,
        locators: &LocatorList,
        label: &str,
    ) -> Result<(), ActionError> {
        self.click_with(locators, label, ClickOptions::default())
            .await
    }

    /// Resolve and click. Native first within a short window, script
    /// dispatch as fallback; both attempts target the same resolved
    /// element. Staleness in between surfaces as
    /// [`ActionError::StaleElement`] for the caller to re-resolve.
    pub async fn click_with(
        &self,
        locators: &LocatorList,
        label: &str,
        options: ClickOptions,
    ) -> Result<(), ActionError> {
        let budget = options.timeout.unwrap_or(self.cfg.resolve_timeout);
        let resolved = self.resolver.resolve_first(locators, budget).await?;
        if options.scroll_into_view {
            self.driver
                .scroll_into_view(&resolved.handle)
                .await
                .map_err(|err| ActionError::from_driver(err, label))?;
        }
        self.click_resolved(&resolved, label, options.prefer_native)
            .await
    }

    /// Click an element resolved earlier (row menus get re-clicked without
    /// re-running the fallback chain).
    pub async fn click_resolved(
        &self,
        resolved: &Resolved,
        label: &str,
        prefer_native: bool,
    ) -> Result<(), ActionError> {
        if prefer_native {
            let deadline = Instant::now() + self.cfg.native_click_timeout;
            loop {
                match self.driver.click_native(&resolved.handle).await {
                    Ok(()) => {
                        info!(%label, locator = %resolved.locator, "clicked");
                        return Ok(());
                    }
                    Err(err) if err.is_stale() => {
                        return Err(ActionError::from_driver(err, label));
                    }
                    Err(err) if err.is_not_interactable() && Instant::now() < deadline => {
                        debug!(%label, %err, "native click not ready, retrying");
                        sleep(self.cfg.poll_interval).await;
                    }
                    Err(err) => {
                        warn!(%label, %err, "native click failed, falling back to script");
                        break;
                    }
                }
            }
        }

        self.driver
            .click_script(&resolved.handle)
            .await
            .map_err(|err| ActionError::from_driver(err, label))?;
        info!(%label, locator = %resolved.locator, "clicked (script)");
        Ok(())
    }

    /// Resolve an input and type into it, clearing any existing value.
    pub async fn type_text(
        &self,
        locators: &LocatorList,
        text: &str,
        label: &str,
    ) -> Result<(), ActionError> {
        let resolved = self
            .resolver
            .resolve_first(locators, self.cfg.resolve_timeout)
            .await?;
        self.driver
            .type_text(&resolved.handle, text, true)
            .await
            .map_err(|err| ActionError::from_driver(err, label))?;
        info!(%label, "typed");
        Ok(())
    }

    /// Resolve an element and read its visible text.
    pub async fn read_text(
        &self,
        locators: &LocatorList,
        label: &str,
    ) -> Result<String, ActionError> {
        let resolved = self
            .resolver
            .resolve_first(locators, self.cfg.resolve_timeout)
            .await?;
        let text = self
            .driver
            .read_text(&resolved.handle)
            .await
            .map_err(|err| ActionError::from_driver(err, label))?;
        debug!(%label, chars = text.len(), "read text");
        Ok(text)
    }

    /// Capture the visible page to `path`.
    pub async fn screenshot(&self, path: &Path, label: &str) -> Result<(), ActionError> {
        self.driver
            .screenshot(path)
            .await
            .map_err(|err| ActionError::from_driver(err, label))?;
        info!(%label, path = %path.display(), "screenshot saved");
        Ok(())
    }

    /// Pick a `<select>` option by visible text, tolerating the accent and
    /// case drift between portals. Matching order: exact text, exact value,
    /// folded containment, then a numeric ordinal value (`3` / `03`).
    pub async fn select_option_flexible(
        &self,
        locators: &LocatorList,
        wanted_text: &str,
        ordinal: Option<u32>,
        label: &str,
    ) -> Result<(), ActionError> {
        let resolved = self
            .resolver
            .resolve_first(locators, self.cfg.resolve_timeout)
            .await?;
        let options = self
            .driver
            .select_options(&resolved.handle)
            .await
            .map_err(|err| ActionError::from_driver(err, label))?;

        let chosen = options
            .iter()
            .find(|opt| fold_pt(&opt.text) == fold_pt(wanted_text))
            .or_else(|| options.iter().find(|opt| opt.value == wanted_text))
            .or_else(|| {
                options
                    .iter()
                    .find(|opt| contains_folded(&opt.text, wanted_text))
            })
            .or_else(|| {
                ordinal.and_then(|n| {
                    options
                        .iter()
                        .find(|opt| opt.value == n.to_string() || opt.value == format!("{n:02}"))
                })
            });

        let Some(option) = chosen else {
            return Err(ActionError::OptionNotFound(format!(
                "{label}: no option matches '{wanted_text}'"
            )));
        };

        let applied = self
            .driver
            .select_option(&resolved.handle, &SelectChoice::Index(option.index))
            .await
            .map_err(|err| ActionError::from_driver(err, label))?;
        if !applied {
            return Err(ActionError::OptionNotFound(format!(
                "{label}: option '{}' vanished before selection",
                option.text
            )));
        }
        info!(%label, option = %option.text, "selected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_driver::{FakeDriver, FakeEffect, FakeElement};
    use element_locator::Locator;

    fn executor(fake: &FakeDriver) -> ActionExecutor {
        ActionExecutor::with_config(
            Arc::new(fake.clone()),
            ActionConfig {
                resolve_timeout: Duration::from_millis(200),
                native_click_timeout: Duration::from_millis(30),
                poll_interval: Duration::from_millis(5),
            },
        )
    }

    #[tokio::test]
    async fn click_uses_native_path_when_it_works() {
        let fake = FakeDriver::new();
        fake.add_element(
            FakeElement::new()
                .by_id("butDownload")
                .on_click(FakeEffect::Count("clicks".to_string())),
        );

        executor(&fake)
            .perform_click(&Locator::id("butDownload").into(), "open download bar")
            .await
            .expect("click succeeds");
        assert_eq!(fake.counter("clicks"), 1);
    }

    #[tokio::test]
    async fn click_falls_back_to_script_dispatch() {
        let fake = FakeDriver::new();
        fake.add_element(
            FakeElement::new()
                .by_css("#obscured")
                .native_click_fails()
                .on_click(FakeEffect::Count("clicks".to_string())),
        );

        executor(&fake)
            .perform_click(&Locator::css("#obscured").into(), "click obscured control")
            .await
            .expect("script fallback lands");
        assert_eq!(fake.counter("clicks"), 1);
    }

    #[tokio::test]
    async fn staleness_between_resolve_and_click_is_surfaced() {
        let fake = FakeDriver::new();
        let index = fake.add_element(FakeElement::new().by_css("#row-menu"));
        let exec = executor(&fake);
        let resolved = exec
            .resolver()
            .resolve(&Locator::css("#row-menu"), Duration::from_millis(100))
            .await
            .unwrap();

        fake.remove(index);
        let err = exec
            .click_resolved(&resolved, "open row menu", true)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::StaleElement(_)));
    }

    #[tokio::test]
    async fn missing_control_reports_element_not_found() {
        let fake = FakeDriver::new();
        let err = executor(&fake)
            .perform_click(&Locator::id("nope").into(), "never there")
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::ElementNotFound(_)));
    }

    #[tokio::test]
    async fn type_text_clears_existing_value() {
        let fake = FakeDriver::new();
        let index = fake.add_element(
            FakeElement::new()
                .by_xpath("//input[contains(@id,'DataInicial')]")
                .attr("value", "01/01/2000"),
        );

        executor(&fake)
            .type_text(
                &Locator::xpath("//input[contains(@id,'DataInicial')]").into(),
                "01/07/2025",
                "fill start date",
            )
            .await
            .unwrap();
        assert_eq!(fake.typed_value(index).as_deref(), Some("01/07/2025"));
    }

    #[tokio::test]
    async fn select_matches_accented_month_names() {
        let fake = FakeDriver::new();
        let index = fake.add_element(
            FakeElement::new()
                .by_css("select#mes")
                .option("01", "Janeiro")
                .option("02", "Fevereiro")
                .option("03", "Março"),
        );

        executor(&fake)
            .select_option_flexible(
                &Locator::css("select#mes").into(),
                "marco",
                Some(3),
                "pick month",
            )
            .await
            .unwrap();
        assert_eq!(fake.selected_index(index), Some(2));
    }

    #[tokio::test]
    async fn select_falls_back_to_ordinal_value() {
        let fake = FakeDriver::new();
        let index = fake.add_element(
            FakeElement::new()
                .by_css("select#mes")
                .option("01", "1º mês")
                .option("02", "2º mês"),
        );

        executor(&fake)
            .select_option_flexible(
                &Locator::css("select#mes").into(),
                "fevereiro",
                Some(2),
                "pick month",
            )
            .await
            .unwrap();
        assert_eq!(fake.selected_index(index), Some(1));
    }

    #[tokio::test]
    async fn select_reports_option_not_found() {
        let fake = FakeDriver::new();
        fake.add_element(FakeElement::new().by_css("select#ano").option("2024", "2024"));

        let err = executor(&fake)
            .select_option_flexible(
                &Locator::css("select#ano").into(),
                "1999",
                None,
                "pick year",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::OptionNotFound(_)));
    }
}
