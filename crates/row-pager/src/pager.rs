//! Collect rows, hand them to a visitor, advance, repeat - under a hard
//! page bound.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp_driver::{ElementHandle, Strategy};
use element_locator::{Locator, LocatorList};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info};
use ui_actions::ActionExecutor;

use crate::errors::PagerError;

/// Pager tuning. `max_pages` is the safety bound against portals whose
/// "next" control never disables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PagerConfig {
    pub max_pages: u32,
    /// Grace period after advancing, while the table re-renders.
    pub settle_delay_ms: u64,
    /// Budget for locating the results table before deciding the page is
    /// empty.
    pub table_probe_timeout_ms: u64,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            settle_delay_ms: 600,
            table_probe_timeout_ms: 10_000,
        }
    }
}

/// Fallback chain for the "next page" control across the portals.
pub fn default_next_candidates() -> LocatorList {
    LocatorList::of(vec![
        Locator::css("ul.pagination li.next:not(.disabled) a"),
        Locator::css("ul.pagination li a[rel='next']"),
        Locator::css("ul.pagination li a[aria-label='Próximo'], ul.pagination li a[aria-label='Proximo']"),
        Locator::xpath(
            "//ul[contains(@class,'pagination')]//a[contains(.,'Próxima') or contains(.,'Próximo') or contains(.,'›') or contains(.,'»')]",
        ),
    ])
}

/// Outcome of one bounded traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraverseSummary {
    pub pages_visited: u32,
    /// Whether the hard bound, not the portal, ended the traversal.
    pub stopped_by_bound: bool,
}

/// Per-page callback during traversal.
#[async_trait]
pub trait PageVisitor: Send {
    /// Called once per page with the row handles currently displayed.
    /// Returning an error aborts the whole traversal; row-level problems
    /// should be swallowed here (skip the row, keep the page).
    async fn visit(&mut self, page: u32, rows: Vec<ElementHandle>) -> Result<(), PagerError>;
}

/// Pagination traversal over one results table.
pub struct Paginator {
    executor: Arc<ActionExecutor>,
    next_candidates: LocatorList,
    cfg: PagerConfig,
}

impl Paginator {
    pub fn new(executor: Arc<ActionExecutor>) -> Self {
        Self::with_config(executor, PagerConfig::default(), default_next_candidates())
    }

    pub fn with_config(
        executor: Arc<ActionExecutor>,
        cfg: PagerConfig,
        next_candidates: LocatorList,
    ) -> Self {
        Self {
            executor,
            next_candidates,
            cfg,
        }
    }

    /// Row handles of the currently displayed page. A page without a
    /// resolvable table yields an empty vector, not an error.
    pub async fn current_page_rows(
        &self,
        table: &LocatorList,
    ) -> Result<Vec<ElementHandle>, PagerError> {
        let budget = Duration::from_millis(self.cfg.table_probe_timeout_ms);
        let Ok(body) = self.executor.resolver().resolve_first(table, budget).await else {
            debug!(%table, "no results table on this page");
            return Ok(Vec::new());
        };
        self.executor
            .driver()
            .query_within(&body.handle, Strategy::Css, "tr")
            .await
            .map_err(|err| PagerError::Driver(err.to_string()))
    }

    /// Text of each `<td>` of a row.
    pub async fn row_cells(&self, row: &ElementHandle) -> Result<Vec<String>, PagerError> {
        let driver = self.executor.driver();
        let cells = driver
            .query_within(row, Strategy::Css, "td")
            .await
            .map_err(|err| map_row_error(err))?;
        let mut texts = Vec::with_capacity(cells.len());
        for cell in &cells {
            texts.push(driver.read_text(cell).await.map_err(map_row_error)?);
        }
        Ok(texts)
    }

    /// Try to activate a "next" control. Disabled or absent candidates are
    /// skipped; returns whether advancement occurred.
    pub async fn advance_page(&self) -> Result<bool, PagerError> {
        for candidate in self.next_candidates.candidates() {
            let list = LocatorList::single(candidate.clone());
            let Ok(Some(resolved)) = self.executor.resolver().try_resolve_now(&list).await else {
                continue;
            };

            let driver = self.executor.driver();
            let usable = driver
                .is_displayed(&resolved.handle)
                .await
                .unwrap_or(false)
                && driver.is_enabled(&resolved.handle).await.unwrap_or(false);
            if !usable {
                continue;
            }

            driver
                .scroll_into_view(&resolved.handle)
                .await
                .map_err(|err| PagerError::Driver(err.to_string()))?;
            self.executor
                .click_resolved(&resolved, "next page", true)
                .await?;
            sleep(Duration::from_millis(self.cfg.settle_delay_ms)).await;
            return Ok(true);
        }
        Ok(false)
    }

    /// Collect rows, visit, advance; stop when advancement fails or the
    /// configured page bound is reached - even if "advance" would keep
    /// succeeding forever.
    pub async fn traverse(
        &self,
        table: &LocatorList,
        visitor: &mut dyn PageVisitor,
    ) -> Result<TraverseSummary, PagerError> {
        let mut page = 1u32;
        let mut stopped_by_bound = false;

        loop {
            let rows = self.current_page_rows(table).await?;
            debug!(page, rows = rows.len(), "visiting page");
            visitor.visit(page, rows).await?;

            if page >= self.cfg.max_pages {
                stopped_by_bound = true;
                break;
            }
            if !self.advance_page().await? {
                break;
            }
            page += 1;
        }

        info!(pages = page, stopped_by_bound, "traversal finished");
        Ok(TraverseSummary {
            pages_visited: page,
            stopped_by_bound,
        })
    }
}

fn map_row_error(err: cdp_driver::DriverError) -> PagerError {
    if err.is_stale() {
        PagerError::StaleRow(err.to_string())
    } else {
        PagerError::Driver(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_driver::{FakeDriver, FakeEffect, FakeElement};
    use ui_actions::ActionConfig;

    fn paginator(fake: &FakeDriver, max_pages: u32) -> Paginator {
        let executor = Arc::new(ActionExecutor::with_config(
            Arc::new(fake.clone()),
            ActionConfig {
                resolve_timeout: Duration::from_millis(100),
                native_click_timeout: Duration::from_millis(20),
                poll_interval: Duration::from_millis(5),
            },
        ));
        Paginator::with_config(
            executor,
            PagerConfig {
                max_pages,
                settle_delay_ms: 1,
                table_probe_timeout_ms: 20,
            },
            default_next_candidates(),
        )
    }

    struct Recording {
        pages: Vec<u32>,
        rows_per_page: Vec<usize>,
    }

    #[async_trait]
    impl PageVisitor for Recording {
        async fn visit(&mut self, page: u32, rows: Vec<ElementHandle>) -> Result<(), PagerError> {
            self.pages.push(page);
            self.rows_per_page.push(rows.len());
            Ok(())
        }
    }

    fn table_locator() -> LocatorList {
        Locator::css("table tbody").into()
    }

    #[tokio::test]
    async fn missing_table_yields_empty_rows() {
        let fake = FakeDriver::new();
        let rows = paginator(&fake, 3)
            .current_page_rows(&table_locator())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn rows_and_cells_are_read_from_the_table() {
        let fake = FakeDriver::new();
        let body = fake.add_element(FakeElement::new().by_css("table tbody"));
        let row = fake.add_element(FakeElement::new().child_of(body).by_css("tr"));
        fake.add_element(
            FakeElement::new()
                .child_of(row)
                .by_css("td")
                .text("05/07/2025"),
        );
        fake.add_element(
            FakeElement::new()
                .child_of(row)
                .by_css("td")
                .text("ACME LTDA"),
        );

        let pager = paginator(&fake, 3);
        let rows = pager.current_page_rows(&table_locator()).await.unwrap();
        assert_eq!(rows.len(), 1);
        let cells = pager.row_cells(&rows[0]).await.unwrap();
        assert_eq!(cells, vec!["05/07/2025".to_string(), "ACME LTDA".to_string()]);
    }

    #[tokio::test]
    async fn disabled_next_control_does_not_advance() {
        let fake = FakeDriver::new();
        fake.add_element(
            FakeElement::new()
                .by_css("ul.pagination li a[rel='next']")
                .disabled(),
        );

        assert!(!paginator(&fake, 3).advance_page().await.unwrap());
    }

    #[tokio::test]
    async fn traversal_stops_at_the_bound_with_ever_clickable_next() {
        let fake = FakeDriver::new();
        fake.add_element(
            FakeElement::new()
                .by_css("ul.pagination li a[rel='next']")
                .on_click(FakeEffect::Count("next-clicks".to_string())),
        );

        let mut visitor = Recording {
            pages: Vec::new(),
            rows_per_page: Vec::new(),
        };
        let summary = paginator(&fake, 3)
            .traverse(&table_locator(), &mut visitor)
            .await
            .unwrap();

        assert_eq!(summary.pages_visited, 3);
        assert!(summary.stopped_by_bound);
        assert_eq!(visitor.pages, vec![1, 2, 3]);
        assert_eq!(fake.counter("next-clicks"), 2);
    }

    #[tokio::test]
    async fn traversal_ends_when_no_next_control_exists() {
        let fake = FakeDriver::new();
        let body = fake.add_element(FakeElement::new().by_css("table tbody"));
        fake.add_element(FakeElement::new().child_of(body).by_css("tr"));

        let mut visitor = Recording {
            pages: Vec::new(),
            rows_per_page: Vec::new(),
        };
        let summary = paginator(&fake, 10)
            .traverse(&table_locator(), &mut visitor)
            .await
            .unwrap();

        assert_eq!(summary.pages_visited, 1);
        assert!(!summary.stopped_by_bound);
        assert_eq!(visitor.rows_per_page, vec![1]);
    }
}
