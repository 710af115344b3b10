//! NFS-e Nacional: per-row download of issued/received service notes.
//!
//! Each list row of the previous month gets its popover menu opened, the
//! XML downloaded and prefixed with the party name extracted from it, and
//! the DANFS-e PDF fetched under the same prefix. Pagination runs under
//! the engine's page bound; a broken row is skipped, never the page.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp_driver::{Driver, ElementHandle};
use chrono::NaiveDate;
use download_watch::{apply_prefix, DownloadWatch, NameFilter};
use element_locator::{Locator, LocatorList};
use fiscobot_core_types::ReportingPeriod;
use row_pager::{PageVisitor, PagerError, Paginator};
use session_nav::{Landmark, SessionNavigator};
use task_flow::{RowRecord, RowSkip, RowStage, StepError, TaskPipeline, TaskReport, TaskStage};
use tracing::{info, warn};
use ui_actions::{ActionExecutor, ClickOptions};

use super::Engine;
use crate::config::NfseNacionalSection;
use crate::xmlname::extract_party_names;

/// Which list the task walks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Notes issued by the company (prestados).
    Emitidas,
    /// Notes received by the company (tomados).
    Recebidas,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Emitidas => "NFS-e emitidas",
            Direction::Recebidas => "NFS-e recebidas",
        }
    }

    fn href<'a>(&self, cfg: &'a NfseNacionalSection) -> &'a str {
        match self {
            Direction::Emitidas => &cfg.emitidas_href,
            Direction::Recebidas => &cfg.recebidas_href,
        }
    }
}

fn menu_card(href: &str) -> LocatorList {
    Locator::css(&format!("a[href=\"{href}\"]")).into()
}

fn row_menu_triggers() -> [Locator; 2] {
    [
        Locator::css("a.icone-trigger"),
        Locator::css(".glyphicon.glyphicon-option-vertical"),
    ]
}

fn popover() -> LocatorList {
    Locator::css(".popover .popover-content").into()
}

fn xml_link() -> LocatorList {
    Locator::css("div.popover-content a[href*=\"/EmissorNacional/Notas/Download/NFSe/\"]").into()
}

fn danfse_link() -> LocatorList {
    Locator::css("div.popover-content a[href*=\"/EmissorNacional/Notas/Download/DANFSe/\"]").into()
}

fn results_table() -> LocatorList {
    Locator::css("table tbody").into()
}

fn parse_br_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%d/%m/%Y").ok()
}

struct NfseCtx {
    driver: Arc<dyn Driver>,
    executor: Arc<ActionExecutor>,
    navigator: Arc<SessionNavigator>,
    paginator: Arc<Paginator>,
    portal: NfseNacionalSection,
    direction: Direction,
    period: ReportingPeriod,
    download_dir: PathBuf,
    login_timeout: Duration,
    artifact_timeout: Duration,
}

impl NfseCtx {
    async fn open_row_menu(&self, row: &ElementHandle) -> Result<(), RowSkip> {
        let mut trigger = None;
        for locator in row_menu_triggers() {
            let found = self
                .driver
                .query_within(row, locator.strategy, &locator.selector)
                .await
                .map_err(|err| RowSkip::at(RowStage::MenuOpened, err.to_string()))?;
            if let Some(handle) = found.into_iter().next() {
                trigger = Some(handle);
                break;
            }
        }
        let Some(trigger) = trigger else {
            return Err(RowSkip::at(RowStage::MenuOpened, "row has no menu trigger"));
        };

        self.driver
            .scroll_into_view(&trigger)
            .await
            .map_err(|err| RowSkip::at(RowStage::MenuOpened, err.to_string()))?;
        if self.driver.click_native(&trigger).await.is_err() {
            self.driver
                .click_script(&trigger)
                .await
                .map_err(|err| RowSkip::at(RowStage::MenuOpened, err.to_string()))?;
        }

        self.executor
            .resolver()
            .resolve_first(&popover(), Duration::from_secs(8))
            .await
            .map_err(|err| RowSkip::at(RowStage::MenuOpened, err.to_string()))?;
        Ok(())
    }

    async fn download_via_menu(
        &self,
        link: &LocatorList,
        suffix: &str,
        label: &str,
        requested_stage: RowStage,
        downloaded_stage: RowStage,
    ) -> Result<PathBuf, RowSkip> {
        let watch = DownloadWatch::begin(&self.download_dir, NameFilter::with_suffix(suffix))
            .map_err(|err| RowSkip::at(requested_stage, err.to_string()))?;
        let options = ClickOptions {
            timeout: Some(Duration::from_secs(25)),
            ..ClickOptions::default()
        };
        self.executor
            .click_with(link, label, options)
            .await
            .map_err(|err| RowSkip::at(requested_stage, err.to_string()))?;
        watch
            .await_new_file(self.artifact_timeout)
            .await
            .map_err(|err| RowSkip::at(downloaded_stage, err.to_string()))
    }

    /// The per-row sub-machine: menu, XML, prefix, DANFS-e.
    async fn process_row(
        &self,
        row: &ElementHandle,
        cells: &[String],
    ) -> Result<Vec<(String, String)>, RowSkip> {
        self.open_row_menu(row).await?;

        let xml_path = self
            .download_via_menu(
                &xml_link(),
                ".xml",
                "download XML",
                RowStage::PrimaryDownloadRequested,
                RowStage::PrimaryDownloaded,
            )
            .await?;

        let xml_body = std::fs::read_to_string(&xml_path).unwrap_or_default();
        let names = extract_party_names(&xml_body);
        let prefix = match self.direction {
            Direction::Emitidas => names.emitted_prefix(),
            Direction::Recebidas => names.received_prefix(),
        };
        let xml_final = match apply_prefix(&xml_path, &prefix) {
            Ok(renamed) => renamed,
            Err(err) => {
                warn!(%err, "keeping XML under its original name");
                xml_path
            }
        };
        info!(xml = %xml_final.display(), "XML archived");

        // The DANFS-e is best-effort: a missing PDF does not skip the row.
        let danfse = match self.open_row_menu(row).await {
            Ok(()) => {
                match self
                    .download_via_menu(
                        &danfse_link(),
                        ".pdf",
                        "download DANFS-e",
                        RowStage::SecondaryDownloadRequested,
                        RowStage::SecondaryDownloaded,
                    )
                    .await
                {
                    Ok(pdf_path) => match apply_prefix(&pdf_path, &prefix) {
                        Ok(renamed) => renamed.display().to_string(),
                        Err(_) => pdf_path.display().to_string(),
                    },
                    Err(skip) => {
                        warn!(reason = %skip.reason, "DANFS-e not downloaded");
                        "missing".to_string()
                    }
                }
            }
            Err(skip) => {
                warn!(reason = %skip.reason, "menu did not reopen for the DANFS-e");
                "missing".to_string()
            }
        };

        let mut fields = vec![
            ("emissao".to_string(), cells.first().cloned().unwrap_or_default()),
            ("empresa".to_string(), cells.get(1).cloned().unwrap_or_default()),
            ("competencia".to_string(), cells.get(2).cloned().unwrap_or_default()),
            ("municipio".to_string(), cells.get(3).cloned().unwrap_or_default()),
            ("preco".to_string(), cells.get(4).cloned().unwrap_or_default()),
            ("situacao".to_string(), cells.get(5).cloned().unwrap_or_default()),
        ];
        fields.push(("prefixo".to_string(), prefix));
        fields.push(("xml".to_string(), xml_final.display().to_string()));
        fields.push(("danfse".to_string(), danfse));
        Ok(fields)
    }
}

struct RowsVisitor<'a> {
    ctx: &'a NfseCtx,
    report: &'a mut TaskReport,
}

#[async_trait]
impl PageVisitor for RowsVisitor<'_> {
    async fn visit(&mut self, page: u32, rows: Vec<ElementHandle>) -> Result<(), PagerError> {
        let mut matched = 0usize;
        for row in rows {
            let cells = match self.ctx.paginator.row_cells(&row).await {
                Ok(cells) => cells,
                Err(err) => {
                    warn!(%err, "row unreadable, skipping");
                    continue;
                }
            };
            if cells.len() < 2 {
                continue;
            }
            let Some(emission) = parse_br_date(&cells[0]) else {
                continue;
            };
            if !self.ctx.period.contains(emission) {
                continue;
            }

            matched += 1;
            let index = self.report.rows.len() + 1;
            info!(page, row = index, empresa = %cells[1], "processing row");
            match self.ctx.process_row(&row, &cells).await {
                Ok(fields) => self.report.rows.push(RowRecord::recorded(index, fields)),
                Err(skip) => {
                    warn!(row = index, stage = %skip.stage, reason = %skip.reason, "row skipped");
                    self.report
                        .rows
                        .push(RowRecord::skipped(index, skip.stage, skip.reason));
                }
            }
        }
        info!(page, matched, "page processed");
        Ok(())
    }
}

/// Run one direction of the NFS-e Nacional portal.
pub async fn run(engine: &Engine, direction: Direction) -> TaskReport {
    let mut ctx = NfseCtx {
        driver: engine.driver.clone(),
        executor: engine.executor.clone(),
        navigator: engine.navigator.clone(),
        paginator: engine.paginator.clone(),
        portal: engine.config.portals.nfse_nacional.clone(),
        direction,
        period: engine.period,
        download_dir: engine.download_dir.clone(),
        login_timeout: engine.config.engine.login_timeout(),
        artifact_timeout: Duration::from_secs(60),
    };
    let step_timeout = engine.config.engine.step_timeout();
    let login_step_timeout = ctx.login_timeout + Duration::from_secs(60);

    TaskPipeline::<NfseCtx>::new(direction.label())
        .step(
            TaskStage::Authenticated,
            "open portal and wait for login",
            login_step_timeout,
            |ctx, _report| {
                Box::pin(async move {
                    ctx.driver
                        .navigate(&ctx.portal.login_url)
                        .await
                        .map_err(|err| StepError::msg(err.to_string()))?;
                    info!("log in manually (certificate or account)");
                    ctx.navigator
                        .await_authenticated(
                            &[
                                Landmark::UrlContains(ctx.portal.home_path.clone()),
                                Landmark::Control(menu_card(&ctx.portal.emitidas_href)),
                            ],
                            ctx.login_timeout,
                        )
                        .await?;

                    let url = ctx
                        .driver
                        .current_url()
                        .await
                        .map_err(|err| StepError::msg(err.to_string()))?;
                    if !url.contains(&ctx.portal.home_path) {
                        ctx.driver
                            .navigate(&ctx.portal.home_url)
                            .await
                            .map_err(|err| StepError::msg(err.to_string()))?;
                    }
                    Ok(())
                })
            },
        )
        .step(
            TaskStage::Navigated,
            "open the notes list",
            step_timeout,
            |ctx, _report| {
                Box::pin(async move {
                    let href = ctx.direction.href(&ctx.portal).to_string();
                    ctx.executor
                        .perform_click(&menu_card(&href), ctx.direction.label())
                        .await?;
                    if let Err(err) = ctx
                        .navigator
                        .await_landmark(
                            &Landmark::UrlContains(href),
                            Duration::from_secs(25),
                        )
                        .await
                    {
                        warn!(%err, "list URL not confirmed, proceeding anyway");
                    }
                    Ok(())
                })
            },
        )
        .step(
            TaskStage::Downloaded,
            "walk rows across pages",
            step_timeout,
            |ctx, report| {
                Box::pin(async move {
                    let paginator = ctx.paginator.clone();
                    let mut visitor = RowsVisitor { ctx: &*ctx, report };
                    let summary = paginator
                        .traverse(&results_table(), &mut visitor)
                        .await
                        .map_err(StepError::from)?;
                    if summary.stopped_by_bound {
                        warn!(
                            pages = summary.pages_visited,
                            "pagination stopped by the safety bound"
                        );
                    }
                    Ok(())
                })
            },
        )
        .step(
            TaskStage::Reported,
            "summarize outcome",
            Duration::from_secs(30),
            |ctx, report| {
                Box::pin(async move {
                    info!(
                        direction = ctx.direction.label(),
                        period = %ctx.period.slug(),
                        recorded = report.rows_recorded(),
                        skipped = report.rows_skipped(),
                        "row walk complete"
                    );
                    Ok(())
                })
            },
        )
        .execute(&mut ctx)
        .await
}
