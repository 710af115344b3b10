//! FSist NFe monitor: bulk export of received notes.
//!
//! Flow: manual login, set the period to the previous month, select every
//! note, save a screenshot, export the spreadsheet (renamed to a fixed
//! name), then download the XMLs+PDFs ZIP (confirming the "ciência"
//! dialog when it appears) and extract it to a fixed folder.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cdp_driver::Driver;
use download_watch::{extract_archive, replace_file, DownloadWatch, NameFilter};
use element_locator::{Locator, LocatorList};
use session_nav::{Landmark, SessionNavigator};
use task_flow::{RowRecord, RowStage, StepError, TaskPipeline, TaskReport, TaskStage};
use tracing::{info, warn};
use ui_actions::{ActionExecutor, ClickOptions, OverlayGuard};

use super::Engine;
use crate::config::FsistSection;

fn tab_recebidas() -> LocatorList {
    Locator::id("TabPageEsqNFeRecebidas").into()
}

fn periodo_span() -> LocatorList {
    Locator::id("Periodo").into()
}

fn period_triggers() -> LocatorList {
    LocatorList::of(vec![
        Locator::xpath("//*[@id='Periodo']/ancestor::*[self::div or self::button][1]"),
        Locator::xpath(
            "//*[contains(@class,'icon-calendar')]/ancestor::*[self::div or self::button][1]",
        ),
    ])
}

fn mes_passado() -> LocatorList {
    Locator::id("DataMesPassado").into()
}

fn select_all() -> LocatorList {
    Locator::id("butSelecionadosQtd").into()
}

fn report_button() -> LocatorList {
    LocatorList::of(vec![
        Locator::xpath(
            "//*[contains(@class,'icon-excel')]/ancestor::*[self::button or self::a or self::div][1]",
        ),
        Locator::xpath("//button[contains(., 'Relatório') or contains(., 'Relatorio')]"),
    ])
}

fn generate_report() -> LocatorList {
    LocatorList::of(vec![
        Locator::xpath("//button[.//i[contains(@class,'icon-excel')] and contains(., 'GERAR')]"),
        Locator::xpath(
            "//button[contains(translate(., 'ÉéÍíÓóÂâÃãÁáÊêÚúÕõÇç','EeIiOoAaAaAaEeUuOoCc'),'GERAR RELATORIO')]",
        ),
    ])
}

fn download_button() -> LocatorList {
    Locator::id("butDownload").into()
}

fn xmls_pdfs_button() -> LocatorList {
    Locator::xpath("//button[.//span[normalize-space()='XMLs e PDFs']]").into()
}

fn ciencia_button() -> LocatorList {
    Locator::xpath("//button[contains(., 'Sim, efetuar ciência da operação')]").into()
}

struct FsistCtx {
    executor: Arc<ActionExecutor>,
    guard: Arc<OverlayGuard>,
    navigator: Arc<SessionNavigator>,
    portal: FsistSection,
    download_dir: PathBuf,
    login_timeout: Duration,
    download_timeout: Duration,
    final_dir: PathBuf,
    final_print: PathBuf,
    excel_fixed: PathBuf,
    zip_path: Option<PathBuf>,
}

impl FsistCtx {
    /// Click that is allowed to fail: the portal tweaks these controls
    /// often enough that the run continues without them.
    async fn optional_click(&self, locators: &LocatorList, label: &str, budget: Duration) -> bool {
        let options = ClickOptions {
            timeout: Some(budget),
            ..ClickOptions::default()
        };
        match self.executor.click_with(locators, label, options).await {
            Ok(()) => true,
            Err(err) => {
                warn!(%label, %err, "optional control not reached, continuing");
                false
            }
        }
    }
}

/// Run the FSist received-notes task.
pub async fn run(engine: &Engine) -> TaskReport {
    let label = &engine.config.portals.fsist.final_label;
    let mut ctx = FsistCtx {
        executor: engine.executor.clone(),
        guard: engine.guard.clone(),
        navigator: engine.navigator.clone(),
        portal: engine.config.portals.fsist.clone(),
        download_dir: engine.download_dir.clone(),
        login_timeout: engine.config.engine.login_timeout(),
        download_timeout: engine.config.engine.download_timeout(),
        final_dir: engine.download_dir.join(label),
        final_print: engine.download_dir.join(format!("{label}.png")),
        excel_fixed: engine.download_dir.join(format!("{label}.xlsx")),
        zip_path: None,
    };
    let step_timeout = engine.config.engine.step_timeout();
    let login_step_timeout = ctx.login_timeout + Duration::from_secs(60);

    TaskPipeline::<FsistCtx>::new("FSist NFe recebidas")
        .step(
            TaskStage::Authenticated,
            "open portal and wait for login",
            login_step_timeout,
            |ctx, _report| {
                Box::pin(async move {
                    ctx.navigator
                        .driver()
                        .navigate(&ctx.portal.url)
                        .await
                        .map_err(|err| StepError::msg(err.to_string()))?;
                    info!("page open; log in manually if needed");
                    ctx.navigator
                        .await_authenticated(
                            &[
                                Landmark::Control(tab_recebidas()),
                                Landmark::Control(periodo_span()),
                            ],
                            ctx.login_timeout,
                        )
                        .await?;
                    Ok(())
                })
            },
        )
        .step(
            TaskStage::Filtered,
            "set previous month and select all",
            step_timeout,
            |ctx, _report| {
                Box::pin(async move {
                    ctx.guard.await_clear(Duration::from_secs(8)).await?;

                    let opened = ctx
                        .optional_click(
                            &period_triggers(),
                            "open period selector",
                            Duration::from_secs(10),
                        )
                        .await;
                    if opened {
                        ctx.executor
                            .perform_click(&mes_passado(), "apply previous month")
                            .await?;
                        match ctx.executor.read_text(&periodo_span(), "read period").await {
                            Ok(text) => info!(period = %text, "period applied"),
                            Err(err) => warn!(%err, "could not read back the period"),
                        }
                    } else {
                        warn!("period selector not opened, keeping current filter");
                    }

                    ctx.executor
                        .perform_click(&select_all(), "select all notes")
                        .await?;
                    Ok(())
                })
            },
        )
        .step(
            TaskStage::Exported,
            "screenshot and spreadsheet export",
            step_timeout,
            |ctx, report| {
                Box::pin(async move {
                    // Screenshot before any modal opens over the list.
                    ctx.executor
                        .screenshot(&ctx.final_print, "capture note list")
                        .await?;

                    if !ctx
                        .optional_click(&report_button(), "open report menu", Duration::from_secs(10))
                        .await
                    {
                        report.rows.push(RowRecord::skipped(
                            report.rows.len() + 1,
                            RowStage::SecondaryDownloadRequested,
                            "report menu not found, spreadsheet skipped",
                        ));
                        return Ok(());
                    }

                    let filter = NameFilter::with_prefix(&ctx.portal.xlsx_prefix).and_suffix(".xlsx");
                    let watch = DownloadWatch::begin(&ctx.download_dir, filter)
                        .map_err(|err| StepError::msg(err.to_string()))?;

                    if !ctx
                        .optional_click(
                            &generate_report(),
                            "generate spreadsheet",
                            Duration::from_secs(10),
                        )
                        .await
                    {
                        report.rows.push(RowRecord::skipped(
                            report.rows.len() + 1,
                            RowStage::SecondaryDownloadRequested,
                            "generate button not found, spreadsheet skipped",
                        ));
                        return Ok(());
                    }

                    match watch.await_new_file(ctx.download_timeout).await {
                        Ok(xlsx) => {
                            replace_file(&xlsx, &ctx.excel_fixed, 16, Duration::from_millis(500))
                                .await?;
                            info!(path = %ctx.excel_fixed.display(), "spreadsheet saved");
                            report.rows.push(RowRecord::recorded(
                                report.rows.len() + 1,
                                vec![
                                    ("artifact".to_string(), "spreadsheet".to_string()),
                                    (
                                        "path".to_string(),
                                        ctx.excel_fixed.display().to_string(),
                                    ),
                                ],
                            ));
                        }
                        Err(err) => {
                            warn!(%err, "spreadsheet download not detected");
                            report.rows.push(RowRecord::skipped(
                                report.rows.len() + 1,
                                RowStage::SecondaryDownloaded,
                                err.to_string(),
                            ));
                        }
                    }
                    Ok(())
                })
            },
        )
        .step(
            TaskStage::Downloaded,
            "download XMLs and PDFs zip",
            step_timeout,
            |ctx, _report| {
                Box::pin(async move {
                    let filter = NameFilter::with_prefix(&ctx.portal.zip_prefix).and_suffix(".zip");
                    let watch = DownloadWatch::begin(&ctx.download_dir, filter)
                        .map_err(|err| StepError::msg(err.to_string()))?;

                    ctx.executor
                        .perform_click(&download_button(), "open download bar")
                        .await?;

                    // First request may demand the operation-awareness
                    // confirmation; accept it and reopen the menu.
                    if ctx
                        .optional_click(
                            &ciencia_button(),
                            "confirm operation awareness",
                            Duration::from_secs(3),
                        )
                        .await
                    {
                        tokio::time::sleep(Duration::from_secs(2)).await;
                        ctx.executor
                            .perform_click(&download_button(), "reopen download bar")
                            .await?;
                    }

                    ctx.executor
                        .perform_click(&xmls_pdfs_button(), "request XMLs and PDFs")
                        .await?;

                    let zip = watch.await_new_file(ctx.download_timeout).await?;
                    info!(zip = %zip.display(), "zip downloaded");
                    ctx.zip_path = Some(zip);
                    Ok(())
                })
            },
        )
        .step(
            TaskStage::Archived,
            "extract zip to final folder",
            step_timeout,
            |ctx, report| {
                Box::pin(async move {
                    let zip = ctx
                        .zip_path
                        .clone()
                        .ok_or_else(|| StepError::msg("no zip recorded by download stage"))?;
                    extract_archive(&zip, &ctx.final_dir)?;
                    report.rows.push(RowRecord::recorded(
                        report.rows.len() + 1,
                        vec![
                            ("artifact".to_string(), "xml-pdf-archive".to_string()),
                            ("path".to_string(), ctx.final_dir.display().to_string()),
                        ],
                    ));
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
                        folder = %ctx.final_dir.display(),
                        spreadsheet = %ctx.excel_fixed.display(),
                        screenshot = %ctx.final_print.display(),
                        artifacts = report.rows_recorded(),
                        "fsist run complete"
                    );
                    Ok(())
                })
            },
        )
        .execute(&mut ctx)
        .await
}
