//! Osasco NFS-e: note exports, fiscal books, ISS payment slip.
//!
//! The portal is an ASP.NET maze of alert dialogs, hover menus, popup
//! windows and the occasional iframe. Every section runs best-effort and
//! records its own outcome; only authentication failure kills the task.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cdp_driver::Driver;
use download_watch::{replace_file, sanitize_component, DownloadWatch, NameFilter};
use element_locator::{Locator, LocatorList};
use fiscobot_core_types::{period::pt_br_month_name, ReportingPeriod};
use once_cell::sync::Lazy;
use regex::Regex;
use session_nav::{Landmark, SessionNavigator, WindowChange, WindowSnapshot};
use task_flow::{RowRecord, RowSkip, RowStage, StepError, TaskPipeline, TaskReport, TaskStage};
use tracing::{info, warn};
use ui_actions::{ActionExecutor, ClickOptions, OverlayGuard};

use super::Engine;
use crate::config::OsascoSection;

static CONTRIBUINTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)Contribuinte:\s*(.+?)(?:\s+(?:CPF/?CNPJ|CNPJ|CPF)\b|$)")
        .expect("contribuinte pattern compiles")
});

fn notas_fiscais_link() -> LocatorList {
    Locator::link_text("Notas Fiscais").into()
}

fn home_link() -> LocatorList {
    Locator::link_text("Início").into()
}

fn export_screen_links() -> LocatorList {
    LocatorList::of(vec![
        Locator::link_text("Exportar Notas para Arquivo"),
        Locator::partial_link_text("Exportar Notas"),
    ])
}

fn radio_for(label: &str) -> LocatorList {
    Locator::xpath(&format!(
        "//input[@type='radio' and (following-sibling::*[contains(.,'{label}')])]"
    ))
    .into()
}

fn date_input(kind: &str) -> LocatorList {
    Locator::xpath(&format!(
        "//input[contains(@id,'Data{kind}') or contains(@id,'txtData{kind}') or contains(@id,'dt{kind}')]"
    ))
    .into()
}

fn hour_inputs() -> [(LocatorList, &'static str); 2] {
    [
        (
            Locator::xpath("//input[contains(@id,'HoraInicial') or contains(@id,'txtHoraInicial') or contains(@id,'HoraIni')]").into(),
            "00:00",
        ),
        (
            Locator::xpath("//input[contains(@id,'HoraFinal') or contains(@id,'txtHoraFinal') or contains(@id,'HoraFim')]").into(),
            "23:59",
        ),
    ]
}

fn generate_submit() -> LocatorList {
    Locator::xpath(
        "//input[@type='submit' and (contains(@value,'Gerar Arquivo') or contains(@value,'Gerar'))]",
    )
    .into()
}

fn book_generate() -> LocatorList {
    LocatorList::of(vec![
        Locator::xpath("//input[@type='submit' and (contains(@value,'Gerar') or contains(@id,'Gerar'))]"),
        Locator::xpath("//button[contains(.,'Gerar')]"),
    ])
}

fn year_selects() -> LocatorList {
    LocatorList::of(vec![
        Locator::xpath("//label[contains(.,'Exerc')]/following::select[1]"),
        Locator::xpath("//span[contains(.,'Exerc')]/following::select[1]"),
        Locator::xpath("//td[contains(.,'Exerc')]/following::select[1]"),
        Locator::xpath("//select[contains(@id,'Exercicio') or contains(@name,'Exercicio')]"),
        Locator::xpath("(//select)[1]"),
    ])
}

fn month_selects() -> LocatorList {
    LocatorList::of(vec![
        Locator::xpath("//label[contains(.,'Mês') or contains(.,'Mes')]/following::select[1]"),
        Locator::xpath("//span[contains(.,'Mês') or contains(.,'Mes')]/following::select[1]"),
        Locator::xpath("//td[contains(.,'Mês') or contains(.,'Mes')]/following::select[1]"),
        Locator::xpath("//select[contains(@id,'Mes') or contains(@name,'Mes')]"),
        Locator::xpath("(//select)[2]"),
    ])
}

fn search_button() -> LocatorList {
    Locator::xpath(
        "//input[@type='submit' and @value='Pesquisar'] | //button[normalize-space()='Pesquisar'] | //a[normalize-space()='Pesquisar']",
    )
    .into()
}

fn print_button() -> LocatorList {
    Locator::xpath(
        "//input[@type='submit' and @value='Imprimir'] | //button[normalize-space()='Imprimir'] | //a[normalize-space()='Imprimir']",
    )
    .into()
}

fn body() -> LocatorList {
    Locator::css("body").into()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ExportDirection {
    Emitidas,
    Recebidas,
}

impl ExportDirection {
    fn radio_label(&self) -> &'static str {
        match self {
            ExportDirection::Emitidas => "Emitidas pela minha Empresa",
            ExportDirection::Recebidas => "Recebidas pela minha Empresa",
        }
    }

    fn file_label(&self) -> &'static str {
        match self {
            ExportDirection::Emitidas => "notas emitidas",
            ExportDirection::Recebidas => "notas recebidas",
        }
    }

    fn section(&self) -> &'static str {
        match self {
            ExportDirection::Emitidas => "exportacao-emitidas",
            ExportDirection::Recebidas => "exportacao-recebidas",
        }
    }
}

struct OsascoCtx {
    driver: Arc<dyn Driver>,
    executor: Arc<ActionExecutor>,
    guard: Arc<OverlayGuard>,
    navigator: Arc<SessionNavigator>,
    portal: OsascoSection,
    period: ReportingPeriod,
    download_dir: PathBuf,
    login_timeout: Duration,
    company: String,
}

impl OsascoCtx {
    async fn clear_ui(&self) {
        if let Err(err) = self.guard.await_clear(Duration::from_secs(8)).await {
            warn!(%err, "overlay check failed");
        }
        if let Err(err) = self.guard.dismiss_modals(4).await {
            warn!(%err, "modal dismissal failed");
        }
    }

    async fn optional_click(&self, locators: &LocatorList, label: &str, budget: Duration) -> bool {
        let options = ClickOptions {
            timeout: Some(budget),
            ..ClickOptions::default()
        };
        match self.executor.click_with(locators, label, options).await {
            Ok(()) => true,
            Err(err) => {
                warn!(%label, %err, "optional control not reached");
                false
            }
        }
    }

    async fn go_home(&self) {
        self.optional_click(&home_link(), "back to home", Duration::from_secs(5))
            .await;
        self.clear_ui().await;
    }

    fn record(&self, report: &mut TaskReport, section: &str, fields: Vec<(String, String)>) {
        let index = report.rows.len() + 1;
        let mut all = vec![("section".to_string(), section.to_string())];
        all.extend(fields);
        report.rows.push(RowRecord::recorded(index, all));
    }

    fn record_skip(&self, report: &mut TaskReport, skip: RowSkip) {
        let index = report.rows.len() + 1;
        warn!(stage = %skip.stage, reason = %skip.reason, "section skipped");
        report
            .rows
            .push(RowRecord::skipped(index, skip.stage, skip.reason));
    }

    async fn detect_company(&mut self) {
        let text = match self.executor.read_text(&body(), "read page body").await {
            Ok(text) => text,
            Err(err) => {
                warn!(%err, "body text unavailable, using default company name");
                return;
            }
        };
        if let Some(captures) = CONTRIBUINTE.captures(&text) {
            let name = sanitize_component(captures[1].trim());
            if !name.is_empty() {
                self.company = name;
            }
        }
        info!(company = %self.company, "taxpayer detected");
    }

    async fn open_export_screen(&self) -> Result<(), RowSkip> {
        self.clear_ui().await;
        self.executor
            .perform_click(&notas_fiscais_link(), "open Notas Fiscais")
            .await
            .map_err(|err| RowSkip::at(RowStage::RowFound, err.to_string()))?;
        self.clear_ui().await;
        self.executor
            .perform_click(&export_screen_links(), "open export screen")
            .await
            .map_err(|err| RowSkip::at(RowStage::RowFound, err.to_string()))?;
        self.clear_ui().await;
        Ok(())
    }

    async fn fill_period(&self) -> Result<(), RowSkip> {
        let start = ReportingPeriod::format_br(self.period.first_day);
        let end = ReportingPeriod::format_br(self.period.last_day);
        self.executor
            .type_text(&date_input("Inicial"), &start, "fill start date")
            .await
            .map_err(|err| RowSkip::at(RowStage::RowFound, err.to_string()))?;
        self.executor
            .type_text(&date_input("Final"), &end, "fill end date")
            .await
            .map_err(|err| RowSkip::at(RowStage::RowFound, err.to_string()))?;
        for (locator, value) in hour_inputs() {
            if let Err(err) = self.executor.type_text(&locator, value, "fill hour").await {
                warn!(%err, "hour input not filled");
            }
        }
        Ok(())
    }

    /// One export format (PDF or XML) for one direction.
    async fn export_format(
        &self,
        direction: ExportDirection,
        format_label: &str,
        suffixes: &[&str],
        report: &mut TaskReport,
    ) {
        let section = direction.section();
        self.optional_click(
            &radio_for(format_label),
            &format!("mark {format_label}"),
            Duration::from_secs(12),
        )
        .await;

        let mut filter = NameFilter::any();
        for suffix in suffixes {
            filter = filter.and_suffix(*suffix);
        }
        let watch = match DownloadWatch::begin(&self.download_dir, filter) {
            Ok(watch) => watch,
            Err(err) => {
                self.record_skip(
                    report,
                    RowSkip::at(RowStage::PrimaryDownloadRequested, err.to_string()),
                );
                return;
            }
        };

        if let Err(err) = self
            .executor
            .perform_click(&generate_submit(), "generate export file")
            .await
        {
            self.record_skip(
                report,
                RowSkip::at(RowStage::PrimaryDownloadRequested, err.to_string()),
            );
            return;
        }

        // A modal right after submitting means "no notes in the period".
        match self.guard.dismiss_modals(4).await {
            Ok(dismissed) if dismissed > 0 => {
                info!(section, format_label, "portal reports no notes in the period");
                self.record(
                    report,
                    section,
                    vec![
                        ("formato".to_string(), format_label.to_string()),
                        ("resultado".to_string(), "sem notas".to_string()),
                    ],
                );
                return;
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "modal sweep failed after submit"),
        }

        match watch.await_new_file(Duration::from_secs(180)).await {
            Ok(path) => {
                let extension = path
                    .extension()
                    .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
                    .unwrap_or_default();
                let dest = self.download_dir.join(format!(
                    "{}_{}{}",
                    self.company,
                    direction.file_label(),
                    extension
                ));
                match replace_file(&path, &dest, 16, Duration::from_millis(500)).await {
                    Ok(()) => {
                        info!(file = %dest.display(), "export saved");
                        self.record(
                            report,
                            section,
                            vec![
                                ("formato".to_string(), format_label.to_string()),
                                ("arquivo".to_string(), dest.display().to_string()),
                            ],
                        );
                    }
                    Err(err) => {
                        warn!(%err, "export kept under its original name");
                        self.record(
                            report,
                            section,
                            vec![
                                ("formato".to_string(), format_label.to_string()),
                                ("arquivo".to_string(), path.display().to_string()),
                            ],
                        );
                    }
                }
            }
            Err(err) => {
                self.record_skip(
                    report,
                    RowSkip::at(RowStage::PrimaryDownloaded, err.to_string()),
                );
            }
        }
    }

    async fn export_direction(&self, direction: ExportDirection, report: &mut TaskReport) {
        if let Err(skip) = self.open_export_screen().await {
            self.record_skip(report, skip);
            return;
        }
        self.optional_click(
            &radio_for("Data de Emissão"),
            "mark emission-date filter",
            Duration::from_secs(12),
        )
        .await;
        self.optional_click(
            &radio_for(direction.radio_label()),
            direction.radio_label(),
            Duration::from_secs(12),
        )
        .await;
        if let Err(skip) = self.fill_period().await {
            self.record_skip(report, skip);
            return;
        }

        self.export_format(direction, "PDF", &[".pdf", ".zip"], report)
            .await;
        self.export_format(direction, "XML", &[".xml", ".zip"], report)
            .await;
    }

    async fn select_period(&self) -> Result<(), RowSkip> {
        self.executor
            .select_option_flexible(
                &year_selects(),
                &self.period.year().to_string(),
                None,
                "pick exercise year",
            )
            .await
            .map_err(|err| RowSkip::at(RowStage::RowFound, err.to_string()))?;
        let month = self.period.month();
        self.executor
            .select_option_flexible(
                &month_selects(),
                pt_br_month_name(month),
                Some(month),
                "pick month",
            )
            .await
            .map_err(|err| RowSkip::at(RowStage::RowFound, err.to_string()))?;
        Ok(())
    }

    /// Wait for the book/slip PDF, which may arrive via a popup window.
    /// `prior` must have been snapshotted before the triggering click.
    async fn collect_pdf_download(
        &self,
        watch: DownloadWatch,
        prior: &WindowSnapshot,
        budget: Duration,
    ) -> Result<PathBuf, RowSkip> {
        match self
            .navigator
            .follow_new_window(prior, Duration::from_secs(8))
            .await
            .map_err(|err| RowSkip::at(RowStage::PrimaryDownloadRequested, err.to_string()))?
        {
            WindowChange::NewWindow(guard) => {
                let found = watch.await_new_file(budget).await;
                if let Err(err) = guard.close_and_restore().await {
                    warn!(%err, "spawned window not fully restored");
                }
                found.map_err(|err| RowSkip::at(RowStage::PrimaryDownloaded, err.to_string()))
            }
            _ => watch
                .await_new_file(Duration::from_secs(40))
                .await
                .map_err(|err| RowSkip::at(RowStage::PrimaryDownloaded, err.to_string())),
        }
    }

    async fn generate_book(
        &self,
        type_label: &str,
        file_label: &str,
    ) -> Result<Vec<(String, String)>, RowSkip> {
        self.go_home().await;
        self.optional_click(
            &Locator::link_text("Relatórios").into(),
            "open reports menu",
            Duration::from_secs(10),
        )
        .await;
        self.executor
            .perform_click(
                &Locator::partial_link_text("Livro Fiscal").into(),
                "open fiscal book",
            )
            .await
            .map_err(|err| RowSkip::at(RowStage::RowFound, err.to_string()))?;
        self.clear_ui().await;

        self.select_period().await?;
        self.optional_click(
            &radio_for(type_label),
            type_label,
            Duration::from_secs(12),
        )
        .await;
        self.optional_click(&radio_for("PDF"), "mark PDF output", Duration::from_secs(8))
            .await;

        let watch = DownloadWatch::begin(&self.download_dir, NameFilter::with_suffix(".pdf"))
            .map_err(|err| RowSkip::at(RowStage::PrimaryDownloadRequested, err.to_string()))?;
        let prior = self
            .navigator
            .snapshot_windows()
            .await
            .map_err(|err| RowSkip::at(RowStage::PrimaryDownloadRequested, err.to_string()))?;
        self.executor
            .perform_click(&book_generate(), "generate book")
            .await
            .map_err(|err| RowSkip::at(RowStage::PrimaryDownloadRequested, err.to_string()))?;

        let pdf = self
            .collect_pdf_download(watch, &prior, Duration::from_secs(120))
            .await?;
        let dest = self
            .download_dir
            .join(format!("{}_{}.pdf", self.company, file_label));
        replace_file(&pdf, &dest, 16, Duration::from_millis(500))
            .await
            .map_err(|err| RowSkip::at(RowStage::PrimaryDownloaded, err.to_string()))?;
        info!(file = %dest.display(), "book saved");
        Ok(vec![("arquivo".to_string(), dest.display().to_string())])
    }

    async fn generate_guia(&self) -> Result<Vec<(String, String)>, RowSkip> {
        self.go_home().await;
        self.optional_click(
            &Locator::link_text("Pagamentos").into(),
            "open payments menu",
            Duration::from_secs(10),
        )
        .await;
        self.optional_click(
            &Locator::partial_link_text("Gerar Guias ISS").into(),
            "open ISS slip menu",
            Duration::from_secs(10),
        )
        .await;
        if !self
            .optional_click(
                &Locator::partial_link_text("para Doctos. Emitidos").into(),
                "open slip for issued documents",
                Duration::from_secs(10),
            )
            .await
        {
            return Err(RowSkip::at(
                RowStage::RowFound,
                "ISS slip menu path not reachable",
            ));
        }
        self.clear_ui().await;

        // The period selects may live inside an iframe on this screen.
        let frame_guard = self
            .navigator
            .descend_to_frame_containing(&year_selects(), 12)
            .await
            .map_err(|err| RowSkip::at(RowStage::RowFound, err.to_string()))?;

        let outcome = async {
            self.select_period().await?;
            self.optional_click(&search_button(), "search period", Duration::from_secs(10))
                .await;
            if let Err(err) = self.guard.await_clear(Duration::from_secs(8)).await {
                warn!(%err, "overlay check failed after search");
            }

            let print = self
                .executor
                .resolver()
                .try_resolve_now(&print_button())
                .await
                .map_err(|err| RowSkip::at(RowStage::RowFound, err.to_string()))?;
            let Some(print) = print else {
                info!("no print control: slip already issued");
                return Ok(vec![(
                    "resultado".to_string(),
                    "ja emitida".to_string(),
                )]);
            };

            let watch =
                DownloadWatch::begin(&self.download_dir, NameFilter::with_suffix(".pdf"))
                    .map_err(|err| {
                        RowSkip::at(RowStage::PrimaryDownloadRequested, err.to_string())
                    })?;
            let prior = self
                .navigator
                .snapshot_windows()
                .await
                .map_err(|err| RowSkip::at(RowStage::PrimaryDownloadRequested, err.to_string()))?;
            self.executor
                .click_resolved(&print, "print ISS slip", true)
                .await
                .map_err(|err| RowSkip::at(RowStage::PrimaryDownloadRequested, err.to_string()))?;

            let pdf = self
                .collect_pdf_download(watch, &prior, Duration::from_secs(120))
                .await?;
            let dest = self
                .download_dir
                .join(format!("{}_Guia ISS Prestados.pdf", self.company));
            replace_file(&pdf, &dest, 16, Duration::from_millis(500))
                .await
                .map_err(|err| RowSkip::at(RowStage::PrimaryDownloaded, err.to_string()))?;
            info!(file = %dest.display(), "ISS slip saved");
            Ok(vec![("arquivo".to_string(), dest.display().to_string())])
        }
        .await;

        if let Err(err) = frame_guard.restore().await {
            warn!(%err, "frame scope not restored cleanly");
        }
        outcome
    }
}

/// Run the full Osasco monthly flow.
pub async fn run(engine: &Engine) -> TaskReport {
    let mut ctx = OsascoCtx {
        driver: engine.driver.clone(),
        executor: engine.executor.clone(),
        guard: engine.guard.clone(),
        navigator: engine.navigator.clone(),
        portal: engine.config.portals.osasco.clone(),
        period: engine.period,
        download_dir: engine.download_dir.clone(),
        login_timeout: engine.config.engine.login_timeout(),
        company: "empresa".to_string(),
    };
    let step_timeout = engine.config.engine.step_timeout();
    let login_step_timeout = ctx.login_timeout + Duration::from_secs(60);

    TaskPipeline::<OsascoCtx>::new("Osasco NFS-e fluxo mensal")
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
                    info!("log in manually; the run resumes at the home screen");
                    ctx.navigator
                        .await_authenticated(
                            &[Landmark::Control(notas_fiscais_link())],
                            ctx.login_timeout,
                        )
                        .await?;
                    ctx.clear_ui().await;
                    Ok(())
                })
            },
        )
        .step(
            TaskStage::Navigated,
            "detect taxpayer",
            step_timeout,
            |ctx, _report| {
                Box::pin(async move {
                    ctx.detect_company().await;
                    Ok(())
                })
            },
        )
        .step(
            TaskStage::Exported,
            "export issued and received notes",
            step_timeout,
            |ctx, report| {
                Box::pin(async move {
                    ctx.export_direction(ExportDirection::Emitidas, report).await;
                    ctx.export_direction(ExportDirection::Recebidas, report).await;
                    Ok(())
                })
            },
        )
        .step(
            TaskStage::Downloaded,
            "fiscal books and ISS slip",
            step_timeout,
            |ctx, report| {
                Box::pin(async move {
                    match ctx
                        .generate_book("Notas Fiscais Emitidas", "Livro Notas Emitidas")
                        .await
                    {
                        Ok(fields) => ctx.record(report, "livro-emitidas", fields),
                        Err(skip) => ctx.record_skip(report, skip),
                    }
                    match ctx
                        .generate_book("Notas Fiscais Recebidas", "Livro Notas Recebidas")
                        .await
                    {
                        Ok(fields) => ctx.record(report, "livro-recebidas", fields),
                        Err(skip) => ctx.record_skip(report, skip),
                    }
                    match ctx.generate_guia().await {
                        Ok(fields) => ctx.record(report, "guia-iss", fields),
                        Err(skip) => ctx.record_skip(report, skip),
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
                        company = %ctx.company,
                        period = %ctx.period.slug(),
                        sections_ok = report.rows_recorded(),
                        sections_skipped = report.rows_skipped(),
                        "osasco flow complete"
                    );
                    Ok(())
                })
            },
        )
        .execute(&mut ctx)
        .await
}
