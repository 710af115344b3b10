//! Per-portal task definitions.
//!
//! Each portal module is a selector table plus a staged pipeline over the
//! engine. Everything portal-specific (ids, XPaths, filename conventions,
//! business fields) lives here; the crates under `crates/` stay generic.

use std::path::PathBuf;
use std::sync::Arc;

use cdp_driver::Driver;
use chrono::Local;
use fiscobot_core_types::ReportingPeriod;
use row_pager::{PagerConfig, Paginator};
use session_nav::SessionNavigator;
use task_flow::TaskReport;
use tracing::{error, info};
use ui_actions::{ActionExecutor, OverlayGuard};

use crate::config::AppConfig;

pub mod fsist;
pub mod nfse_nacional;
pub mod osasco;

/// One engine bundle per browser session, handed to the portal pipelines.
pub struct Engine {
    pub driver: Arc<dyn Driver>,
    pub executor: Arc<ActionExecutor>,
    pub guard: Arc<OverlayGuard>,
    pub navigator: Arc<SessionNavigator>,
    pub paginator: Arc<Paginator>,
    pub config: AppConfig,
    pub period: ReportingPeriod,
    pub download_dir: PathBuf,
}

impl Engine {
    pub fn new(driver: Arc<dyn Driver>, config: AppConfig) -> Self {
        let executor = Arc::new(ActionExecutor::with_config(
            driver.clone(),
            config.action_config(),
        ));
        let guard = Arc::new(OverlayGuard::new(driver.clone()));
        let navigator = Arc::new(SessionNavigator::new(driver.clone()));
        let paginator = Arc::new(Paginator::with_config(
            executor.clone(),
            PagerConfig {
                max_pages: config.engine.max_pages,
                ..PagerConfig::default()
            },
            row_pager::default_next_candidates(),
        ));
        let period = ReportingPeriod::previous_month(Local::now().date_naive());
        let download_dir = config.download_dir();
        Self {
            driver,
            executor,
            guard,
            navigator,
            paginator,
            config,
            period,
            download_dir,
        }
    }
}

/// Names accepted by `fiscobot run`.
pub fn task_names() -> &'static [&'static str] {
    &[
        "fsist-recebidas",
        "nfse-emitidas",
        "nfse-recebidas",
        "osasco-fluxo",
    ]
}

/// Run one task by name. The report carries the failure, if any; this
/// function only errors on unknown names.
pub async fn run_task(engine: &Engine, name: &str) -> anyhow::Result<TaskReport> {
    let report = match name {
        "fsist-recebidas" => fsist::run(engine).await,
        "nfse-emitidas" => nfse_nacional::run(engine, nfse_nacional::Direction::Emitidas).await,
        "nfse-recebidas" => nfse_nacional::run(engine, nfse_nacional::Direction::Recebidas).await,
        "osasco-fluxo" => osasco::run(engine).await,
        other => anyhow::bail!(
            "unknown task '{other}' (available: {})",
            task_names().join(", ")
        ),
    };
    Ok(report)
}

/// Run several tasks sequentially. A task-level failure is recorded and
/// the runner proceeds to the next independent task.
pub async fn run_tasks(engine: &Engine, names: &[String]) -> anyhow::Result<Vec<TaskReport>> {
    let mut reports = Vec::with_capacity(names.len());
    for name in names {
        info!(task = %name, "starting task");
        let report = run_task(engine, name).await?;
        if let Some(err) = &report.error {
            error!(task = %name, %err, "task failed, continuing with next");
        }
        reports.push(report);
    }
    Ok(reports)
}
