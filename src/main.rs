use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use cdp_driver::{CdpDriver, Driver};
use clap::{Parser, Subcommand};
use fiscobot_cli::{config::AppConfig, logging, portals, report::FileReportSink};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "fiscobot",
    version,
    about = "Unattended retrieval of fiscal documents from government web portals"
)]
struct Cli {
    /// Configuration file (defaults to ./fiscobot.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the download rendezvous directory.
    #[arg(long, global = true)]
    download_dir: Option<PathBuf>,

    /// Launch the browser headless (interactive login flows need a head).
    #[arg(long, global = true)]
    headless: bool,

    /// Attach to an already-open browser via its DevTools websocket.
    #[arg(long, global = true)]
    ws_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the available portal tasks.
    List,
    /// Run one or more tasks sequentially.
    Run {
        /// Task names (see `fiscobot list`).
        #[arg(required_unless_present = "all")]
        tasks: Vec<String>,
        /// Run every known task.
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.download_dir {
        config.download_dir = Some(dir);
    }
    if cli.headless {
        config.browser.headless = true;
    }
    if let Some(ws_url) = cli.ws_url {
        config.browser.ws_url = Some(ws_url);
    }

    let report_dir = config.report_dir();
    std::fs::create_dir_all(&report_dir)
        .with_context(|| format!("creating report dir {}", report_dir.display()))?;
    let _log_guard = logging::init(Some(&report_dir));

    match cli.command {
        Command::List => {
            for name in portals::task_names() {
                println!("{name}");
            }
            Ok(())
        }
        Command::Run { tasks, all } => {
            let names: Vec<String> = if all {
                portals::task_names().iter().map(|s| s.to_string()).collect()
            } else {
                tasks
            };

            let download_dir = config.download_dir();
            std::fs::create_dir_all(&download_dir)
                .with_context(|| format!("creating download dir {}", download_dir.display()))?;

            let driver = CdpDriver::connect(&config.cdp_config())
                .await
                .context("connecting to the browser")?;
            driver
                .set_download_dir(&download_dir)
                .await
                .context("pointing browser downloads at the rendezvous directory")?;
            info!(download_dir = %download_dir.display(), "browser session ready");

            let engine = portals::Engine::new(Arc::new(driver), config);
            let sink = FileReportSink::new(&report_dir);

            let started = Instant::now();
            let reports = portals::run_tasks(&engine, &names).await?;

            let mut failures = 0usize;
            for report in &reports {
                sink.record_task(report)
                    .with_context(|| format!("recording report for '{}'", report.label))?;
                let status = if report.is_success() { "ok" } else { "FAILED" };
                if !report.is_success() {
                    failures += 1;
                }
                println!(
                    "{:<28} {:<7} stage={} rows_ok={} rows_skipped={}",
                    report.label,
                    status,
                    report.stage_reached,
                    report.rows_recorded(),
                    report.rows_skipped()
                );
            }
            println!(
                "{} task(s) in {}; log at {}",
                reports.len(),
                humantime::format_duration(std::time::Duration::from_secs(
                    started.elapsed().as_secs()
                )),
                sink.log_path().display()
            );

            if failures > 0 {
                anyhow::bail!("{failures} task(s) failed; see the run log");
            }
            Ok(())
        }
    }
}
