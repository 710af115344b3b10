//! Fiscobot: unattended retrieval of fiscal documents from government web
//! portals.
//!
//! The engine crates under `crates/` carry the portal-agnostic machinery
//! (locator fallback, action execution, download synchronization, session
//! navigation, pagination, orchestration); this crate holds the CLI,
//! configuration, report glue, and the per-portal selector tables.

pub mod config;
pub mod logging;
pub mod portals;
pub mod report;
pub mod xmlname;

pub use config::AppConfig;
pub use portals::{run_task, run_tasks, task_names, Engine};
pub use report::FileReportSink;
