//! Task and row state machines, outcome records, task reports.

use std::fmt;

use chrono::{DateTime, Utc};
use fiscobot_core_types::TaskId;
use serde::{Deserialize, Serialize};

/// Task-level stages, advanced monotonically by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskStage {
    Init,
    Authenticated,
    Navigated,
    Filtered,
    Exported,
    Downloaded,
    Archived,
    Reported,
    Done,
}

impl TaskStage {
    pub fn name(&self) -> &'static str {
        match self {
            TaskStage::Init => "init",
            TaskStage::Authenticated => "authenticated",
            TaskStage::Navigated => "navigated",
            TaskStage::Filtered => "filtered",
            TaskStage::Exported => "exported",
            TaskStage::Downloaded => "downloaded",
            TaskStage::Archived => "archived",
            TaskStage::Reported => "reported",
            TaskStage::Done => "done",
        }
    }
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-row sub-machine for list-based tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowStage {
    RowFound,
    MenuOpened,
    PrimaryDownloadRequested,
    PrimaryDownloaded,
    SecondaryDownloadRequested,
    SecondaryDownloaded,
    RowRecorded,
}

impl RowStage {
    pub fn name(&self) -> &'static str {
        match self {
            RowStage::RowFound => "row-found",
            RowStage::MenuOpened => "menu-opened",
            RowStage::PrimaryDownloadRequested => "primary-download-requested",
            RowStage::PrimaryDownloaded => "primary-downloaded",
            RowStage::SecondaryDownloadRequested => "secondary-download-requested",
            RowStage::SecondaryDownloaded => "secondary-downloaded",
            RowStage::RowRecorded => "row-recorded",
        }
    }
}

impl fmt::Display for RowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How one row ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowOutcome {
    Recorded,
    Skipped { stage: RowStage, reason: String },
}

/// Structured per-row record emitted to the report sink.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RowRecord {
    pub index: usize,
    pub fields: Vec<(String, String)>,
    pub outcome: RowOutcome,
}

impl RowRecord {
    pub fn recorded(index: usize, fields: Vec<(String, String)>) -> Self {
        Self {
            index,
            fields,
            outcome: RowOutcome::Recorded,
        }
    }

    pub fn skipped(index: usize, stage: RowStage, reason: impl Into<String>) -> Self {
        Self {
            index,
            fields: Vec::new(),
            outcome: RowOutcome::Skipped {
                stage,
                reason: reason.into(),
            },
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self.outcome, RowOutcome::Recorded)
    }
}

/// Everything one task run produced: stage reached, per-row records, and
/// the error that stopped it, if any.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub label: String,
    pub stage_reached: TaskStage,
    pub rows: Vec<RowRecord>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskReport {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            task_id: TaskId::new(),
            label: label.into(),
            stage_reached: TaskStage::Init,
            rows: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn rows_recorded(&self) -> usize {
        self.rows.iter().filter(|row| row.is_recorded()).count()
    }

    pub fn rows_skipped(&self) -> usize {
        self.rows.len() - self.rows_recorded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_recorded_vs_skipped() {
        let mut report = TaskReport::new("nfse emitidas");
        report
            .rows
            .push(RowRecord::recorded(1, vec![("empresa".into(), "ACME".into())]));
        report.rows.push(RowRecord::skipped(
            2,
            RowStage::PrimaryDownloadRequested,
            "xml never arrived",
        ));
        report.rows.push(RowRecord::recorded(3, Vec::new()));

        assert_eq!(report.rows_recorded(), 2);
        assert_eq!(report.rows_skipped(), 1);
        assert!(report.is_success());
    }

    #[test]
    fn stages_order_monotonically() {
        assert!(TaskStage::Init < TaskStage::Authenticated);
        assert!(TaskStage::Archived < TaskStage::Done);
    }
}
