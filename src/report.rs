//! Report sink: append-only run log plus per-task row CSVs.
//!
//! The engine emits structured [`TaskReport`]s; this module is the
//! external-collaborator side that turns them into the files an operator
//! actually reviews after an unattended run.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use task_flow::{RowOutcome, TaskReport};

/// Writes run summaries and row records under one report directory.
pub struct FileReportSink {
    log_path: PathBuf,
    csv_dir: PathBuf,
}

impl FileReportSink {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        let csv_dir = report_dir.into();
        Self {
            log_path: csv_dir.join("fiscobot-run.log"),
            csv_dir,
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn append_log(&self, line: &str) -> anyhow::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("opening {}", self.log_path.display()))?;
        writeln!(file, "{} {}", Local::now().format("%Y-%m-%d %H:%M:%S"), line)?;
        Ok(())
    }

    fn slug(label: &str) -> String {
        label
            .chars()
            .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect::<String>()
            .trim_matches('-')
            .to_string()
    }

    /// Record one finished task: a summary line in the run log and, when
    /// the task processed rows, a `<slug> rows.csv` next to it.
    pub fn record_task(&self, report: &TaskReport) -> anyhow::Result<()> {
        let status = match &report.error {
            None => "ok".to_string(),
            Some(error) => format!("FAILED ({error})"),
        };
        self.append_log(&format!(
            "task '{}' stage={} rows_ok={} rows_skipped={} {}",
            report.label,
            report.stage_reached,
            report.rows_recorded(),
            report.rows_skipped(),
            status
        ))?;

        if report.rows.is_empty() {
            return Ok(());
        }

        let csv_path = self
            .csv_dir
            .join(format!("{} rows.csv", Self::slug(&report.label)));
        let mut writer = csv::Writer::from_path(&csv_path)
            .with_context(|| format!("creating {}", csv_path.display()))?;
        writer.write_record(["row", "outcome", "detail", "fields"])?;
        for row in &report.rows {
            let (outcome, detail) = match &row.outcome {
                RowOutcome::Recorded => ("recorded".to_string(), String::new()),
                RowOutcome::Skipped { stage, reason } => {
                    ("skipped".to_string(), format!("{stage}: {reason}"))
                }
            };
            let fields = row
                .fields
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(" | ");
            writer.write_record([row.index.to_string(), outcome, detail, fields])?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use task_flow::{RowRecord, RowStage};

    #[test]
    fn writes_log_line_and_row_csv() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileReportSink::new(dir.path());

        let mut report = TaskReport::new("NFS-e Emitidas");
        report.rows.push(RowRecord::recorded(
            1,
            vec![("empresa".to_string(), "ACME".to_string())],
        ));
        report.rows.push(RowRecord::skipped(
            2,
            RowStage::PrimaryDownloaded,
            "xml never stabilized",
        ));
        sink.record_task(&report).unwrap();

        let log = std::fs::read_to_string(sink.log_path()).unwrap();
        assert!(log.contains("task 'NFS-e Emitidas'"));
        assert!(log.contains("rows_ok=1"));

        let csv = std::fs::read_to_string(dir.path().join("nfs-e-emitidas rows.csv")).unwrap();
        assert!(csv.contains("empresa=ACME"));
        assert!(csv.contains("skipped"));
    }

    #[test]
    fn tasks_without_rows_only_log() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileReportSink::new(dir.path());

        let mut report = TaskReport::new("fsist");
        report.error = Some("authentication timeout".to_string());
        sink.record_task(&report).unwrap();

        let log = std::fs::read_to_string(sink.log_path()).unwrap();
        assert!(log.contains("FAILED"));
        assert!(!dir.path().join("fsist rows.csv").exists());
    }
}
