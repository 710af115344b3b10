//! Pipeline execution: named stages with per-step timeouts, and the
//! per-row sub-machine with skip-and-continue semantics.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::errors::{FlowError, RowSkip, StepError};
use crate::types::{RowRecord, TaskReport, TaskStage};

type StepFn<C> =
    Box<dyn for<'a> FnMut(&'a mut C, &'a mut TaskReport) -> BoxFuture<'a, Result<(), StepError>> + Send>;

struct PipelineStep<C> {
    stage: TaskStage,
    label: String,
    timeout: Duration,
    run: StepFn<C>,
}

/// Ordered sequence of named stages over a task context `C`.
///
/// A failing or timed-out step stops the pipeline; the report keeps the
/// last stage that completed plus the error. Row-level failures never
/// reach this level - they are absorbed by [`process_rows`] inside a step.
pub struct TaskPipeline<C> {
    label: String,
    steps: Vec<PipelineStep<C>>,
}

impl<C: Send> TaskPipeline<C> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            steps: Vec::new(),
        }
    }

    /// Append a stage. `run` receives the task context and the in-flight
    /// report (for row records).
    pub fn step<F>(
        mut self,
        stage: TaskStage,
        label: impl Into<String>,
        step_timeout: Duration,
        run: F,
    ) -> Self
    where
        F: for<'a> FnMut(&'a mut C, &'a mut TaskReport) -> BoxFuture<'a, Result<(), StepError>>
            + Send
            + 'static,
    {
        self.steps.push(PipelineStep {
            stage,
            label: label.into(),
            timeout: step_timeout,
            run: Box::new(run),
        });
        self
    }

    /// Run the pipeline to completion or first task-level failure.
    pub async fn execute(mut self, ctx: &mut C) -> TaskReport {
        let mut report = TaskReport::new(self.label.clone());
        info!(task = %report.label, task_id = %report.task_id, "task started");

        let mut failed = false;
        for step in self.steps.iter_mut() {
            info!(task = %report.label, stage = %step.stage, step = %step.label, "stage started");
            match timeout(step.timeout, (step.run)(ctx, &mut report)).await {
                Ok(Ok(())) => {
                    report.stage_reached = step.stage;
                }
                Ok(Err(err)) => {
                    let flow_err = FlowError::StageFailed {
                        stage: format!("{} ({})", step.stage, step.label),
                        reason: err.message,
                    };
                    error!(task = %report.label, %flow_err, "task aborted");
                    report.error = Some(flow_err.to_string());
                    failed = true;
                    break;
                }
                Err(_) => {
                    let flow_err = FlowError::StageTimeout {
                        stage: format!("{} ({})", step.stage, step.label),
                        timeout: step.timeout,
                    };
                    error!(task = %report.label, %flow_err, "task aborted");
                    report.error = Some(flow_err.to_string());
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            report.stage_reached = TaskStage::Done;
        }
        report.finished_at = Some(Utc::now());
        info!(
            task = %report.label,
            stage = %report.stage_reached,
            rows_recorded = report.rows_recorded(),
            rows_skipped = report.rows_skipped(),
            success = report.is_success(),
            "task finished"
        );
        report
    }
}

/// Summary of one row batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RowBatchSummary {
    pub recorded: usize,
    pub skipped: usize,
}

/// Drive the per-row sub-machine over `rows`.
///
/// Each row either produces a [`RowRecord`] or bails with a [`RowSkip`];
/// a skip is logged, recorded, and the batch continues with the next row.
/// It must never abort the page or the task.
pub async fn process_rows<R, F, Fut>(
    report: &mut TaskReport,
    rows: Vec<R>,
    mut process: F,
) -> RowBatchSummary
where
    F: FnMut(usize, R) -> Fut,
    Fut: Future<Output = Result<RowRecord, RowSkip>>,
{
    let mut summary = RowBatchSummary::default();
    for row in rows {
        let index = report.rows.len() + 1;
        match process(index, row).await {
            Ok(record) => {
                summary.recorded += 1;
                report.rows.push(record);
            }
            Err(skip) => {
                warn!(row = index, stage = %skip.stage, reason = %skip.reason, "row skipped");
                summary.skipped += 1;
                report
                    .rows
                    .push(RowRecord::skipped(index, skip.stage, skip.reason));
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowStage;
    use tokio::time::sleep;

    #[derive(Default)]
    struct Ctx {
        log: Vec<&'static str>,
    }

    #[tokio::test]
    async fn pipeline_runs_stages_in_order() {
        let mut ctx = Ctx::default();
        let report = TaskPipeline::<Ctx>::new("demo")
            .step(
                TaskStage::Authenticated,
                "login",
                Duration::from_secs(1),
                |ctx, _report| {
                    Box::pin(async move {
                        ctx.log.push("login");
                        Ok(())
                    })
                },
            )
            .step(
                TaskStage::Exported,
                "export",
                Duration::from_secs(1),
                |ctx, _report| {
                    Box::pin(async move {
                        ctx.log.push("export");
                        Ok(())
                    })
                },
            )
            .execute(&mut ctx)
            .await;

        assert_eq!(ctx.log, vec!["login", "export"]);
        assert_eq!(report.stage_reached, TaskStage::Done);
        assert!(report.is_success());
        assert!(report.finished_at.is_some());
    }

    #[tokio::test]
    async fn failing_stage_stops_the_pipeline_and_keeps_progress() {
        let mut ctx = Ctx::default();
        let report = TaskPipeline::<Ctx>::new("demo")
            .step(
                TaskStage::Navigated,
                "open section",
                Duration::from_secs(1),
                |_ctx, _report| Box::pin(async { Ok(()) }),
            )
            .step(
                TaskStage::Exported,
                "export",
                Duration::from_secs(1),
                |_ctx, _report| {
                    Box::pin(async { Err(StepError::msg("export button never appeared")) })
                },
            )
            .step(
                TaskStage::Archived,
                "archive",
                Duration::from_secs(1),
                |ctx, _report| {
                    Box::pin(async move {
                        ctx.log.push("archive");
                        Ok(())
                    })
                },
            )
            .execute(&mut ctx)
            .await;

        assert!(ctx.log.is_empty());
        assert_eq!(report.stage_reached, TaskStage::Navigated);
        let error = report.error.expect("task failed");
        assert!(error.contains("export"));
        assert!(error.contains("export button never appeared"));
    }

    #[tokio::test]
    async fn slow_stage_times_out() {
        let mut ctx = Ctx::default();
        let report = TaskPipeline::<Ctx>::new("demo")
            .step(
                TaskStage::Downloaded,
                "wait download",
                Duration::from_millis(30),
                |_ctx, _report| {
                    Box::pin(async {
                        sleep(Duration::from_secs(5)).await;
                        Ok(())
                    })
                },
            )
            .execute(&mut ctx)
            .await;

        assert_eq!(report.stage_reached, TaskStage::Init);
        assert!(report.error.expect("timed out").contains("timed out"));
    }

    #[tokio::test]
    async fn row_failures_are_isolated() {
        let mut report = TaskReport::new("rows");
        let rows = vec!["ok", "broken", "ok"];
        let summary = process_rows(&mut report, rows, |index, row| async move {
            if row == "broken" {
                Err(RowSkip::at(
                    RowStage::MenuOpened,
                    "menu trigger went stale",
                ))
            } else {
                Ok(RowRecord::recorded(
                    index,
                    vec![("value".to_string(), row.to_string())],
                ))
            }
        })
        .await;

        assert_eq!(summary.recorded, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(report.rows.len(), 3);
        assert!(!report.rows[1].is_recorded());
    }

    #[tokio::test]
    async fn rows_can_record_through_the_pipeline_report() {
        let mut ctx = Ctx::default();
        let report = TaskPipeline::<Ctx>::new("list task")
            .step(
                TaskStage::Downloaded,
                "rows",
                Duration::from_secs(1),
                |_ctx, report| {
                    Box::pin(async move {
                        process_rows(report, vec![1u32, 2, 3], |index, _row| async move {
                            Ok(RowRecord::recorded(index, Vec::new()))
                        })
                        .await;
                        Ok(())
                    })
                },
            )
            .execute(&mut ctx)
            .await;

        assert_eq!(report.rows_recorded(), 3);
    }
}
