//! Workflow orchestration.
//!
//! A [`TaskPipeline`] sequences named stages (navigate, filter, export,
//! wait, archive) with per-step timeouts; [`process_rows`] runs the
//! per-row sub-machine with skip-and-continue semantics. A task-level
//! failure aborts that task only - callers running several tasks
//! sequentially record the report and move on.

pub mod errors;
pub mod executor;
pub mod types;

pub use errors::{FlowError, RowSkip, StepError};
pub use executor::{process_rows, RowBatchSummary, TaskPipeline};
pub use types::{RowOutcome, RowRecord, RowStage, TaskReport, TaskStage};
