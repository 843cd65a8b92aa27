//! Per-task outcomes and their fan-in into one combined table.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::errors::FetchError;
use crate::tasks::{FetchTask, TaskState};
use crate::types::Row;

/// Non-empty rows returned by one task.
#[derive(Clone, Debug, PartialEq)]
pub struct PartialResult {
    /// Task that produced the rows.
    pub task: FetchTask,
    /// Rows in response order.
    pub rows: Vec<Row>,
}

/// Terminal result of one task.
#[derive(Debug)]
pub enum TaskOutcome {
    /// The endpoint returned matching rows.
    Rows(PartialResult),
    /// No matching rows, or a body that held no usable rows.
    Empty(FetchTask),
    /// Transport failure, error status, or a panicking source.
    Failed {
        /// Task that failed.
        task: FetchTask,
        /// Error from the final attempt.
        error: FetchError,
    },
    /// Skipped because the batch was cancelled before the task started.
    Cancelled(FetchTask),
}

impl TaskOutcome {
    /// Task this outcome belongs to.
    pub fn task(&self) -> &FetchTask {
        match self {
            TaskOutcome::Rows(partial) => &partial.task,
            TaskOutcome::Empty(task) | TaskOutcome::Cancelled(task) => task,
            TaskOutcome::Failed { task, .. } => task,
        }
    }

    /// Terminal state the task reached.
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Rows(_) => TaskState::SucceededWithRows,
            TaskOutcome::Empty(_) => TaskState::SucceededEmpty,
            TaskOutcome::Failed { .. } => TaskState::Failed,
            TaskOutcome::Cancelled(_) => TaskState::Cancelled,
        }
    }

    /// Number of rows carried by this outcome.
    pub fn row_count(&self) -> usize {
        match self {
            TaskOutcome::Rows(partial) => partial.rows.len(),
            _ => 0,
        }
    }
}

/// Row-wise concatenation of every non-empty partial result.
///
/// Row order follows task completion order unless explicitly sorted.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CombinedResult {
    rows: Vec<Row>,
}

impl CombinedResult {
    /// Combined rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Take ownership of the combined rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Number of combined rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` when no task returned rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Stable sort by the string value of `field`. Rows missing the field sort last.
    ///
    /// ISO-8601 timestamps sort chronologically under this ordering.
    pub fn sort_by_field(&mut self, field: &str) {
        self.rows
            .sort_by_cached_key(|row| match sort_value(row, field) {
                Some(value) => (false, value),
                None => (true, String::new()),
            });
    }
}

fn sort_value(row: &Row, field: &str) -> Option<String> {
    match row.get(field)? {
        Value::String(text) => Some(text.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// A task that failed, kept for reporting.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FailedTask {
    /// Task that failed.
    pub task: FetchTask,
    /// Rendered error of the final attempt.
    pub error: String,
}

/// Counters describing one batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FetchSummary {
    /// Tasks that reached a terminal state.
    pub tasks: usize,
    /// Tasks that returned at least one row.
    pub with_rows: usize,
    /// Tasks that returned no usable rows.
    pub empty: usize,
    /// Tasks that failed.
    pub failed: usize,
    /// Tasks skipped by cancellation.
    pub cancelled: usize,
    /// Rows in the combined result.
    pub rows: usize,
    /// Wall time from first dispatch to the final join.
    pub elapsed: Duration,
    /// Failed tasks in completion order.
    pub failures: Vec<FailedTask>,
}

impl FetchSummary {
    /// Returns `true` when every task finished without failing or being skipped.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

/// Combined rows plus the batch summary.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FetchReport {
    /// Rows from every task that returned any.
    pub combined: CombinedResult,
    /// Per-state counters and failures.
    pub summary: FetchSummary,
}

/// Collects outcomes in arrival order.
#[derive(Default)]
pub struct Aggregator {
    rows: Vec<Row>,
    summary: FetchSummary,
}

impl Aggregator {
    /// Empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one outcome into the running result.
    pub fn push(&mut self, outcome: TaskOutcome) {
        self.summary.tasks += 1;
        match outcome {
            TaskOutcome::Rows(partial) => {
                self.summary.with_rows += 1;
                self.rows.extend(partial.rows);
            }
            TaskOutcome::Empty(_) => {
                self.summary.empty += 1;
            }
            TaskOutcome::Failed { task, error } => {
                warn!(
                    entity_id = %task.entity_id,
                    window = %task.window(),
                    error = %error,
                    "fetch task failed; continuing without its rows"
                );
                self.summary.failed += 1;
                self.summary.failures.push(FailedTask {
                    task,
                    error: error.to_string(),
                });
            }
            TaskOutcome::Cancelled(_) => {
                self.summary.cancelled += 1;
            }
        }
    }

    /// Close the batch. Zero rows is an empty result, never an error.
    pub fn finish(mut self, elapsed: Duration) -> FetchReport {
        self.summary.rows = self.rows.len();
        self.summary.elapsed = elapsed;
        FetchReport {
            combined: CombinedResult { rows: self.rows },
            summary: self.summary,
        }
    }
}
