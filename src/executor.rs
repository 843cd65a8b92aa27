//! Bounded concurrent execution of fetch tasks.
//!
//! A fixed number of scoped worker threads pull tasks from one shared FIFO
//! queue and send each terminal [`TaskOutcome`] back over a channel. The
//! caller thread drains that channel as outcomes arrive; leaving the thread
//! scope is the barrier that guarantees every worker has finished.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;

use tracing::{debug, warn};

use crate::aggregate::{PartialResult, TaskOutcome};
use crate::client::RowSource;
use crate::config::RetryPolicy;
use crate::errors::FetchError;
use crate::query::TaskQuery;
use crate::tasks::FetchTask;

/// Shared flag that stops workers from starting new tasks.
///
/// Tasks already in flight run to completion and keep their rows.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop every batch sharing this token from starting new tasks.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Fixed-size worker pool for one batch of tasks.
#[derive(Clone, Debug)]
pub struct Executor {
    max_workers: usize,
    retry: RetryPolicy,
}

impl Executor {
    /// `max_workers` is clamped to at least one.
    pub fn new(max_workers: usize, retry: RetryPolicy) -> Self {
        Self {
            max_workers: max_workers.max(1),
            retry,
        }
    }

    /// Worker count used for each batch.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run every task and hand each outcome to `on_outcome` in completion order.
    ///
    /// Returns once all tasks are terminal. `on_outcome` runs on the calling
    /// thread, so it may hold non-`Send` state.
    pub fn run<S, F>(
        &self,
        source: &S,
        query: &TaskQuery,
        tasks: Vec<FetchTask>,
        cancel: &CancelToken,
        mut on_outcome: F,
    ) where
        S: RowSource + ?Sized,
        F: FnMut(TaskOutcome),
    {
        if tasks.is_empty() {
            return;
        }
        let workers = self.max_workers.min(tasks.len());
        let queue = Mutex::new(VecDeque::from(tasks));
        let (sender, receiver) = mpsc::channel::<TaskOutcome>();

        thread::scope(|scope| {
            for worker_id in 0..workers {
                let sender = sender.clone();
                let queue = &queue;
                let retry = &self.retry;
                scope.spawn(move || {
                    worker_loop(worker_id, source, query, queue, retry, cancel, sender);
                });
            }
            drop(sender);
            for outcome in receiver {
                on_outcome(outcome);
            }
        });
    }
}

fn worker_loop<S: RowSource + ?Sized>(
    worker_id: usize,
    source: &S,
    query: &TaskQuery,
    queue: &Mutex<VecDeque<FetchTask>>,
    retry: &RetryPolicy,
    cancel: &CancelToken,
    sender: mpsc::Sender<TaskOutcome>,
) {
    loop {
        let next = queue.lock().expect("task queue poisoned").pop_front();
        let Some(task) = next else {
            return;
        };
        let outcome = if cancel.is_cancelled() {
            TaskOutcome::Cancelled(task)
        } else {
            debug!(
                worker_id,
                entity_id = %task.entity_id,
                window = %task.window(),
                "fetch task running"
            );
            run_task(source, query, task, retry, cancel)
        };
        debug!(
            worker_id,
            entity_id = %outcome.task().entity_id,
            state = ?outcome.state(),
            rows = outcome.row_count(),
            "fetch task finished"
        );
        if sender.send(outcome).is_err() {
            return;
        }
    }
}

/// Execute one task, retrying transport failures per `retry`.
pub(crate) fn run_task<S: RowSource + ?Sized>(
    source: &S,
    query: &TaskQuery,
    task: FetchTask,
    retry: &RetryPolicy,
    cancel: &CancelToken,
) -> TaskOutcome {
    let params = query.params_for(&task);
    let mut attempt = 1u32;
    loop {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            source.get_rows(&query.endpoint, &params)
        }));
        match result {
            Ok(Ok(rows)) if rows.is_empty() => return TaskOutcome::Empty(task),
            Ok(Ok(rows)) => return TaskOutcome::Rows(PartialResult { task, rows }),
            Ok(Err(error)) if error.is_malformed() => {
                warn!(
                    entity_id = %task.entity_id,
                    window = %task.window(),
                    error = %error,
                    "unusable response body; treating as no rows"
                );
                return TaskOutcome::Empty(task);
            }
            Ok(Err(error)) => {
                if error.is_transport() && attempt < retry.max_attempts && !cancel.is_cancelled() {
                    debug!(
                        entity_id = %task.entity_id,
                        attempt,
                        error = %error,
                        "retrying fetch task"
                    );
                    attempt += 1;
                    thread::sleep(retry.backoff);
                    continue;
                }
                return TaskOutcome::Failed { task, error };
            }
            Err(_) => {
                let error = FetchError::WorkerPanicked {
                    entity_id: task.entity_id.clone(),
                };
                return TaskOutcome::Failed { task, error };
            }
        }
    }
}
