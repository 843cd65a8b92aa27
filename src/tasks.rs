use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::partition::{FinalWindow, TimeRange, Window};
use crate::types::EntityId;

/// One (entity, window) request. Consumed exactly once by a worker.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchTask {
    /// Entity the request filters on.
    pub entity_id: EntityId,
    /// Inclusive window start.
    pub window_start: NaiveDateTime,
    /// Exclusive window end.
    pub window_end: NaiveDateTime,
}

impl FetchTask {
    /// Task for `entity_id` over `[window_start, window_end)`.
    pub fn new(
        entity_id: impl Into<EntityId>,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            window_start,
            window_end,
        }
    }

    /// Window bounds of this task.
    pub fn window(&self) -> Window {
        Window {
            start: self.window_start,
            end: self.window_end,
        }
    }
}

/// Lifecycle of a task inside one batch. No state returns to `Pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Queued, not yet picked up.
    Pending,
    /// Picked up by a worker.
    Running,
    /// Returned at least one row.
    SucceededWithRows,
    /// Returned no usable rows.
    SucceededEmpty,
    /// Failed after every allowed attempt.
    Failed,
    /// Skipped by cancellation.
    Cancelled,
}

impl TaskState {
    /// Returns `true` once the task can no longer change.
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::Pending | TaskState::Running)
    }
}

/// Cross product of entities and partitioned ranges, entity-major.
///
/// Repeated entities or ranges are not deduplicated.
pub fn expand<E>(
    entities: &[E],
    ranges: &[TimeRange],
    step: TimeDelta,
    mode: FinalWindow,
) -> Vec<FetchTask>
where
    E: AsRef<str>,
{
    let windows: Vec<Window> = ranges
        .iter()
        .flat_map(|range| range.windows(step, mode))
        .collect();
    let mut tasks = Vec::with_capacity(entities.len() * windows.len());
    for entity in entities {
        for window in &windows {
            tasks.push(FetchTask::new(entity.as_ref(), window.start, window.end));
        }
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(offset: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 8, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + TimeDelta::days(offset)
    }

    #[test]
    fn expands_entities_times_windows() {
        let ranges = [TimeRange::new(day(0), day(15))];
        let tasks = expand(&["A", "B"], &ranges, TimeDelta::days(7), FinalWindow::Clamp);
        assert_eq!(tasks.len(), 6);
        assert_eq!(tasks[0], FetchTask::new("A", day(0), day(7)));
        assert_eq!(tasks[2], FetchTask::new("A", day(14), day(15)));
        assert_eq!(tasks[3], FetchTask::new("B", day(0), day(7)));
    }

    #[test]
    fn count_is_entities_times_total_windows_across_ranges() {
        let ranges = [
            TimeRange::new(day(0), day(61)),
            TimeRange::new(day(100), day(142)),
            TimeRange::new(day(200), day(200)),
        ];
        let entities: Vec<String> = (0..9).map(|i| format!("link-{i}")).collect();
        let per_entity: usize = ranges
            .iter()
            .map(|r| r.windows(TimeDelta::days(7), FinalWindow::Clamp).len())
            .sum();
        assert_eq!(per_entity, 9 + 6);
        let tasks = expand(&entities, &ranges, TimeDelta::days(7), FinalWindow::Clamp);
        assert_eq!(tasks.len(), entities.len() * per_entity);
    }

    #[test]
    fn duplicates_are_kept() {
        let ranges = [TimeRange::new(day(0), day(1)), TimeRange::new(day(0), day(1))];
        let tasks = expand(&["A", "A"], &ranges, TimeDelta::days(1), FinalWindow::Clamp);
        assert_eq!(tasks.len(), 4);
        assert!(tasks.iter().all(|t| *t == tasks[0]));
    }

    #[test]
    fn empty_inputs_yield_no_tasks() {
        let ranges = [TimeRange::new(day(0), day(7))];
        assert!(expand::<&str>(&[], &ranges, TimeDelta::days(1), FinalWindow::Clamp).is_empty());
        assert!(expand(&["A"], &[], TimeDelta::days(1), FinalWindow::Clamp).is_empty());
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::SucceededEmpty.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
    }
}
