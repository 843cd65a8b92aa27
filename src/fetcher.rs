use std::time::Instant;

use tracing::info;

use crate::aggregate::{Aggregator, FetchReport};
use crate::client::RowSource;
use crate::config::FetcherConfig;
use crate::errors::FetchError;
use crate::executor::{CancelToken, Executor};
use crate::partition::TimeRange;
use crate::tasks::{FetchTask, expand};

/// Splits (entities × ranges) into windowed requests and runs them concurrently.
///
/// The fetcher holds no per-batch state, so one instance can serve any number
/// of sequential or concurrent `fetch` calls.
pub struct WindowedFetcher<S> {
    config: FetcherConfig,
    source: S,
}

impl<S: RowSource> WindowedFetcher<S> {
    /// Fetcher over `source`. The config is validated on each fetch.
    pub fn new(config: FetcherConfig, source: S) -> Self {
        Self { config, source }
    }

    /// Active configuration.
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Row source every task is sent to.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Tasks a fetch over `entities` and `ranges` would issue, without issuing them.
    pub fn plan<E: AsRef<str>>(&self, entities: &[E], ranges: &[TimeRange]) -> Vec<FetchTask> {
        expand(entities, ranges, self.config.step, self.config.final_window)
    }

    /// Fetch every (entity, window) pair and combine the non-empty results.
    ///
    /// Only an invalid configuration is an error. Failed tasks are listed in
    /// the report summary and contribute no rows.
    pub fn fetch<E: AsRef<str>>(
        &self,
        entities: &[E],
        ranges: &[TimeRange],
    ) -> Result<FetchReport, FetchError> {
        self.fetch_with_cancel(entities, ranges, &CancelToken::new())
    }

    /// Like [`fetch`](Self::fetch), but stops starting new tasks once `cancel` fires.
    pub fn fetch_with_cancel<E: AsRef<str>>(
        &self,
        entities: &[E],
        ranges: &[TimeRange],
        cancel: &CancelToken,
    ) -> Result<FetchReport, FetchError> {
        self.config.validate()?;
        let tasks = self.plan(entities, ranges);
        Ok(self.fetch_tasks(tasks, cancel))
    }

    /// Run an already expanded task list.
    pub fn fetch_tasks(&self, tasks: Vec<FetchTask>, cancel: &CancelToken) -> FetchReport {
        let started = Instant::now();
        let task_count = tasks.len();
        let executor = Executor::new(self.config.max_workers, self.config.retry.clone());
        let query = self.config.task_query();
        let mut aggregator = Aggregator::new();
        executor.run(&self.source, &query, tasks, cancel, |outcome| {
            aggregator.push(outcome)
        });
        let mut report = aggregator.finish(started.elapsed());
        if self.config.sort_by_timestamp {
            report.combined.sort_by_field(&self.config.timestamp_field);
        }
        let summary = &report.summary;
        info!(
            endpoint = %self.config.endpoint,
            tasks = task_count,
            with_rows = summary.with_rows,
            empty = summary.empty,
            failed = summary.failed,
            cancelled = summary.cancelled,
            rows = summary.rows,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "windowed fetch finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryParams;
    use crate::types::Row;
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
    use serde_json::Value;

    fn day(offset: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 8, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + TimeDelta::days(offset)
    }

    /// Echoes the filter back as a single row, or nothing for entity `none`.
    struct Echo;

    impl RowSource for Echo {
        fn get_rows(&self, _endpoint: &str, params: &QueryParams) -> Result<Vec<Row>, FetchError> {
            let filter = params.get("$where").unwrap_or_default();
            if filter.contains("'none'") {
                return Ok(Vec::new());
            }
            let mut row = Row::new();
            row.insert("where".into(), Value::from(filter));
            Ok(vec![row])
        }
    }

    fn config() -> FetcherConfig {
        FetcherConfig::for_endpoint("http://fixture", "entity", "ts")
    }

    #[test]
    fn plan_counts_entities_times_windows() {
        let fetcher = WindowedFetcher::new(config(), Echo);
        let tasks = fetcher.plan(&["A", "B"], &[TimeRange::new(day(0), day(15))]);
        assert_eq!(tasks.len(), 6);
        assert_eq!(tasks[0].entity_id, "A");
        assert_eq!(tasks[3].entity_id, "B");
        assert_eq!(tasks[2].window_end, day(15));
    }

    #[test]
    fn fetch_combines_non_empty_partials() {
        let fetcher = WindowedFetcher::new(config(), Echo);
        let report = fetcher
            .fetch(&["A", "none"], &[TimeRange::new(day(0), day(15))])
            .unwrap();
        assert_eq!(report.summary.tasks, 6);
        assert_eq!(report.summary.with_rows, 3);
        assert_eq!(report.summary.empty, 3);
        assert_eq!(report.combined.len(), 3);
        assert!(report.summary.is_complete());
    }

    #[test]
    fn empty_inputs_produce_an_empty_report() {
        let fetcher = WindowedFetcher::new(config(), Echo);
        let no_entities: [&str; 0] = [];
        let report = fetcher
            .fetch(&no_entities, &[TimeRange::new(day(0), day(15))])
            .unwrap();
        assert!(report.combined.is_empty());
        let report = fetcher.fetch(&["A"], &[TimeRange::new(day(5), day(5))]).unwrap();
        assert_eq!(report.summary.tasks, 0);
    }

    #[test]
    fn invalid_configuration_is_the_only_batch_error() {
        let mut bad = config();
        bad.max_workers = 0;
        let fetcher = WindowedFetcher::new(bad, Echo);
        let err = fetcher
            .fetch(&["A"], &[TimeRange::new(day(0), day(1))])
            .unwrap_err();
        assert!(matches!(err, FetchError::Configuration(_)));
    }

    #[test]
    fn sort_by_timestamp_orders_combined_rows() {
        struct Stamped;
        impl RowSource for Stamped {
            fn get_rows(&self, _: &str, params: &QueryParams) -> Result<Vec<Row>, FetchError> {
                let filter = params.get("$where").unwrap_or_default();
                let start = filter
                    .split("ts >= '")
                    .nth(1)
                    .and_then(|rest| rest.split('\'').next())
                    .unwrap_or_default();
                let mut row = Row::new();
                row.insert("ts".into(), Value::from(start));
                Ok(vec![row])
            }
        }
        let mut sorted = config();
        sorted.sort_by_timestamp = true;
        sorted.step = TimeDelta::days(1);
        let fetcher = WindowedFetcher::new(sorted, Stamped);
        let report = fetcher
            .fetch(&["A"], &[TimeRange::new(day(0), day(10))])
            .unwrap();
        let stamps: Vec<&str> = report
            .combined
            .rows()
            .iter()
            .filter_map(|row| row.get("ts").and_then(Value::as_str))
            .collect();
        assert_eq!(stamps.len(), 10);
        assert!(stamps.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
