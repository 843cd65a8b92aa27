use std::time::Duration;

use chrono::TimeDelta;

use crate::constants::client::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::constants::executor::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_WORKERS, DEFAULT_RETRY_BACKOFF_MS,
};
use crate::constants::partition::DEFAULT_STEP_DAYS;
use crate::constants::query::DEFAULT_ROW_LIMIT;
use crate::constants::speeds::{
    DEFAULT_ENDPOINT, DEFAULT_MIN_SAMPLES, ENTITY_FIELD, SAMPLES_FIELD, TIMESTAMP_FIELD,
};
use crate::errors::FetchError;
use crate::partition::FinalWindow;
use crate::query::{Predicate, TaskQuery};
use crate::types::{Endpoint, FieldName};

/// Per-task retry behavior. Only transport failures are retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per task, including the first. `1` disables retries.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

/// Top-level windowed fetch configuration.
#[derive(Clone, Debug)]
pub struct FetcherConfig {
    /// Endpoint every task is sent to.
    pub endpoint: Endpoint,
    /// Field compared for equality against each entity id.
    pub entity_field: FieldName,
    /// Timestamp field bounded by each task window.
    pub timestamp_field: FieldName,
    /// Extra predicates added to every task filter.
    pub extra_predicates: Vec<Predicate>,
    /// Window size used to partition each requested range.
    pub step: TimeDelta,
    /// Whether the last window of a range is clamped to the range end.
    pub final_window: FinalWindow,
    /// Ceiling on simultaneously outstanding requests.
    pub max_workers: usize,
    /// Row ceiling sent with each request.
    pub row_limit: usize,
    /// Retry behavior for transport failures.
    pub retry: RetryPolicy,
    /// Global timeout for one HTTP request.
    pub request_timeout: Duration,
    /// Sort combined rows by `timestamp_field` before returning them.
    pub sort_by_timestamp: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            entity_field: ENTITY_FIELD.to_string(),
            timestamp_field: TIMESTAMP_FIELD.to_string(),
            extra_predicates: vec![Predicate::Gt(
                SAMPLES_FIELD.to_string(),
                DEFAULT_MIN_SAMPLES,
            )],
            step: TimeDelta::days(DEFAULT_STEP_DAYS),
            final_window: FinalWindow::default(),
            max_workers: DEFAULT_MAX_WORKERS,
            row_limit: DEFAULT_ROW_LIMIT,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            sort_by_timestamp: false,
        }
    }
}

impl FetcherConfig {
    /// Configuration for an arbitrary endpoint with no extra predicates.
    pub fn for_endpoint(
        endpoint: impl Into<Endpoint>,
        entity_field: impl Into<FieldName>,
        timestamp_field: impl Into<FieldName>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            entity_field: entity_field.into(),
            timestamp_field: timestamp_field.into(),
            extra_predicates: Vec::new(),
            ..Self::default()
        }
    }

    /// Reject settings that would make a fetch meaningless.
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.endpoint.trim().is_empty() {
            return Err(FetchError::Configuration("endpoint must not be empty".into()));
        }
        if self.entity_field.trim().is_empty() || self.timestamp_field.trim().is_empty() {
            return Err(FetchError::Configuration(
                "entity and timestamp fields must not be empty".into(),
            ));
        }
        if self.step <= TimeDelta::zero() {
            return Err(FetchError::Configuration(format!(
                "window step must be positive, got {}",
                self.step
            )));
        }
        if self.max_workers == 0 {
            return Err(FetchError::Configuration(
                "max_workers must be greater than zero".into(),
            ));
        }
        if self.row_limit == 0 {
            return Err(FetchError::Configuration(
                "row_limit must be greater than zero".into(),
            ));
        }
        for predicate in &self.extra_predicates {
            match predicate {
                Predicate::Gt(field, value)
                | Predicate::Gte(field, value)
                | Predicate::Lt(field, value)
                    if !value.is_finite() =>
                {
                    return Err(FetchError::Configuration(format!(
                        "threshold for '{field}' must be a finite number, got {value}"
                    )));
                }
                _ => {}
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(FetchError::Configuration(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Request template derived from this configuration.
    pub fn task_query(&self) -> TaskQuery {
        TaskQuery {
            endpoint: self.endpoint.clone(),
            entity_field: self.entity_field.clone(),
            timestamp_field: self.timestamp_field.clone(),
            extra: self.extra_predicates.clone(),
            row_limit: self.row_limit,
        }
    }
}
