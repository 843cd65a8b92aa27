#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Per-task outcomes and the combined result.
pub mod aggregate;
/// Command-line runners shared by the demos.
pub mod apps;
/// Hour-of-day speed profiles.
pub mod bucketing;
/// TTL response cache and the caching row source.
pub mod cache;
/// Row sources and response parsing.
pub mod client;
/// Fetcher configuration types.
pub mod config;
/// Centralized constants used across partitioning, querying, and the CLI.
pub mod constants;
/// Timestamp parsing and formatting helpers.
pub mod date_helpers;
/// Bounded concurrent task execution.
pub mod executor;
/// Windowed fetch facade.
pub mod fetcher;
/// Coverage metrics over combined rows.
pub mod metrics;
/// Time-range partitioning.
pub mod partition;
/// Filter expressions and query parameters.
pub mod query;
/// Fetch task expansion.
pub mod tasks;
/// Shared type aliases.
pub mod types;

mod errors;

pub use aggregate::{
    Aggregator, CombinedResult, FailedTask, FetchReport, FetchSummary, PartialResult, TaskOutcome,
};
pub use cache::{CacheConfig, CacheStats, CachedRowSource, ResponseCache};
pub use client::{HttpRowSource, RowSource, load_rows, parse_rows};
pub use config::{FetcherConfig, RetryPolicy};
pub use errors::FetchError;
pub use executor::{CancelToken, Executor};
pub use fetcher::WindowedFetcher;
pub use metrics::{EntityCoverage, EntityShare, entity_coverage};
pub use partition::{FinalWindow, TimeRange, Window, Windows, partition};
pub use query::{Filter, Predicate, QueryParams, TaskQuery};
pub use tasks::{FetchTask, TaskState, expand};
pub use types::{CacheKey, Endpoint, EntityId, FieldName, FilterExpr, Row};
