use std::collections::HashMap;
use std::env;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta, Weekday};
use clap::{Parser, error::ErrorKind};

use crate::aggregate::FetchReport;
use crate::bucketing::{
    default_policy_cutoff, hourly_means, observations_from_rows, profile, profile_title,
};
use crate::client::{HttpRowSource, RowSource};
use crate::config::{FetcherConfig, RetryPolicy};
use crate::constants::speeds::{
    BASELINE_END, BASELINE_START, DEFAULT_ENDPOINT, DEFAULT_LINKS, ENDPOINT_ENV, RECENT_WEEKS,
    SAMPLES_FIELD, SPEED_FIELD,
};
use crate::date_helpers::{format_timestamp, parse_weekday};
use crate::errors::FetchError;
use crate::fetcher::WindowedFetcher;
use crate::metrics::{coverage_from_counts, entity_counts};
use crate::partition::{FinalWindow, TimeRange};
use crate::query::Predicate;
use crate::types::Row;

#[derive(Debug, Parser)]
#[command(
    name = "fetch_speeds",
    disable_help_subcommand = true,
    about = "Fetch windowed traffic-speed rows",
    long_about = "Split each requested range into fixed-size windows, fetch every (link, window) pair concurrently, and summarize the combined rows.",
    after_help = "The endpoint is resolved in order by explicit arg, the WINDOWED_FETCH_ENDPOINT environment variable, then the NYC traffic-speed dataset."
)]
/// CLI for `fetch_speeds`.
///
/// Common usage:
/// - Default links and ranges: no arguments
/// - One link over one month: `--entity "<link>" --range 2024-08-01..2024-09-01`
/// - Persist rows: `--output /tmp/speeds.jsonl`
struct FetchSpeedsCli {
    #[arg(long, value_name = "URL", help = "Endpoint override")]
    endpoint: Option<String>,
    #[arg(
        long = "entity",
        value_name = "LINK",
        help = "Link name to fetch, repeat as needed (defaults to the monitored links)"
    )]
    entities: Vec<String>,
    #[arg(
        long = "range",
        value_name = "START..END",
        value_parser = parse_range_arg,
        help = "Half-open range to fetch, repeat as needed (defaults to Aug-Sep 2024 plus the last 6 weeks)"
    )]
    ranges: Vec<TimeRange>,
    #[arg(
        long = "step-days",
        default_value_t = 7,
        value_parser = parse_positive_i64,
        help = "Window size in days"
    )]
    step_days: i64,
    #[arg(
        long,
        default_value_t = 10,
        value_parser = parse_positive_usize,
        help = "Maximum simultaneous requests"
    )]
    workers: usize,
    #[arg(
        long,
        default_value_t = 50_000,
        value_parser = parse_positive_usize,
        help = "Row ceiling per request"
    )]
    limit: usize,
    #[arg(
        long = "min-samples",
        default_value_t = 5.0,
        value_parser = parse_finite_f64,
        help = "Only keep rows with more than this many samples"
    )]
    min_samples: f64,
    #[arg(
        long = "overrun-final-window",
        help = "Let the last window of each range extend a full step past its end"
    )]
    overrun_final_window: bool,
    #[arg(
        long,
        default_value_t = 0,
        help = "Extra attempts for requests that fail in transport"
    )]
    retries: u32,
    #[arg(long, help = "Sort combined rows by timestamp")]
    sort: bool,
    #[arg(
        long,
        value_name = "PATH",
        help = "Write combined rows as JSON lines"
    )]
    output: Option<PathBuf>,
    #[arg(
        long = "profile-entity",
        value_name = "LINK",
        help = "Link used for the hourly profile (defaults to the first fetched link)"
    )]
    profile_entity: Option<String>,
    #[arg(
        long,
        default_value = "Monday",
        value_parser = parse_weekday_arg,
        help = "Weekday used for the hourly profile"
    )]
    weekday: Weekday,
    #[arg(
        long = "summary-only",
        help = "Print the fetch summary and skip coverage and profile output"
    )]
    summary_only: bool,
}

/// Fetch traffic speeds over HTTP and print the summary.
pub fn run_fetch_speeds<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    run_fetch_speeds_with(args_iter, HttpRowSource::new)
}

/// Same as [`run_fetch_speeds`] with a caller-provided row source.
///
/// `build_source` receives the per-request timeout.
pub fn run_fetch_speeds_with<S, Build, I>(
    args_iter: I,
    build_source: Build,
) -> Result<(), Box<dyn Error>>
where
    S: RowSource,
    Build: FnOnce(Duration) -> S,
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<FetchSpeedsCli, _>(
        std::iter::once("fetch_speeds".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let config = FetcherConfig {
        endpoint: resolve_endpoint(cli.endpoint.clone()),
        extra_predicates: vec![Predicate::Gt(SAMPLES_FIELD.to_string(), cli.min_samples)],
        step: TimeDelta::days(cli.step_days),
        final_window: if cli.overrun_final_window {
            FinalWindow::Overrun
        } else {
            FinalWindow::Clamp
        },
        max_workers: cli.workers,
        row_limit: cli.limit,
        retry: RetryPolicy {
            max_attempts: cli.retries.saturating_add(1),
            ..RetryPolicy::default()
        },
        sort_by_timestamp: cli.sort,
        ..FetcherConfig::default()
    };
    config.validate()?;

    let entities: Vec<String> = if cli.entities.is_empty() {
        DEFAULT_LINKS.iter().map(|link| link.to_string()).collect()
    } else {
        cli.entities.clone()
    };
    let ranges = if cli.ranges.is_empty() {
        default_ranges(Local::now().naive_local())
    } else {
        cli.ranges.clone()
    };

    let source = build_source(config.request_timeout);
    let fetcher = WindowedFetcher::new(config, source);
    let planned = fetcher.plan(&entities, &ranges).len();

    println!("=== windowed fetch ===");
    println!("endpoint: {}", fetcher.config().endpoint);
    println!("entities: {}", entities.len());
    for range in &ranges {
        println!(
            "range: [{}, {})",
            format_timestamp(&range.start),
            format_timestamp(&range.end)
        );
    }
    println!(
        "step: {} days, workers: {}, planned tasks: {}",
        cli.step_days, cli.workers, planned
    );
    println!();

    let report = fetcher.fetch(&entities, &ranges)?;
    print_summary(&report);

    if let Some(path) = &cli.output {
        let written = write_json_lines(path, report.combined.rows())?;
        println!("wrote {} rows to {}", written, path.display());
        println!();
    }

    if cli.summary_only {
        return Ok(());
    }

    print_coverage(&report, &entities, &fetcher.config().entity_field);

    let profile_entity = cli
        .profile_entity
        .clone()
        .or_else(|| entities.first().cloned());
    if let Some(entity) = profile_entity {
        print_profile(&report, fetcher.config(), &entity, cli.weekday);
    }
    Ok(())
}

fn resolve_endpoint(explicit: Option<String>) -> String {
    explicit
        .filter(|value| !value.trim().is_empty())
        .or_else(|| {
            env::var(ENDPOINT_ENV)
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
}

fn default_ranges(now: NaiveDateTime) -> Vec<TimeRange> {
    let day = |(year, month, day): (i32, u32, u32)| {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap_or_default()
    };
    vec![
        TimeRange::new(day(BASELINE_START), day(BASELINE_END)),
        TimeRange::trailing(now, TimeDelta::weeks(RECENT_WEEKS)),
    ]
}

fn print_summary(report: &FetchReport) {
    let summary = &report.summary;
    println!("[SUMMARY]");
    println!("  tasks: {}", summary.tasks);
    println!("  with rows: {}", summary.with_rows);
    println!("  empty: {}", summary.empty);
    println!("  failed: {}", summary.failed);
    println!("  cancelled: {}", summary.cancelled);
    println!("  rows: {}", summary.rows);
    println!("  elapsed: {:.2?}", summary.elapsed);
    if !summary.failures.is_empty() {
        println!("  failures:");
        for failure in &summary.failures {
            println!(
                "    {} {} => {}",
                failure.task.entity_id,
                failure.task.window(),
                failure.error
            );
        }
    }
    println!();
}

fn print_coverage(report: &FetchReport, entities: &[String], entity_field: &str) {
    let mut counts: HashMap<String, usize> = entity_counts(report.combined.rows(), entity_field);
    for entity in entities {
        counts.entry(entity.clone()).or_insert(0);
    }
    println!("[ENTITY COVERAGE]");
    let Some(coverage) = coverage_from_counts(&counts) else {
        println!("  no entities");
        println!();
        return;
    };
    for share in &coverage.per_entity {
        println!(
            "  {} => {} rows ({:.1}%)",
            share.entity_id,
            share.count,
            share.share * 100.0
        );
    }
    if coverage.ratio.is_finite() {
        println!("  max/min ratio: {:.2}", coverage.ratio);
    } else {
        println!("  max/min ratio: inf (some entities returned no rows)");
    }
    println!();
}

fn print_profile(report: &FetchReport, config: &FetcherConfig, entity: &str, weekday: Weekday) {
    let observations = observations_from_rows(
        report.combined.rows(),
        &config.entity_field,
        &config.timestamp_field,
        SPEED_FIELD,
    );
    let hourly = hourly_means(&observations, &default_policy_cutoff());
    let series = profile(&hourly, entity, weekday);
    println!("[HOURLY PROFILE] {}", profile_title(entity, weekday));
    if series.is_empty() {
        println!("  no observations");
    }
    for point in &series {
        println!(
            "  {} {:<13} {:>6.2} mph",
            point.hour_label(),
            point.period.label(),
            point.mph
        );
    }
    println!();
}

fn write_json_lines(path: &Path, rows: &[Row]) -> Result<usize, FetchError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut writer, row).map_err(io::Error::from)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(rows.len())
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{}' as a positive integer", raw))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_positive_i64(raw: &str) -> Result<i64, String> {
    let parsed = raw
        .parse::<i64>()
        .map_err(|_| format!("Could not parse '{}' as a positive integer", raw))?;
    if parsed <= 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_finite_f64(raw: &str) -> Result<f64, String> {
    let parsed = raw
        .parse::<f64>()
        .map_err(|_| format!("Could not parse '{}' as a number", raw))?;
    if !parsed.is_finite() {
        return Err(format!("'{}' is not a finite number", raw));
    }
    Ok(parsed)
}

fn parse_range_arg(raw: &str) -> Result<TimeRange, String> {
    TimeRange::parse(raw).map_err(|err| err.to_string())
}

fn parse_weekday_arg(raw: &str) -> Result<Weekday, String> {
    parse_weekday(raw).ok_or_else(|| format!("'{}' is not a weekday", raw))
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<FetchSpeedsCli, clap::Error> {
        FetchSpeedsCli::try_parse_from(std::iter::once("fetch_speeds").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_match_the_speed_page() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.step_days, 7);
        assert_eq!(cli.workers, 10);
        assert_eq!(cli.limit, 50_000);
        assert_eq!(cli.weekday, Weekday::Mon);
        assert!(cli.entities.is_empty());
        assert!(!cli.overrun_final_window);
    }

    #[test]
    fn repeated_ranges_and_entities_accumulate() {
        let cli = parse(&[
            "--entity",
            "A",
            "--entity",
            "B",
            "--range",
            "2024-08-01..2024-08-15",
            "--range",
            "2024-09-01T06:00..2024-09-02",
            "--weekday",
            "fri",
        ])
        .unwrap();
        assert_eq!(cli.entities, vec!["A", "B"]);
        assert_eq!(cli.ranges.len(), 2);
        assert_eq!(cli.weekday, Weekday::Fri);
    }

    #[test]
    fn rejects_zero_and_malformed_values() {
        assert!(parse(&["--workers", "0"]).is_err());
        assert!(parse(&["--step-days", "-1"]).is_err());
        assert!(parse(&["--range", "2024-08-01"]).is_err());
        assert!(parse(&["--weekday", "someday"]).is_err());
        assert!(parse(&["--min-samples", "NaN"]).is_err());
        assert!(parse(&["--min-samples", "inf"]).is_err());
        assert_eq!(parse(&["--min-samples", "2.5"]).unwrap().min_samples, 2.5);
    }

    #[test]
    fn explicit_endpoint_wins_over_default() {
        assert_eq!(
            resolve_endpoint(Some("http://fixture/x.json".into())),
            "http://fixture/x.json"
        );
    }

    #[test]
    fn default_ranges_cover_baseline_and_recent_weeks() {
        let now = NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let ranges = default_ranges(now);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].start.to_string(), "2024-08-01 00:00:00");
        assert_eq!(ranges[0].end.to_string(), "2024-10-01 00:00:00");
        assert_eq!(ranges[1].end, now);
        assert_eq!(ranges[1].end - ranges[1].start, TimeDelta::weeks(6));
    }

    #[test]
    fn json_lines_write_failures_surface_as_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent").join("rows.jsonl");
        let err = write_json_lines(&missing, &[Row::new()]).unwrap_err();
        assert!(matches!(err, FetchError::Io(_)));

        let path = dir.path().join("rows.jsonl");
        assert_eq!(write_json_lines(&path, &[Row::new(), Row::new()]).unwrap(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n{}\n");
    }

    #[test]
    fn help_is_not_an_error() {
        let result = parse_cli::<FetchSpeedsCli, _>(["fetch_speeds", "--help"]);
        assert!(matches!(result, Ok(None)));
    }
}
