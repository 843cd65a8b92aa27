//! Hour-of-day speed profiles derived from traffic-speed rows.
//!
//! Raw observations arrive roughly once a minute per link. They are smoothed
//! to hourly means first, and the hourly means are averaged again per
//! hour-of-day to produce the weekday profile for one link.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;

use crate::constants::bucketing::{
    DEFAULT_POLICY_CUTOFF, FPS_TO_MPH, PERIOD_LABEL_IN_EFFECT, PERIOD_LABEL_PRE,
};
use crate::date_helpers::{floor_to_hour, parse_timestamp, weekday_name};
use crate::types::{EntityId, Row};

/// One parsed speed reading.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeedObservation {
    /// Link the reading belongs to.
    pub entity_id: EntityId,
    /// Reading time.
    pub timestamp: NaiveDateTime,
    /// Speed in miles per hour.
    pub mph: f64,
}

impl SpeedObservation {
    /// Parse a row, returning `None` when any of the three fields is missing or unusable.
    ///
    /// Speeds may be JSON numbers or numeric strings, in feet per second.
    pub fn from_row(
        row: &Row,
        entity_field: &str,
        timestamp_field: &str,
        speed_field: &str,
    ) -> Option<Self> {
        let entity_id = row.get(entity_field)?.as_str()?.to_string();
        let timestamp = parse_timestamp(row.get(timestamp_field)?.as_str()?)?;
        let fps = match row.get(speed_field)? {
            Value::Number(number) => number.as_f64()?,
            Value::String(text) => text.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        if !fps.is_finite() {
            return None;
        }
        Some(Self {
            entity_id,
            timestamp,
            mph: fps * FPS_TO_MPH,
        })
    }
}

/// Parse every row in parallel, dropping the ones that do not parse.
pub fn observations_from_rows(
    rows: &[Row],
    entity_field: &str,
    timestamp_field: &str,
    speed_field: &str,
) -> Vec<SpeedObservation> {
    rows.par_iter()
        .filter_map(|row| {
            SpeedObservation::from_row(row, entity_field, timestamp_field, speed_field)
        })
        .collect()
}

/// Which side of the policy cutoff an observation falls on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Period {
    /// Before the cutoff.
    PrePolicy,
    /// At or after the cutoff.
    PolicyInEffect,
}

impl Period {
    /// Period of `ts` relative to `cutoff`.
    pub fn classify(ts: &NaiveDateTime, cutoff: &NaiveDateTime) -> Self {
        if ts < cutoff {
            Period::PrePolicy
        } else {
            Period::PolicyInEffect
        }
    }

    /// Display label.
    pub fn label(self) -> &'static str {
        match self {
            Period::PrePolicy => PERIOD_LABEL_PRE,
            Period::PolicyInEffect => PERIOD_LABEL_IN_EFFECT,
        }
    }
}

/// Start of the default policy period.
pub fn default_policy_cutoff() -> NaiveDateTime {
    let (year, month, day) = DEFAULT_POLICY_CUTOFF;
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Mean speed of one link over one clock hour.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HourlyMean {
    /// Link the mean belongs to.
    pub entity_id: EntityId,
    /// Observation time floored to the hour.
    pub hour: NaiveDateTime,
    /// Weekday of `hour`.
    pub weekday: Weekday,
    /// Period of `hour`.
    pub period: Period,
    /// Mean speed in miles per hour.
    pub mph: f64,
    /// Observations averaged.
    pub samples: usize,
}

/// Group observations by (link, hour, period) and average each group.
///
/// Output is ordered by link then hour.
pub fn hourly_means(observations: &[SpeedObservation], cutoff: &NaiveDateTime) -> Vec<HourlyMean> {
    let mut groups: BTreeMap<(&str, NaiveDateTime, Period), (f64, usize)> = BTreeMap::new();
    for observation in observations {
        let hour = floor_to_hour(&observation.timestamp);
        let period = Period::classify(&hour, cutoff);
        let entry = groups
            .entry((observation.entity_id.as_str(), hour, period))
            .or_insert((0.0, 0));
        entry.0 += observation.mph;
        entry.1 += 1;
    }
    groups
        .into_iter()
        .map(|((entity_id, hour, period), (sum, samples))| HourlyMean {
            entity_id: entity_id.to_string(),
            hour,
            weekday: hour.weekday(),
            period,
            mph: sum / samples as f64,
            samples,
        })
        .collect()
}

/// Average hourly speed at one hour of the day for one period.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HourOfDayMean {
    /// Hour of day, `0..24`.
    pub hour: u32,
    /// Period the hourly means were drawn from.
    pub period: Period,
    /// Mean speed in miles per hour.
    pub mph: f64,
    /// Number of hourly means averaged.
    pub hours: usize,
}

impl HourOfDayMean {
    /// `HH:MM` label used for sorting.
    pub fn hour_key(&self) -> String {
        format!("{:02}:00", self.hour)
    }

    /// 12-hour clock label, e.g. `07:00 AM`.
    pub fn hour_label(&self) -> String {
        let (suffix, twelve) = match self.hour {
            0 => ("AM", 12),
            h @ 1..=11 => ("AM", h),
            12 => ("PM", 12),
            h => ("PM", h - 12),
        };
        format!("{twelve:02}:00 {suffix}")
    }
}

/// Hour-of-day profile for one link on one weekday, ordered by hour then period.
pub fn profile(hourly: &[HourlyMean], entity_id: &str, weekday: Weekday) -> Vec<HourOfDayMean> {
    let mut groups: BTreeMap<(u32, Period), (f64, usize)> = BTreeMap::new();
    for mean in hourly
        .iter()
        .filter(|mean| mean.entity_id == entity_id && mean.weekday == weekday)
    {
        let entry = groups
            .entry((mean.hour.hour(), mean.period))
            .or_insert((0.0, 0));
        entry.0 += mean.mph;
        entry.1 += 1;
    }
    groups
        .into_iter()
        .map(|((hour, period), (sum, hours))| HourOfDayMean {
            hour,
            period,
            mph: sum / hours as f64,
            hours,
        })
        .collect()
}

/// Human readable profile title, e.g. `57th Street ... on Monday`.
pub fn profile_title(entity_id: &str, weekday: Weekday) -> String {
    format!("{entity_id} on {}", weekday_name(weekday))
}
