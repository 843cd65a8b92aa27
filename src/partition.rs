//! Time-range partitioning into fixed-size request windows.
//!
//! A requested `[start, end)` range is walked from `start` in increments of
//! `step`. Windows never overlap and leave no gaps. How the last window treats
//! `end` is controlled by [`FinalWindow`].

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::date_helpers::{format_timestamp, parse_timestamp};
use crate::errors::FetchError;

/// Coarse half-open time range requested by a caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub start: NaiveDateTime,
    /// Exclusive upper bound.
    pub end: NaiveDateTime,
}

impl TimeRange {
    /// Build a range. Ranges with `start >= end` are allowed and yield no windows.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Range covering the `span` leading up to `end`.
    pub fn trailing(end: NaiveDateTime, span: TimeDelta) -> Self {
        Self {
            start: end - span,
            end,
        }
    }

    /// Returns `true` when the range covers no time at all.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Lazily split this range into windows of `step`.
    pub fn windows(&self, step: TimeDelta, mode: FinalWindow) -> Windows {
        partition(self.start, self.end, step, mode)
    }

    /// Parse `START..END` where each side is a date or a timestamp.
    ///
    /// Example: `2024-08-01..2024-10-01`.
    pub fn parse(raw: &str) -> Result<Self, FetchError> {
        let (start_raw, end_raw) = raw
            .split_once("..")
            .ok_or_else(|| FetchError::InvalidRange(format!("'{raw}' is not START..END")))?;
        let start = parse_timestamp(start_raw).ok_or_else(|| {
            FetchError::InvalidRange(format!("could not parse range start '{start_raw}'"))
        })?;
        let end = parse_timestamp(end_raw).ok_or_else(|| {
            FetchError::InvalidRange(format!("could not parse range end '{end_raw}'"))
        })?;
        Ok(Self { start, end })
    }
}

/// How the last window of a range handles the requested upper bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinalWindow {
    /// Every window end is capped at the range end.
    #[default]
    Clamp,
    /// The last window keeps its full step and may extend past the range end
    /// by less than one step.
    Overrun,
}

/// One request window produced by the partitioner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Window {
    /// Inclusive lower bound.
    pub start: NaiveDateTime,
    /// Exclusive upper bound.
    pub end: NaiveDateTime,
}

impl Window {
    /// Returns `true` when `ts` falls inside `[start, end)`.
    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        *ts >= self.start && *ts < self.end
    }

    /// Length of the window.
    pub fn span(&self) -> TimeDelta {
        self.end - self.start
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})",
            format_timestamp(&self.start),
            format_timestamp(&self.end)
        )
    }
}

/// Lazy iterator over the windows of one range.
#[derive(Clone, Debug)]
pub struct Windows {
    cursor: NaiveDateTime,
    end: NaiveDateTime,
    step: TimeDelta,
    mode: FinalWindow,
}

/// Split `[start, end)` into contiguous windows of `step`.
///
/// Produces nothing when `start >= end` or when `step` is not positive.
pub fn partition(
    start: NaiveDateTime,
    end: NaiveDateTime,
    step: TimeDelta,
    mode: FinalWindow,
) -> Windows {
    Windows {
        cursor: start,
        end,
        step,
        mode,
    }
}

impl Windows {
    fn remaining(&self) -> usize {
        if self.step <= TimeDelta::zero() || self.cursor >= self.end {
            return 0;
        }
        let span = self.end - self.cursor;
        let (span, step) = match (span.num_nanoseconds(), self.step.num_nanoseconds()) {
            (Some(span), Some(step)) => (i128::from(span), i128::from(step)),
            _ => (
                i128::from(span.num_milliseconds()),
                i128::from(self.step.num_milliseconds().max(1)),
            ),
        };
        ((span + step - 1) / step) as usize
    }
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.step <= TimeDelta::zero() || self.cursor >= self.end {
            return None;
        }
        let start = self.cursor;
        let stepped = start.checked_add_signed(self.step).unwrap_or(self.end);
        let end = match self.mode {
            FinalWindow::Clamp => stepped.min(self.end),
            FinalWindow::Overrun => stepped,
        };
        self.cursor = stepped;
        Some(Window { start, end })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows {}
