use chrono::{NaiveDate, NaiveDateTime, Timelike, Weekday};

use crate::constants::query::TIMESTAMP_FORMAT;

/// Parse a timestamp as returned by tabular endpoints or typed on the command line.
///
/// Accepts `YYYY-MM-DDTHH:MM:SS` with optional fractional seconds, the same with a
/// space separator, and bare `YYYY-MM-DD` (anchored to midnight). A trailing `Z`
/// is ignored. Returns `None` when parsing fails.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Render a timestamp the way filter expressions expect it.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Truncate a timestamp to the start of its hour.
pub fn floor_to_hour(ts: &NaiveDateTime) -> NaiveDateTime {
    ts.date()
        .and_hms_opt(ts.hour(), 0, 0)
        .unwrap_or(*ts)
}

/// Full English weekday name (`Monday` .. `Sunday`).
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Parse a weekday from its English name or three-letter abbreviation.
pub fn parse_weekday(raw: &str) -> Option<Weekday> {
    raw.trim().parse::<Weekday>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn parses_endpoint_and_cli_timestamp_formats() {
        assert_eq!(
            parse_timestamp("2024-08-01T06:15:00.000"),
            Some(at(2024, 8, 1, 6, 15, 0))
        );
        assert_eq!(
            parse_timestamp("2024-08-01T06:15:00"),
            Some(at(2024, 8, 1, 6, 15, 0))
        );
        assert_eq!(
            parse_timestamp("2024-08-01 06:15:00"),
            Some(at(2024, 8, 1, 6, 15, 0))
        );
        assert_eq!(
            parse_timestamp("2024-08-01T06:15"),
            Some(at(2024, 8, 1, 6, 15, 0))
        );
        assert_eq!(
            parse_timestamp(" 2024-08-01 "),
            Some(at(2024, 8, 1, 0, 0, 0))
        );
        assert_eq!(
            parse_timestamp("2024-08-01T06:15:00Z"),
            Some(at(2024, 8, 1, 6, 15, 0))
        );
        assert_eq!(parse_timestamp("2024-13-01"), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn formats_with_millisecond_precision() {
        assert_eq!(
            format_timestamp(&at(2024, 8, 1, 0, 0, 0)),
            "2024-08-01T00:00:00.000"
        );
    }

    #[test]
    fn floors_to_hour_and_names_weekdays() {
        assert_eq!(
            floor_to_hour(&at(2025, 1, 6, 17, 59, 59)),
            at(2025, 1, 6, 17, 0, 0)
        );
        assert_eq!(weekday_name(Weekday::Mon), "Monday");
        assert_eq!(parse_weekday("friday"), Some(Weekday::Fri));
        assert_eq!(parse_weekday("Sun"), Some(Weekday::Sun));
        assert_eq!(parse_weekday("someday"), None);
    }
}
