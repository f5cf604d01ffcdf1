//! Parsing of the AudioMoth `ICMT` comment.
//!
//! The comment opens with `Recorded at HH:MM:SS DD/MM/YYYY (UTC[±H[:MM]])`
//! followed by free text that may carry `XX.XC` temperature and `X.XV`
//! battery markers (or the saturated `greater than 4.9V` / `less than
//! 2.5V` forms).

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

static RECORDED_AT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Recorded at (\d{2}):(\d{2}):(\d{2}) (\d{2})/(\d{2})/(\d{4}) \(UTC([-+]\d{1,2})?(?::(\d{2}))?\)",
    )
    .unwrap()
});

static TEMPERATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d+\.\d)C").unwrap());

static BATTERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d\.\d)V").unwrap());

/// The recording time carried by a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordedAt {
    /// UTC epoch milliseconds.
    pub timestamp: i64,
    /// Offset of the recording timezone from UTC.
    pub timezone_minutes: i32,
}

/// Parses the leading `Recorded at` fields of a comment.
pub(crate) fn parse_recorded_at(comment: &str) -> Option<RecordedAt> {
    let captures = RECORDED_AT.captures(comment)?;
    let hour: u32 = captures[1].parse().ok()?;
    let minute: u32 = captures[2].parse().ok()?;
    let second: u32 = captures[3].parse().ok()?;
    let day: u32 = captures[4].parse().ok()?;
    let month: u32 = captures[5].parse().ok()?;
    let year: i32 = captures[6].parse().ok()?;

    let offset_hours: i32 = captures
        .get(7)
        .map(|m| m.as_str().parse().ok())
        .unwrap_or(Some(0))?;
    let offset_minutes: i32 = captures
        .get(8)
        .map(|m| m.as_str().parse().ok())
        .unwrap_or(Some(0))?;
    let timezone_minutes = offset_hours * 60 + offset_hours.signum() * offset_minutes;

    let local = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    let timestamp = local.and_utc().timestamp_millis() - timezone_minutes as i64 * 60_000;
    Some(RecordedAt {
        timestamp,
        timezone_minutes,
    })
}

/// Extracts the `XX.XC` temperature marker.
pub(crate) fn parse_temperature(comment: &str) -> Option<f64> {
    TEMPERATURE.captures(comment)?[1].parse().ok()
}

/// Extracts the battery voltage marker. The saturated `greater than
/// 4.9V` and `less than 2.5V` forms map to their bounds.
pub(crate) fn parse_battery_voltage(comment: &str) -> Option<f64> {
    if comment.contains("greater than 4.9V") {
        return Some(4.9);
    }
    if comment.contains("less than 2.5V") {
        return Some(2.5);
    }
    BATTERY.captures(comment)?[1].parse().ok()
}

/// Formats a UTC timestamp as local time under the given offset.
pub(crate) fn format_local_datetime(
    timestamp: i64,
    timezone_minutes: i32,
    pattern: &str,
) -> Option<String> {
    let local = DateTime::<Utc>::from_timestamp_millis(
        timestamp + timezone_minutes as i64 * 60_000,
    )?;
    Some(local.format(pattern).to_string())
}

/// Formats a timezone offset the way the comment carries it: `(UTC)`,
/// `(UTC+1)`, `(UTC-3:30)`.
pub(crate) fn format_timezone(timezone_minutes: i32) -> String {
    if timezone_minutes == 0 {
        return "(UTC)".to_owned();
    }
    let hours = timezone_minutes / 60;
    let minutes = (timezone_minutes % 60).abs();
    if minutes == 0 {
        format!("(UTC{hours:+})")
    } else {
        format!("(UTC{hours:+}:{minutes:02})")
    }
}
