//! GPS.TXT fix-log parsing.
//!
//! The unsynchronised firmware logs one line per event, each stamped
//! `DD/MM/YYYY HH:MM:SS.mmm UTC:`. A usable fix is three consecutive
//! events that reconcile: the GPS fix itself, the next second's clock
//! outcome (set, updated by some milliseconds, or not updated), and the
//! measured sample rate.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::{Error, Result};

/// Clock corrections are held in tenths of a millisecond.
pub(crate) const TIME_OFFSET_MULTIPLIER: i64 = 10;

/// The longest gap, in milliseconds, between the events of one fix.
const EVENT_WINDOW_MILLISECONDS: i64 = 2000;

static LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2})/(\d{2})/(\d{4}) (\d{2}):(\d{2}):(\d{2})\.(\d{3}) UTC: (.+?)\s*$")
        .unwrap()
});

static FIX_EVENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Received GPS fix - (\d+\.\d+)([NS]) (\d+\.\d+)([EW])$").unwrap()
});

static TIME_SET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Time was set$").unwrap());

static TIME_UPDATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Time was updated by (\d+(?:\.\d+)?)ms (fast|slow)$").unwrap()
});

static TIME_NOT_UPDATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Time was not updated$").unwrap());

static SAMPLE_RATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Actual sample rate will be (\d+(?:\.\d+)?) Hz$").unwrap()
});

/// One committed GPS fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Fix {
    /// UTC epoch milliseconds of the clock outcome.
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// Clock correction in tenths of a millisecond; positive when the
    /// clock ran slow (true time later than stamped).
    pub time_offset: i64,
    /// Measured sample rate in millihertz.
    pub sample_rate: i64,
}

fn line_timestamp(captures: &regex::Captures<'_>) -> Option<i64> {
    let day: u32 = captures[1].parse().ok()?;
    let month: u32 = captures[2].parse().ok()?;
    let year: i32 = captures[3].parse().ok()?;
    let hour: u32 = captures[4].parse().ok()?;
    let minute: u32 = captures[5].parse().ok()?;
    let second: u32 = captures[6].parse().ok()?;
    let millisecond: u32 = captures[7].parse().ok()?;
    let datetime = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    Some(datetime.and_utc().timestamp_millis() + millisecond as i64)
}

/// Streams the log at `path` into committed fixes.
///
/// Fails with [`Error::TimeSourceInvalid`] when the clock was never set
/// from the GPS, and [`Error::InsufficientFixes`] when fewer than two
/// fixes commit.
pub(crate) fn read_fix_log(path: &Path) -> Result<Vec<Fix>> {
    let file = File::open(path).map_err(Error::InputReadFailed)?;
    let reader = BufReader::new(file);

    let mut time_was_set = false;
    let mut pending_fix: Option<(i64, f64, f64)> = None;
    let mut pending_time: Option<(i64, i64)> = None;
    let mut fixes = Vec::new();

    for line in reader.lines() {
        let line = line.map_err(Error::InputReadFailed)?;
        let Some(captures) = LINE.captures(&line) else {
            continue;
        };
        let Some(timestamp) = line_timestamp(&captures) else {
            continue;
        };
        let event = captures.get(8).map(|m| m.as_str()).unwrap_or("");

        if let Some(fix) = FIX_EVENT.captures(event) {
            let latitude: Option<f64> = fix[1].parse().ok();
            let longitude: Option<f64> = fix[3].parse().ok();
            if let (Some(mut latitude), Some(mut longitude)) = (latitude, longitude) {
                if &fix[2] == "S" {
                    latitude = -latitude;
                }
                if &fix[4] == "W" {
                    longitude = -longitude;
                }
                pending_fix = Some((timestamp, latitude, longitude));
                pending_time = None;
            }
        } else if TIME_SET.is_match(event) {
            time_was_set = true;
            pending_time = Some((timestamp, 0));
        } else if let Some(update) = TIME_UPDATED.captures(event) {
            time_was_set = true;
            if let Ok(milliseconds) = update[1].parse::<f64>() {
                let mut offset =
                    (milliseconds * TIME_OFFSET_MULTIPLIER as f64).round() as i64;
                // A fast clock was ahead of GPS time.
                if &update[2] == "fast" {
                    offset = -offset;
                }
                pending_time = Some((timestamp, offset));
            }
        } else if TIME_NOT_UPDATED.is_match(event) {
            // No correction was measured; the surrounding fix is unusable.
            pending_fix = None;
            pending_time = None;
        } else if let Some(rate) = SAMPLE_RATE.captures(event) {
            if let (Some((fix_time, latitude, longitude)), Some((outcome_time, offset))) =
                (pending_fix, pending_time)
            {
                let reconciles = (0..=EVENT_WINDOW_MILLISECONDS)
                    .contains(&(outcome_time - fix_time))
                    && (0..=EVENT_WINDOW_MILLISECONDS).contains(&(timestamp - outcome_time));
                if reconciles {
                    if let Ok(hertz) = rate[1].parse::<f64>() {
                        fixes.push(Fix {
                            timestamp: outcome_time,
                            latitude,
                            longitude,
                            time_offset: offset,
                            sample_rate: (hertz * 1000.0).round() as i64,
                        });
                    }
                }
            }
            pending_fix = None;
            pending_time = None;
        } else {
            tracing::debug!(event, "ignoring unrecognised GPS log event");
        }
    }

    if !time_was_set {
        return Err(Error::TimeSourceInvalid);
    }
    if fixes.len() < 2 {
        return Err(Error::InsufficientFixes);
    }
    Ok(fixes)
}

/// The middle element of the sorted rates (upper middle when even).
pub(crate) fn median_sample_rate(fixes: &[Fix]) -> i64 {
    let mut rates: Vec<i64> = fixes.iter().map(|fix| fix.sample_rate).collect();
    rates.sort_unstable();
    rates[rates.len() / 2]
}
