//! Reconciliation of PPS events into an interpolation plan.

use std::path::Path;

use crate::common::is_recording_sample_rate;
use crate::csv::{parse_integer, read_columns};
use crate::error::{Error, PpsAnomalyKind, Result};
use crate::resample::converted_sample_count;
use crate::wav::WavHeader;

/// Maximum fractional-frequency error of the low-frequency crystal
/// driving the device clock.
const LFXO_TOLERANCE: f64 = 100e-6;

/// Maximum absolute fractional-frequency error of the high-frequency
/// crystal driving the sample clock, applied to the first interval.
const HFXO_INITIAL_TOLERANCE: f64 = 100e-6;

/// Relative tolerance applied once a running average rate exists.
const HFXO_RELATIVE_TOLERANCE: f64 = 40e-6;

/// A device that fills eight buffers ahead of its card writes has
/// dropped samples.
const MAXIMUM_BUFFER_LAG: i64 = 8;

/// Allowed disagreement between the filename timestamp and the first
/// PPS row.
const MAXIMUM_START_DISAGREEMENT_MILLISECONDS: i64 = 500;

/// Straddle corrections for samples acquired across a PPS edge.
const FIX_PPS_EVENTS: bool = true;

/// Shift sample timestamps to the middle of their acquisition windows.
const ALIGN_SAMPLES: bool = true;

/// The additional edge fix-ups only apply at the highest PPS-capable
/// rate.
const MAXIMUM_FIXABLE_RATE: u32 = 192_000;

/// One reconciled gap between consecutive accepted PPS events.
#[derive(Debug, Clone)]
pub(crate) struct Interval {
    /// CSV row indices of the bounding PPS events.
    pub start_pps: usize,
    pub end_pps: usize,
    /// Whole seconds between the bounding events.
    pub time_interval: u32,
    /// Seconds elapsed up to and including this interval.
    pub cumulative_time_interval: u64,
    /// Input samples captured inside the interval.
    pub number_of_samples: i64,
    /// Microseconds from the opening PPS edge to the first sample.
    pub first_sample_gap: f64,
    /// Microseconds from the last sample to the closing PPS edge.
    pub last_sample_gap: f64,
    /// Measured rate across the interval, in fractional Hz.
    pub sample_rate: f64,
}

impl Interval {
    fn recompute_rate(&mut self) {
        self.sample_rate = interval_rate(
            self.number_of_samples,
            self.time_interval,
            self.first_sample_gap,
            self.last_sample_gap,
        );
    }
}

fn interval_rate(samples: i64, seconds: u32, first_gap: f64, last_gap: f64) -> f64 {
    (samples - 1) as f64 * 1e6 / (seconds as f64 * 1e6 - first_gap - last_gap)
}

/// Everything the streaming engine needs.
pub(crate) struct SyncPlan {
    pub intervals: Vec<Interval>,
    pub average_sample_rate: f64,
    pub target_sample_rate: u32,
    pub resampled: bool,
    pub samples_to_write: u64,
    pub first_sample_is_before_first_interval: bool,
    pub anomalies: Vec<String>,
}

fn weighted_average(intervals: &[Interval]) -> f64 {
    let mut rate_seconds = 0.0;
    let mut seconds = 0.0;
    for interval in intervals {
        rate_seconds += interval.sample_rate * interval.time_interval as f64;
        seconds += interval.time_interval as f64;
    }
    rate_seconds / seconds
}

/// Loads the PPS CSV and builds the interpolation plan.
pub(crate) fn build(
    csv: &Path,
    header: &WavHeader,
    recording_timestamp: i64,
    resample_rate: Option<u32>,
    auto_resolve: bool,
) -> Result<SyncPlan> {
    let columns = read_columns(
        csv,
        &[
            ("PPS_NUMBER", parse_integer),
            ("AUDIOMOTH_TIME", parse_integer),
            ("TOTAL_SAMPLES", parse_integer),
            ("TIMER_COUNT", parse_integer),
            ("BUFFERS_FILLED", parse_integer),
            ("BUFFERS_WRITTEN", parse_integer),
        ],
    )?;
    let times = &columns[1];
    let totals = &columns[2];
    let timers = &columns[3];
    let filled = &columns[4];
    let written = &columns[5];

    let rows = times.len();
    if rows < 2 {
        return Err(Error::InsufficientEvents);
    }
    for row in 0..rows {
        if filled[row] - written[row] >= MAXIMUM_BUFFER_LAG {
            return Err(Error::PpsAnomaly(PpsAnomalyKind::BufferOverflow));
        }
    }
    if (recording_timestamp - times[0]).abs() > MAXIMUM_START_DISAGREEMENT_MILLISECONDS {
        return Err(Error::MetadataMismatch);
    }

    let rate = header.sample_rate();

    // The ADC completes one sample every `clock_ticks_to_complete_sample`
    // ticks; the timer capture counts those ticks from the PPS edge to
    // the next completed sample.
    let mut over_sample_rate = 1u32;
    while over_sample_rate * 2 * rate <= 384_000 {
        over_sample_rate *= 2;
    }
    let clock_ticks_to_complete_sample = 2 + 4 * (2 + over_sample_rate * (16 + 12));
    let tick_rate = rate as f64 * clock_ticks_to_complete_sample as f64;
    let sample_interval = 1e6 / rate as f64;

    let time_to_next_sample: Vec<f64> = timers
        .iter()
        .map(|&count| count as f64 * 1e6 / tick_rate)
        .collect();

    let mut intervals: Vec<Interval> = Vec::with_capacity(rows - 1);
    let mut anomalies = Vec::new();
    let mut cumulative = 0u64;
    let mut average = rate as f64;
    let mut previous = 0usize;

    for next in 1..rows {
        let delta_milliseconds = times[next] - times[previous];
        let seconds = ((delta_milliseconds as f64) / 1000.0).round() as i64;
        let samples = totals[next] - totals[previous];

        let clock_tolerance = (LFXO_TOLERANCE * seconds as f64 * 1000.0).ceil();
        let clock_ok = seconds >= 1
            && ((delta_milliseconds - seconds * 1000) as f64).abs() <= clock_tolerance;
        let rate_tolerance = if intervals.is_empty() {
            (HFXO_INITIAL_TOLERANCE * average * seconds as f64).ceil()
        } else {
            (HFXO_RELATIVE_TOLERANCE * average * seconds as f64).ceil()
        };
        let rate_ok = (samples as f64 - seconds as f64 * average).abs() <= rate_tolerance;

        if !clock_ok || !rate_ok {
            if !auto_resolve {
                return Err(Error::PpsAnomaly(PpsAnomalyKind::Misaligned));
            }
            tracing::warn!(row = next, "skipping misaligned PPS event");
            anomalies.push(format!(
                "PPS event {next} is misaligned with its neighbours and was skipped."
            ));
            continue;
        }

        if seconds > 1 {
            if !auto_resolve {
                return Err(Error::PpsAnomaly(PpsAnomalyKind::MissedPps));
            }
            tracing::warn!(
                from = previous,
                to = next,
                seconds,
                "PPS events were missed; keeping the long interval"
            );
            anomalies.push(format!(
                "{} PPS event(s) between events {previous} and {next} were missed.",
                seconds - 1
            ));
        }

        cumulative += seconds as u64;
        let first_sample_gap = time_to_next_sample[previous];
        let last_sample_gap = sample_interval - time_to_next_sample[next];
        let mut interval = Interval {
            start_pps: previous,
            end_pps: next,
            time_interval: seconds as u32,
            cumulative_time_interval: cumulative,
            number_of_samples: samples,
            first_sample_gap,
            last_sample_gap,
            sample_rate: 0.0,
        };
        interval.recompute_rate();
        intervals.push(interval);
        average = weighted_average(&intervals);
        previous = next;
    }

    if intervals.is_empty() {
        return Err(Error::InsufficientEvents);
    }

    if FIX_PPS_EVENTS {
        // The timer capture is ambiguous when a sample completes on the
        // PPS edge itself; the tell-tale is a (-1, +1) or, at the top
        // rate, a (-1, 0) rate pattern either side of the event.
        let max_pps_offset = sample_interval;
        for index in 0..intervals.len() - 1 {
            let (left, right) = intervals.split_at_mut(index + 1);
            let a = &mut left[index];
            let b = &mut right[0];
            if a.last_sample_gap >= max_pps_offset {
                continue;
            }
            let below = (a.sample_rate - average).round() == -1.0;
            let above = (b.sample_rate - average).round() == 1.0;
            let level = (b.sample_rate - average).round() == 0.0;
            if below && above {
                a.last_sample_gap = sample_interval;
                b.first_sample_gap = 0.0;
                a.recompute_rate();
                b.recompute_rate();
            } else if rate == MAXIMUM_FIXABLE_RATE && below && level {
                // The edge sample was dropped outright; reassign the gap
                // and restore the sample to the following interval.
                a.last_sample_gap = sample_interval;
                b.first_sample_gap = 0.0;
                b.number_of_samples += 1;
                a.recompute_rate();
                b.recompute_rate();
            }
        }

        if rate == MAXIMUM_FIXABLE_RATE {
            let first = &mut intervals[0];
            if (first.sample_rate - average).round() == 1.0
                && first.first_sample_gap >= sample_interval
            {
                first.first_sample_gap -= sample_interval;
                first.recompute_rate();
            }
            for interval in intervals.iter_mut() {
                if (interval.sample_rate - average).round() == -1.0 {
                    interval.number_of_samples += 1;
                    interval.recompute_rate();
                }
            }
        }
        average = weighted_average(&intervals);
    }

    let mut first_sample_is_before_first_interval = false;
    if ALIGN_SAMPLES {
        // A sample's true time is the middle of its acquisition window,
        // half a period before the conversion completes.
        let half_period = sample_interval / 2.0;
        for index in 0..intervals.len() {
            intervals[index].first_sample_gap -= half_period;
            intervals[index].last_sample_gap += half_period;
            let gap = intervals[index].first_sample_gap;
            if gap < 0.0 {
                if index == 0 {
                    first_sample_is_before_first_interval = true;
                } else {
                    let previous = &mut intervals[index - 1];
                    previous.number_of_samples += 1;
                    previous.last_sample_gap = -gap;
                }
                intervals[index].number_of_samples -= 1;
                intervals[index].first_sample_gap = gap + sample_interval;
            }
        }
        for interval in intervals.iter_mut() {
            interval.recompute_rate();
        }
        average = weighted_average(&intervals);
    }

    for (index, interval) in intervals.iter().enumerate() {
        if (interval.sample_rate - average).round() != 0.0 {
            anomalies.push(format!(
                "Interval {} (PPS {} to {}) has an unusual sample rate: {:.2} Hz against an average of {:.2} Hz.",
                index + 1,
                interval.start_pps,
                interval.end_pps,
                interval.sample_rate,
                average,
            ));
            if !auto_resolve {
                return Err(Error::PpsAnomaly(PpsAnomalyKind::UnusualRate));
            }
        }
    }

    let (target_sample_rate, resampled) = match resample_rate {
        Some(resample) if resample != rate => {
            if resample < rate {
                return Err(Error::InvalidArgument(
                    "resample rate must not be below the recording rate",
                ));
            }
            if !is_recording_sample_rate(resample) {
                return Err(Error::InvalidArgument(
                    "resample rate is not a recognised recording rate",
                ));
            }
            (resample, true)
        }
        _ => (rate, false),
    };

    let input_samples = header.samples();
    let samples_to_write = if resampled {
        converted_sample_count(input_samples, rate, target_sample_rate)
    } else {
        input_samples
    };

    Ok(SyncPlan {
        intervals,
        average_sample_rate: average,
        target_sample_rate,
        resampled,
        samples_to_write,
        first_sample_is_before_first_interval,
        anomalies,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn interval_rate_follows_the_gap_formula() {
        // 48000 samples at exactly 48 kHz, the first half a period after
        // the opening edge, leave half a period before the closing edge.
        let interval = 1e6 / 48_000.0;
        let rate = interval_rate(48_000, 1, interval / 2.0, interval / 2.0);
        assert_relative_eq!(rate, 48_000.0, epsilon = 1e-6);
    }

    #[test]
    fn weighted_average_prefers_longer_intervals() {
        let a = Interval {
            start_pps: 0,
            end_pps: 1,
            time_interval: 1,
            cumulative_time_interval: 1,
            number_of_samples: 48_000,
            first_sample_gap: 0.0,
            last_sample_gap: 0.0,
            sample_rate: 48_000.0,
        };
        let mut b = a.clone();
        b.time_interval = 3;
        b.sample_rate = 48_004.0;
        assert_relative_eq!(weighted_average(&[a, b]), 48_003.0, epsilon = 1e-9);
    }
}
