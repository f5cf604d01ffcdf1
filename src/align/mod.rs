//! Alignment of unsynchronised recordings against a GPS fix log.
//!
//! The aligner is a three-step session: [`Aligner::new`] parses the
//! GPS.TXT log into committed fixes, [`Aligner::align`] clock-corrects
//! and resamples one recording, and [`Aligner::finalise`] interleaves
//! fixes and aligned recordings into a `GPS.CSV` session report.

use std::ffi::OsStr;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::common::BYTES_PER_SAMPLE;
use crate::error::{Error, Result};
use crate::filename::{self, Operation};
use crate::io::{ByteReader, ByteWriter, SampleSink, SampleStream};
use crate::progress::Progress;
use crate::resample::{lerp, quantise};
use crate::wav::comment::{
    format_local_datetime, format_timezone, parse_battery_voltage, parse_temperature,
};
use crate::wav::{Guano, WavHeader};

mod gps;

use gps::{median_sample_rate, read_fix_log, Fix, TIME_OFFSET_MULTIPLIER};

const GPS_CSV_FILE_NAME: &str = "GPS.CSV";

const GPS_CSV_HEADER: &str = "Event,Timestamp,Time Zone,File Name,Latitude,Longitude,\
Duration (s),Temperature (C),Battery Voltage (V),Time Offset (ms),\
Sample Rate Start (mHz),Sample Rate End (mHz),Sample Rate Calculation";

/// A fix whose measured rate diverges from the median by more than this
/// fraction is distrusted and the median used instead.
const MAX_DIVERGENCE: f64 = 400.0 / 48e6;

/// Largest allowed disagreement between the derived rate and the WAV
/// header rate.
const MAXIMUM_RATE_DEVIATION_MILLIHERTZ: i64 = 100;

/// Systematic correction for the sampling clock chain.
const RATE_CORRECTION: f64 = 1.0 - 2.0 / 48e6;

/// How a recording's sample-rate endpoints were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRateCalculation {
    /// Linear interpolation between the bracketing fixes.
    Interpolation,
    /// Median fallback after a divergent fix.
    Median,
}

impl fmt::Display for SampleRateCalculation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleRateCalculation::Interpolation => f.write_str("INTERPOLATION"),
            SampleRateCalculation::Median => f.write_str("MEDIAN"),
        }
    }
}

struct RecordingEntry {
    timestamp: i64,
    timezone_minutes: i32,
    file_name: String,
    latitude: f64,
    longitude: f64,
    duration: f64,
    temperature: Option<f64>,
    battery_voltage: Option<f64>,
    time_offset: i64,
    sample_rate_start: i64,
    sample_rate_end: i64,
    calculation: SampleRateCalculation,
}

/// An alignment session over one GPS fix log.
pub struct Aligner {
    fixes: Vec<Fix>,
    median_rate: i64,
    recordings: Vec<RecordingEntry>,
}

struct AlignmentChoice {
    time_offset: f64,
    sample_rate_start: i64,
    sample_rate_end: i64,
    calculation: SampleRateCalculation,
    latitude: f64,
    longitude: f64,
}

impl Aligner {
    /// Parses `gps_txt` and prepares an empty session.
    pub fn new(gps_txt: &Path) -> Result<Aligner> {
        let fixes = read_fix_log(gps_txt)?;
        let median_rate = median_sample_rate(&fixes);
        tracing::debug!(fixes = fixes.len(), median_rate, "initialised aligner");
        Ok(Aligner {
            fixes,
            median_rate,
            recordings: Vec::new(),
        })
    }

    fn diverges(&self, sample_rate: i64) -> bool {
        (sample_rate - self.median_rate).abs() as f64
            > self.median_rate as f64 * MAX_DIVERGENCE
    }

    fn choose(
        &self,
        start: i64,
        end: i64,
        only_between_fixes: bool,
    ) -> Result<AlignmentChoice> {
        let first = &self.fixes[0];
        let last = &self.fixes[self.fixes.len() - 1];
        if start < first.timestamp {
            return Err(Error::RecordingOutsideFixes);
        }
        if self.fixes.iter().any(|fix| fix.timestamp == start) {
            // An exact coincidence leaves the bracketing ambiguous.
            return Err(Error::RecordingOutsideFixes);
        }

        if start > last.timestamp {
            if only_between_fixes {
                return Err(Error::RecordingOutsideFixes);
            }
            // Extrapolate the clock drift from the last two fixes.
            let previous = &self.fixes[self.fixes.len() - 2];
            let drift = (last.time_offset - previous.time_offset) as f64
                / (last.timestamp - previous.timestamp) as f64;
            let time_offset =
                last.time_offset as f64 + drift * (start - last.timestamp) as f64;
            let (rate, calculation) = if self.diverges(last.sample_rate) {
                (self.median_rate, SampleRateCalculation::Median)
            } else {
                (last.sample_rate, SampleRateCalculation::Interpolation)
            };
            return Ok(AlignmentChoice {
                time_offset,
                sample_rate_start: rate,
                sample_rate_end: rate,
                calculation,
                latitude: last.latitude,
                longitude: last.longitude,
            });
        }

        let index = self
            .fixes
            .windows(2)
            .position(|pair| pair[0].timestamp < start && start < pair[1].timestamp)
            .ok_or(Error::RecordingOutsideFixes)?;
        let before = &self.fixes[index];
        let after = &self.fixes[index + 1];
        let span = (after.timestamp - before.timestamp) as f64;
        let time_offset = before.time_offset as f64
            + (after.time_offset - before.time_offset) as f64
                * (start - before.timestamp) as f64
                / span;
        let rate_at = |at: i64| {
            before.sample_rate as f64
                + (after.sample_rate - before.sample_rate) as f64
                    * (at - before.timestamp) as f64
                    / span
        };
        let (sample_rate_start, sample_rate_end, calculation) =
            if self.diverges(before.sample_rate) || self.diverges(after.sample_rate) {
                (
                    self.median_rate,
                    self.median_rate,
                    SampleRateCalculation::Median,
                )
            } else {
                (
                    rate_at(start).round() as i64,
                    rate_at(end).round() as i64,
                    SampleRateCalculation::Interpolation,
                )
            };
        Ok(AlignmentChoice {
            time_offset,
            sample_rate_start,
            sample_rate_end,
            calculation,
            latitude: before.latitude,
            longitude: before.longitude,
        })
    }

    /// Clock-corrects and resamples one recording, appending its session
    /// entry. Returns the path of the written file.
    pub fn align(
        &mut self,
        wav: &Path,
        output_dir: &Path,
        prefix: Option<&str>,
        only_between_fixes: bool,
        mut progress: Progress<'_>,
    ) -> Result<PathBuf> {
        let name = wav
            .file_name()
            .and_then(OsStr::to_str)
            .ok_or(Error::FilenameInvalid)?;
        let parsed = filename::parse(name, Operation::Sync)?;

        let mut reader = ByteReader::open(wav)?;
        if reader.length() == 0 {
            return Err(Error::FileSizeZero);
        }
        let header = WavHeader::read(&mut reader)?;
        let recorded = filename::validate(&parsed, &header, Operation::Sync)?;
        let guano = Guano::read(
            &mut reader,
            header.size() as u64 + header.data_size() as u64,
        )?;

        let rate = header.sample_rate();
        let input_samples = header.samples();
        let duration = input_samples as f64 / rate as f64;
        let start = recorded.timestamp;
        let end = start + (duration * 1000.0).round() as i64;

        let choice = self.choose(start, end, only_between_fixes)?;
        let nominal_millihertz = rate as i64 * 1000;
        if (choice.sample_rate_start - nominal_millihertz).abs()
            > MAXIMUM_RATE_DEVIATION_MILLIHERTZ
            || (choice.sample_rate_end - nominal_millihertz).abs()
                > MAXIMUM_RATE_DEVIATION_MILLIHERTZ
        {
            return Err(Error::SampleRateMismatch);
        }

        // Leading correction: a slow clock stamped the start too early,
        // so the opening samples are dropped; a fast clock gets zeros
        // prepended instead.
        let correction_samples = (choice.time_offset.abs() / TIME_OFFSET_MULTIPLIER as f64
            / 1000.0
            * choice.sample_rate_start as f64
            / 1000.0)
            .round() as u64;
        let (dropped, padded) = if choice.time_offset >= 0.0 {
            (correction_samples.min(input_samples), 0)
        } else {
            (0, correction_samples)
        };
        let effective_samples = input_samples - dropped;

        let rate_start_hertz = choice.sample_rate_start as f64 / 1000.0 * RATE_CORRECTION;
        let rate_end_hertz = choice.sample_rate_end as f64 / 1000.0 * RATE_CORRECTION;
        let mean_rate = (rate_start_hertz + rate_end_hertz) / 2.0;
        let resampled_samples =
            (effective_samples as f64 * rate as f64 / mean_rate).floor() as u64;
        let output_samples = padded + resampled_samples;

        let mut output_header = header.clone();
        output_header.update_sizes(output_samples * BYTES_PER_SAMPLE, guano.as_ref())?;

        let output_name = filename::output_name(
            prefix,
            &parsed.prefix,
            recorded.timestamp,
            recorded.timezone_minutes,
            None,
            "_SYNC",
        )?;
        let path = output_dir.join(output_name);
        let mut writer = ByteWriter::create(&path)?;
        output_header.write(&mut writer)?;

        let mut tracker = progress.start(output_samples);
        let mut stream = SampleStream::new(
            &mut reader,
            header.size() as u64 + dropped * BYTES_PER_SAMPLE,
            header.data_size() as u64 - dropped * BYTES_PER_SAMPLE,
        )?;
        let mut sink = SampleSink::new(&mut writer);

        for _ in 0..padded {
            sink.push(0)?;
            tracker.advance(1);
        }

        let rate_at = |progress: f64| lerp(rate_start_hertz, rate_end_hertz, progress);
        let mut previous = stream.next_sample()?.unwrap_or(0) as f64;
        let mut next = stream.next_sample()?.map(f64::from).unwrap_or(previous);
        let mut previous_time = 0.0_f64;
        let mut next_time = 1.0 / rate_at(0.0);
        let mut consumed = 1u64;

        for step in 0..resampled_samples {
            let time = step as f64 / rate as f64;
            while time > next_time {
                previous = next;
                previous_time = next_time;
                if let Some(sample) = stream.next_sample()? {
                    next = sample as f64;
                }
                consumed += 1;
                let through = if effective_samples > 0 {
                    consumed as f64 / effective_samples as f64
                } else {
                    1.0
                };
                next_time += 1.0 / rate_at(through.min(1.0));
            }
            let position = if next_time > previous_time {
                (time - previous_time) / (next_time - previous_time)
            } else {
                1.0
            };
            sink.push(quantise(lerp(previous, next, position)))?;
            tracker.advance(1);
        }
        sink.flush()?;

        if let Some(chunk) = &guano {
            chunk.write(&mut writer)?;
        }
        writer.finish()?;
        tracker.finish();

        let comment = header.comment().unwrap_or("");
        self.recordings.push(RecordingEntry {
            timestamp: start,
            timezone_minutes: recorded.timezone_minutes,
            file_name: name.to_owned(),
            latitude: choice.latitude,
            longitude: choice.longitude,
            duration,
            temperature: parse_temperature(comment)
                .or_else(|| guano.as_ref().and_then(Guano::temperature)),
            battery_voltage: parse_battery_voltage(comment)
                .or_else(|| guano.as_ref().and_then(Guano::battery_voltage)),
            time_offset: choice.time_offset.round() as i64,
            sample_rate_start: choice.sample_rate_start,
            sample_rate_end: choice.sample_rate_end,
            calculation: choice.calculation,
        });

        Ok(path)
    }

    /// Sorts the session's recordings, interleaves them with the fixes,
    /// and writes `GPS.CSV` into `output_dir`.
    pub fn finalise(&mut self, output_dir: &Path) -> Result<PathBuf> {
        self.recordings
            .sort_by_key(|recording| recording.timestamp);

        let path = output_dir.join(GPS_CSV_FILE_NAME);
        let file = File::create(&path).map_err(Error::OutputWriteFailed)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{GPS_CSV_HEADER}").map_err(Error::OutputWriteFailed)?;

        let mut fixes = self.fixes.iter().peekable();
        let mut recordings = self.recordings.iter().peekable();
        loop {
            let fix_first = match (fixes.peek(), recordings.peek()) {
                (Some(fix), Some(recording)) => fix.timestamp <= recording.timestamp,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let line = if fix_first {
                format_fix_row(fixes.next().expect("peeked"))
            } else {
                format_recording_row(recordings.next().expect("peeked"))
            };
            writeln!(writer, "{line}").map_err(Error::OutputWriteFailed)?;
        }
        writer.flush().map_err(Error::OutputWriteFailed)?;
        Ok(path)
    }
}

fn format_timestamp(timestamp: i64) -> String {
    format_local_datetime(timestamp, 0, "%Y-%m-%d %H:%M:%S%.3f").unwrap_or_default()
}

fn format_fix_row(fix: &Fix) -> String {
    format!(
        "FIX,{},,,{:.6},{:.6},,,,{:.1},{},{},",
        format_timestamp(fix.timestamp),
        fix.latitude,
        fix.longitude,
        fix.time_offset as f64 / TIME_OFFSET_MULTIPLIER as f64,
        fix.sample_rate,
        fix.sample_rate,
    )
}

fn format_recording_row(recording: &RecordingEntry) -> String {
    format!(
        "RECORDING,{},{},{},{:.6},{:.6},{:.3},{},{},{:.1},{},{},{}",
        format_timestamp(recording.timestamp),
        format_timezone(recording.timezone_minutes),
        recording.file_name,
        recording.latitude,
        recording.longitude,
        recording.duration,
        recording
            .temperature
            .map(|temperature| format!("{temperature:.1}"))
            .unwrap_or_default(),
        recording
            .battery_voltage
            .map(|voltage| format!("{voltage:.1}"))
            .unwrap_or_default(),
        recording.time_offset as f64 / TIME_OFFSET_MULTIPLIER as f64,
        recording.sample_rate_start,
        recording.sample_rate_end,
        recording.calculation,
    )
}
