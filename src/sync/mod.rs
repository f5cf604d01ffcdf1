//! Synchronisation of GPS-disciplined recordings.
//!
//! GPS-enabled firmware logs one CSV row per pulse-per-second event:
//! the device clock, the running sample counter, and a timer capture of
//! the gap between the PPS edge and the next sample. The planner
//! ([`plan`]) reconciles those rows into per-interval fractional sample
//! rates; the engine ([`engine`]) replays the recording through a
//! linear-interpolation kernel so every output interval spans exactly
//! its nominal duration.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::filename::{self, Operation};
use crate::io::{ByteReader, ByteWriter};
use crate::progress::Progress;
use crate::wav::{Guano, WavHeader};

mod engine;
mod plan;

/// Options controlling a [`sync`] run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Resample the corrected stream to this rate (must be at least the
    /// recording rate).
    pub resample_rate: Option<u32>,
    /// Tolerate missed and misaligned PPS events, reporting them
    /// instead of failing.
    pub auto_resolve: bool,
}

/// The outputs written by a [`sync`] run.
pub struct SyncReport {
    /// Path of the written recording.
    pub file: PathBuf,
    /// Companion anomaly report, written when auto-resolving found
    /// intervals with unusual rates.
    pub report_file: Option<PathBuf>,
    /// Human-readable anomaly descriptions.
    pub anomalies: Vec<String>,
}

/// Corrects `input` against its companion PPS `csv`.
pub fn sync(
    input: &Path,
    csv: &Path,
    output_dir: &Path,
    prefix: Option<&str>,
    options: &SyncOptions,
    mut progress: Progress<'_>,
) -> Result<SyncReport> {
    let name = input
        .file_name()
        .and_then(OsStr::to_str)
        .ok_or(Error::FilenameInvalid)?;
    let parsed = filename::parse(name, Operation::Sync)?;

    let mut reader = ByteReader::open(input)?;
    if reader.length() == 0 {
        return Err(Error::FileSizeZero);
    }
    let header = WavHeader::read(&mut reader)?;
    let recorded = filename::validate(&parsed, &header, Operation::Sync)?;
    let guano = Guano::read(
        &mut reader,
        header.size() as u64 + header.data_size() as u64,
    )?;

    let plan = plan::build(
        csv,
        &header,
        recorded.timestamp,
        options.resample_rate,
        options.auto_resolve,
    )?;
    tracing::debug!(
        intervals = plan.intervals.len(),
        average = plan.average_sample_rate,
        "built sync plan"
    );

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
    let mut tracker = progress.start(plan.samples_to_write);
    engine::run(
        &mut reader,
        &mut writer,
        &header,
        &plan,
        guano.as_ref(),
        &mut tracker,
    )?;
    tracker.finish();

    let report_file = if options.auto_resolve && !plan.anomalies.is_empty() {
        let report_path = path.with_extension("TXT");
        let file = File::create(&report_path).map_err(Error::OutputWriteFailed)?;
        let mut report = BufWriter::new(file);
        for line in &plan.anomalies {
            writeln!(report, "{line}").map_err(Error::OutputWriteFailed)?;
        }
        report.flush().map_err(Error::OutputWriteFailed)?;
        Some(report_path)
    } else {
        None
    };

    Ok(SyncReport {
        file: path,
        report_file,
        anomalies: plan.anomalies,
    })
}
