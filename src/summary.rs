//! Survey of a recording collection into `SUMMARY.CSV`.
//!
//! File discovery belongs to the caller; each discovered file is handed
//! to [`Summariser::summarise`], which appends a best-effort row even
//! when the file is partially unreadable. [`Summariser::finalise`]
//! sorts and writes the accumulated rows. The accumulator is only
//! cleared by constructing a new `Summariser`, so finalising twice
//! without one duplicates rows.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::expand;
use crate::filename;
use crate::io::ByteReader;
use crate::progress::Progress;
use crate::wav::comment::{
    format_local_datetime, format_timezone, parse_battery_voltage, parse_recorded_at,
    parse_temperature,
};
use crate::wav::{Guano, WavHeader};

const SUMMARY_FILE_NAME: &str = "SUMMARY.CSV";

const SUMMARY_HEADER: &str = "File Name,Folder,File Size (bytes),Timestamp,\
Sample Rate (Hz),Samples,Duration (s),Triggered,Latitude,Longitude,\
Temperature (C),Battery Voltage (V)";

#[derive(Default)]
struct SummaryRow {
    file_name: String,
    folder: String,
    file_size: u64,
    timestamp: Option<String>,
    sample_rate: Option<u32>,
    samples: Option<u64>,
    duration: Option<f64>,
    triggered: Option<bool>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    temperature: Option<f64>,
    battery_voltage: Option<f64>,
}

/// Accumulates one row per recognised recording.
#[derive(Default)]
pub struct Summariser {
    rows: Vec<SummaryRow>,
}

impl Summariser {
    /// A summariser with an empty accumulator.
    pub fn new() -> Summariser {
        Summariser::default()
    }

    /// Inspects one discovered file and appends its row.
    ///
    /// Only the filename has to be recognisable; everything else is
    /// filled in as far as the file allows.
    pub fn summarise(
        &mut self,
        root: &Path,
        file: &Path,
        mut progress: Progress<'_>,
    ) -> Result<()> {
        let file_name = file
            .file_name()
            .and_then(OsStr::to_str)
            .ok_or(Error::FilenameInvalid)?
            .to_owned();
        let triggered = filename::recognise(&file_name).ok_or(Error::FilenameInvalid)?;
        let folder = file
            .parent()
            .and_then(|parent| parent.strip_prefix(root).ok())
            .map(|relative| relative.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut row = SummaryRow {
            file_name,
            folder,
            ..SummaryRow::default()
        };
        let mut tracker = progress.start(1);
        if let Err(error) = fill_row(file, triggered, &mut row) {
            tracing::debug!(file = %file.display(), %error, "partial summary row");
        }
        tracker.advance(1);
        tracker.finish();
        self.rows.push(row);
        Ok(())
    }

    /// Sorts the accumulated rows by `(folder, file name)` and writes
    /// `SUMMARY.CSV` into `output_dir`.
    pub fn finalise(&mut self, output_dir: &Path) -> Result<PathBuf> {
        self.rows.sort_by(|a, b| {
            a.folder
                .cmp(&b.folder)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });

        let path = output_dir.join(SUMMARY_FILE_NAME);
        let file = File::create(&path).map_err(Error::OutputWriteFailed)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{SUMMARY_HEADER}").map_err(Error::OutputWriteFailed)?;
        for row in &self.rows {
            writeln!(writer, "{}", format_row(row)).map_err(Error::OutputWriteFailed)?;
        }
        writer.flush().map_err(Error::OutputWriteFailed)?;
        Ok(path)
    }
}

fn fill_row(file: &Path, triggered: bool, row: &mut SummaryRow) -> Result<()> {
    row.file_size = std::fs::metadata(file)
        .map_err(Error::InputReadFailed)?
        .len();

    let mut reader = ByteReader::open(file)?;
    let header = WavHeader::read(&mut reader)?;
    row.sample_rate = Some(header.sample_rate());
    row.triggered = Some(triggered);

    let samples = if triggered {
        // The stated data size covers the compressed stream; walk it to
        // recover the real length.
        let segments = expand::scan_segments(&mut reader, &header)?;
        expand::expanded_length(&segments) / 2
    } else {
        header.samples()
    };
    row.samples = Some(samples);
    row.duration = Some(samples as f64 / header.sample_rate() as f64);

    if let Some(comment) = header.comment() {
        if let Some(recorded) = parse_recorded_at(comment) {
            let time = format_local_datetime(
                recorded.timestamp,
                recorded.timezone_minutes,
                "%Y-%m-%d %H:%M:%S",
            );
            row.timestamp = time.map(|time| {
                format!("{time} {}", format_timezone(recorded.timezone_minutes))
            });
        }
        row.temperature = parse_temperature(comment);
        row.battery_voltage = parse_battery_voltage(comment);
    }

    let guano = Guano::read(
        &mut reader,
        header.size() as u64 + header.data_size() as u64,
    )?;
    if let Some(guano) = guano {
        if let Some((latitude, longitude)) = guano.location() {
            row.latitude = Some(latitude);
            row.longitude = Some(longitude);
        }
        if row.temperature.is_none() {
            row.temperature = guano.temperature();
        }
        if row.battery_voltage.is_none() {
            row.battery_voltage = guano.battery_voltage();
        }
    }
    Ok(())
}

fn format_row(row: &SummaryRow) -> String {
    fn cell<T: std::fmt::Display>(value: &Option<T>) -> String {
        value
            .as_ref()
            .map(|value| value.to_string())
            .unwrap_or_default()
    }

    let cells = [
        row.file_name.clone(),
        row.folder.clone(),
        row.file_size.to_string(),
        row.timestamp.clone().unwrap_or_default(),
        cell(&row.sample_rate),
        cell(&row.samples),
        row.duration
            .map(|duration| format!("{duration:.3}"))
            .unwrap_or_default(),
        row.triggered
            .map(|triggered| if triggered { "TRUE" } else { "FALSE" }.to_owned())
            .unwrap_or_default(),
        row.latitude
            .map(|latitude| format!("{latitude:.6}"))
            .unwrap_or_default(),
        row.longitude
            .map(|longitude| format!("{longitude:.6}"))
            .unwrap_or_default(),
        row.temperature
            .map(|temperature| format!("{temperature:.1}"))
            .unwrap_or_default(),
        row.battery_voltage
            .map(|voltage| format!("{voltage:.1}"))
            .unwrap_or_default(),
    ];
    cells.join(",")
}
