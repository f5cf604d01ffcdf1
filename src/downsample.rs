//! Downsampling by integer over-sampling, averaging and interpolation.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::common::{is_recording_sample_rate, BYTES_PER_SAMPLE};
use crate::error::{Error, Result};
use crate::filename::{self, Operation};
use crate::io::{ByteReader, ByteWriter, SampleSink, SampleStream};
use crate::progress::Progress;
use crate::resample::{converted_sample_count, lerp, quantise};
use crate::wav::{Guano, WavHeader};

/// The output written by a [`downsample`] run.
pub struct DownsampleReport {
    /// Path of the written file.
    pub file: PathBuf,
    /// Number of samples it contains.
    pub output_samples: u64,
}

/// Converts `input` to `requested_rate`, which must be one of the
/// recognised recording rates and no higher than the source rate.
///
/// The source is virtually over-sampled to the smallest integer multiple
/// of the requested rate by linear interpolation, then every group of
/// `source/requested` (rounded up) interpolated values is averaged into
/// one output sample.
pub fn downsample(
    input: &Path,
    output_dir: &Path,
    prefix: Option<&str>,
    requested_rate: u32,
    mut progress: Progress<'_>,
) -> Result<DownsampleReport> {
    if !is_recording_sample_rate(requested_rate) {
        return Err(Error::InvalidArgument(
            "requested sample rate is not a recognised recording rate",
        ));
    }

    let name = input
        .file_name()
        .and_then(OsStr::to_str)
        .ok_or(Error::FilenameInvalid)?;
    let parsed = filename::parse(name, Operation::Downsample)?;

    let mut reader = ByteReader::open(input)?;
    if reader.length() == 0 {
        return Err(Error::FileSizeZero);
    }
    let header = WavHeader::read(&mut reader)?;
    let recorded = filename::validate(&parsed, &header, Operation::Downsample)?;

    let source_rate = header.sample_rate();
    if !is_recording_sample_rate(source_rate) {
        return Err(Error::HeaderInvalid("unsupported sample rate"));
    }
    if requested_rate > source_rate {
        return Err(Error::InvalidArgument(
            "requested sample rate exceeds the source rate",
        ));
    }

    let guano = Guano::read(
        &mut reader,
        header.size() as u64 + header.data_size() as u64,
    )?;

    let input_samples = header.samples();
    let output_samples = converted_sample_count(input_samples, source_rate, requested_rate);

    // Interpolate at `divider` times the requested rate, then average
    // each group of `divider` values down to one output sample.
    let divider = source_rate.div_ceil(requested_rate);
    let raw_rate = divider * requested_rate;
    let step = source_rate as f64 / raw_rate as f64;

    let mut output_header = header.clone();
    output_header.update_sample_rate(requested_rate);
    output_header.update_sizes(output_samples * BYTES_PER_SAMPLE, guano.as_ref())?;

    let output_name = filename::output_name(
        prefix,
        &parsed.prefix,
        recorded.timestamp,
        recorded.timezone_minutes,
        None,
        &parsed.postfix,
    )?;
    let path = output_dir.join(output_name);
    let mut writer = ByteWriter::create(&path)?;
    output_header.write(&mut writer)?;

    let mut stream = SampleStream::new(
        &mut reader,
        header.size() as u64,
        header.data_size() as u64,
    )?;
    let mut tracker = progress.start(output_samples);

    let mut current = stream.next_sample()?.unwrap_or(0) as f64;
    let mut next = stream.next_sample()?.map(f64::from).unwrap_or(current);
    let mut position = 0.0_f64;

    let mut sink = SampleSink::new(&mut writer);
    for _ in 0..output_samples {
        let mut accumulator = 0.0;
        for _ in 0..divider {
            accumulator += lerp(current, next, position);
            position += step;
            while position >= 1.0 {
                position -= 1.0;
                current = next;
                if let Some(sample) = stream.next_sample()? {
                    next = sample as f64;
                }
            }
        }
        sink.push(quantise(accumulator / divider as f64))?;
        tracker.advance(1);
    }
    sink.flush()?;

    if let Some(chunk) = &guano {
        chunk.write(&mut writer)?;
    }
    writer.finish()?;
    tracker.finish();

    Ok(DownsampleReport {
        file: path,
        output_samples,
    })
}
