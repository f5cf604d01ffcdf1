//! Splitting one long recording into uniform-duration pieces.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::common::{BYTES_PER_SAMPLE, STREAM_BUFFER_SIZE};
use crate::error::{Error, Result};
use crate::filename::{self, Operation};
use crate::io::{ByteReader, ByteWriter};
use crate::progress::Progress;
use crate::wav::{Guano, WavHeader};

/// The outputs written by a [`split`] run.
pub struct SplitReport {
    /// Paths of the written files, in timeline order.
    pub files: Vec<PathBuf>,
}

/// Splits `input` into files of at most `maximum_file_duration` seconds.
///
/// Each piece carries the source header with its comment replaced by
/// `Split from <name> as file i of N.`, a filename timestamp advanced by
/// the accumulated duration, the data region copied verbatim, and the
/// GUANO (if any) with its timestamp moved to match. A recording that
/// fits one piece is copied with its comment and timestamp unchanged.
pub fn split(
    input: &Path,
    output_dir: &Path,
    prefix: Option<&str>,
    maximum_file_duration: u32,
    mut progress: Progress<'_>,
) -> Result<SplitReport> {
    if maximum_file_duration == 0 {
        return Err(Error::InvalidArgument(
            "maximum file duration must be a positive number of seconds",
        ));
    }

    let name = input
        .file_name()
        .and_then(OsStr::to_str)
        .ok_or(Error::FilenameInvalid)?;
    let parsed = filename::parse(name, Operation::Split)?;

    let mut reader = ByteReader::open(input)?;
    if reader.length() == 0 {
        return Err(Error::FileSizeZero);
    }
    let header = WavHeader::read(&mut reader)?;
    let recorded = filename::validate(&parsed, &header, Operation::Split)?;
    let guano = Guano::read(
        &mut reader,
        header.size() as u64 + header.data_size() as u64,
    )?;

    let data_size = header.data_size() as u64;
    let bytes_per_file =
        maximum_file_duration as u64 * header.sample_rate() as u64 * BYTES_PER_SAMPLE;
    let count = (data_size.div_ceil(bytes_per_file)).max(1);

    let mut tracker = progress.start(data_size);
    let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];
    let mut files = Vec::with_capacity(count as usize);

    for index in 0..count {
        let offset = index * bytes_per_file;
        let length = bytes_per_file.min(data_size - offset);
        let timestamp =
            recorded.timestamp + index as i64 * maximum_file_duration as i64 * 1000;

        let mut piece_header = header.clone();
        if count > 1 {
            piece_header.update_comment(&format!(
                "Split from {name} as file {} of {count}.",
                index + 1
            ))?;
        }
        let piece_guano = guano.clone().map(|mut chunk| {
            chunk.set_timestamp(timestamp, recorded.timezone_minutes);
            chunk
        });
        piece_header.update_sizes(length, piece_guano.as_ref())?;

        let piece_name = filename::output_name(
            prefix,
            &parsed.prefix,
            timestamp,
            recorded.timezone_minutes,
            None,
            &parsed.postfix,
        )?;
        let path = output_dir.join(piece_name);
        let mut writer = ByteWriter::create(&path)?;
        piece_header.write(&mut writer)?;

        reader.seek(header.size() as u64 + offset)?;
        let mut copied = 0;
        while copied < length {
            let step = (buffer.len() as u64).min(length - copied) as usize;
            reader.read_exact(&mut buffer[..step])?;
            writer.write_all(&buffer[..step])?;
            copied += step as u64;
            tracker.advance(step as u64);
        }

        if let Some(chunk) = &piece_guano {
            chunk.write(&mut writer)?;
        }
        writer.finish()?;
        files.push(path);
    }

    tracker.finish();
    Ok(SplitReport { files })
}
