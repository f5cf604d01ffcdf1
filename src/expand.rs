//! Expansion of trigger-compressed recordings.
//!
//! Triggered firmware writes 512-byte blocks: audio blocks hold plain
//! samples, and a silent run is collapsed into a single sentinel block
//! whose first 32 samples spell out, one bit per sample, how many
//! 512-byte silent blocks it stands for. Expansion reconstructs the
//! real timeline and cuts it into duration- or event-aligned files,
//! filling silent stretches with zeros.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::common::{BYTES_PER_SAMPLE, SECONDS_IN_DAY, STREAM_BUFFER_SIZE};
use crate::error::{Error, Result};
use crate::filename::{self, Operation};
use crate::io::{sample_at, ByteReader, ByteWriter};
use crate::progress::{Progress, Tracker};
use crate::wav::{Guano, WavHeader};

/// Size of one compressed block.
pub(crate) const ENCODED_BLOCK_SIZE: usize = 512;

/// Number of leading samples of a sentinel block that encode the count.
const COUNT_BITS: usize = 32;

/// How the reconstructed timeline is cut into output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionMode {
    /// Fixed-duration slices of the whole timeline.
    Duration,
    /// One file per triggered audio event.
    Event,
}

/// Options controlling an [`expand`] run.
#[derive(Debug, Clone)]
pub struct ExpandOptions {
    /// How the timeline is cut into files.
    pub mode: ExpansionMode,
    /// Length of each output slice or event slab, in seconds.
    pub maximum_file_duration: u32,
    /// In duration mode, also write slices that contain no audio.
    pub generate_silent_files: bool,
    /// In event mode, start each file on a whole-second boundary and
    /// coalesce events that fall in the same second.
    pub align_to_second_transitions: bool,
}

/// The outputs written by an [`expand`] run.
pub struct ExpandReport {
    /// Paths of the written files, in timeline order.
    pub files: Vec<PathBuf>,
    /// Total length of the reconstructed timeline, in bytes.
    pub expanded_bytes: u64,
}

/// Decodes a full compressed block as a silent-run sentinel.
///
/// Sample `i` of the first 32 must be `+1` (bit set) or `-1` (bit
/// clear); every later sample must be zero. Anything else means the
/// block is audio. The count is the number of 512-byte silent blocks
/// the sentinel stands for.
pub(crate) fn silent_block_count(block: &[u8]) -> Option<u32> {
    debug_assert_eq!(block.len(), ENCODED_BLOCK_SIZE);
    let mut count = 0u32;
    for index in 0..COUNT_BITS {
        match sample_at(block, index) {
            1 => count |= 1 << index,
            -1 => {}
            _ => return None,
        }
    }
    for index in COUNT_BITS..ENCODED_BLOCK_SIZE / 2 {
        if sample_at(block, index) != 0 {
            return None;
        }
    }
    Some(count)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentKind {
    Audio,
    Silent,
}

/// A maximal run of same-kind blocks.
///
/// Audio segments map input bytes one-to-one into the timeline; silent
/// segments consume their sentinels and expand to the decoded length.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Segment {
    pub kind: SegmentKind,
    pub input_offset: u64,
    pub output_offset: u64,
    pub input_bytes: u64,
    pub output_bytes: u64,
}

fn push_segment(
    segments: &mut Vec<Segment>,
    kind: SegmentKind,
    input_bytes: u64,
    output_bytes: u64,
    next_input: &mut u64,
    next_output: &mut u64,
) {
    *next_input += input_bytes;
    *next_output += output_bytes;
    if let Some(last) = segments.last_mut() {
        if last.kind == kind {
            last.input_bytes += input_bytes;
            last.output_bytes += output_bytes;
            return;
        }
    }
    segments.push(Segment {
        kind,
        input_offset: *next_input - input_bytes,
        output_offset: *next_output - output_bytes,
        input_bytes,
        output_bytes,
    });
}

/// Walks the compressed payload and classifies it into maximal segments.
pub(crate) fn scan_segments(
    reader: &mut ByteReader,
    header: &WavHeader,
) -> Result<Vec<Segment>> {
    let data_size = header.data_size() as u64;
    let header_size = header.size() as u64;
    reader.seek(header_size)?;

    let mut segments = Vec::new();
    let mut next_input = 0u64;
    let mut next_output = 0u64;
    let mut block = [0u8; ENCODED_BLOCK_SIZE];

    // The firmware writes whole 512-byte sectors from the start of the
    // file, so the first window is shortened to bring later reads onto
    // block boundaries relative to the header size.
    let misalignment = (ENCODED_BLOCK_SIZE as u64 - header_size % ENCODED_BLOCK_SIZE as u64)
        % ENCODED_BLOCK_SIZE as u64;
    let mut consumed = 0u64;
    if misalignment > 0 && data_size > 0 {
        let length = misalignment.min(data_size) as usize;
        reader.read_exact(&mut block[..length])?;
        let kind = if block[..length].iter().all(|&byte| byte == 0) {
            SegmentKind::Silent
        } else {
            SegmentKind::Audio
        };
        push_segment(
            &mut segments,
            kind,
            length as u64,
            length as u64,
            &mut next_input,
            &mut next_output,
        );
        consumed = length as u64;
    }

    while consumed < data_size {
        let length = (ENCODED_BLOCK_SIZE as u64).min(data_size - consumed) as usize;
        reader.read_exact(&mut block[..length])?;
        if length == ENCODED_BLOCK_SIZE {
            match silent_block_count(&block) {
                Some(count) => push_segment(
                    &mut segments,
                    SegmentKind::Silent,
                    ENCODED_BLOCK_SIZE as u64,
                    count as u64 * ENCODED_BLOCK_SIZE as u64,
                    &mut next_input,
                    &mut next_output,
                ),
                None => push_segment(
                    &mut segments,
                    SegmentKind::Audio,
                    ENCODED_BLOCK_SIZE as u64,
                    ENCODED_BLOCK_SIZE as u64,
                    &mut next_input,
                    &mut next_output,
                ),
            }
        } else {
            // A short trailing window cannot be a sentinel, but an
            // all-zero one still counts as silence.
            let kind = if block[..length].iter().all(|&byte| byte == 0) {
                SegmentKind::Silent
            } else {
                SegmentKind::Audio
            };
            push_segment(
                &mut segments,
                kind,
                length as u64,
                length as u64,
                &mut next_input,
                &mut next_output,
            );
        }
        consumed += length as u64;
    }

    Ok(segments)
}

/// Total length of the reconstructed timeline.
pub(crate) fn expanded_length(segments: &[Segment]) -> u64 {
    segments
        .last()
        .map(|segment| segment.output_offset + segment.output_bytes)
        .unwrap_or(0)
}

struct OutputSlice {
    offset: u64,
    length: u64,
}

fn plan_duration_slices(
    segments: &[Segment],
    total_output: u64,
    bytes_per_slice: u64,
    options: &ExpandOptions,
) -> Vec<OutputSlice> {
    let mut slices = Vec::new();
    let count = total_output.div_ceil(bytes_per_slice);
    for index in 0..count {
        let offset = index * bytes_per_slice;
        let length = bytes_per_slice.min(total_output - offset);
        let intersects_audio = segments.iter().any(|segment| {
            segment.kind == SegmentKind::Audio
                && segment.output_offset < offset + length
                && segment.output_offset + segment.output_bytes > offset
        });
        let full_day =
            options.maximum_file_duration == SECONDS_IN_DAY && length == bytes_per_slice;
        if intersects_audio || options.generate_silent_files || full_day {
            slices.push(OutputSlice { offset, length });
        }
    }
    slices
}

fn plan_event_slices(
    segments: &[Segment],
    bytes_per_second: u64,
    bytes_per_slice: u64,
    align_to_second_transitions: bool,
) -> Vec<OutputSlice> {
    let events: Vec<(u64, u64)> = segments
        .iter()
        .filter(|segment| segment.kind == SegmentKind::Audio && segment.output_bytes > 0)
        .map(|segment| {
            (
                segment.output_offset,
                segment.output_offset + segment.output_bytes,
            )
        })
        .collect();

    let mut slices = Vec::new();
    let mut index = 0;
    while index < events.len() {
        let (event_start, mut event_end) = events[index];
        let start = if align_to_second_transitions {
            event_start - event_start % bytes_per_second
        } else {
            event_start
        };
        let mut next_index = index + 1;
        if align_to_second_transitions {
            // Fold in events that begin within the covered span; events in
            // the same second coalesce into one file.
            while next_index < events.len()
                && events[next_index].0 < event_end.max(start + bytes_per_second)
            {
                event_end = event_end.max(events[next_index].1);
                next_index += 1;
            }
        }
        let mut position = start;
        while position < event_end {
            let length = bytes_per_slice.min(event_end - position);
            slices.push(OutputSlice {
                offset: position,
                length,
            });
            position += length;
        }
        index = next_index;
    }
    slices
}

fn write_timeline_range(
    reader: &mut ByteReader,
    writer: &mut ByteWriter,
    segments: &[Segment],
    header_size: u64,
    range_offset: u64,
    range_length: u64,
    buffer: &mut [u8],
    zero: &[u8],
    tracker: &mut Tracker<'_, '_>,
) -> Result<()> {
    let range_end = range_offset + range_length;
    for segment in segments {
        let segment_start = segment.output_offset;
        let segment_end = segment.output_offset + segment.output_bytes;
        if segment_end <= range_offset {
            continue;
        }
        if segment_start >= range_end {
            break;
        }
        let overlap_start = segment_start.max(range_offset);
        let mut remaining = segment_end.min(range_end) - overlap_start;
        match segment.kind {
            SegmentKind::Audio => {
                reader.seek(
                    header_size + segment.input_offset + (overlap_start - segment.output_offset),
                )?;
                while remaining > 0 {
                    let step = (buffer.len() as u64).min(remaining) as usize;
                    reader.read_exact(&mut buffer[..step])?;
                    writer.write_all(&buffer[..step])?;
                    tracker.advance(step as u64);
                    remaining -= step as u64;
                }
            }
            SegmentKind::Silent => {
                while remaining > 0 {
                    let step = (zero.len() as u64).min(remaining) as usize;
                    writer.write_all(&zero[..step])?;
                    tracker.advance(step as u64);
                    remaining -= step as u64;
                }
            }
        }
    }
    Ok(())
}

/// Expands the trigger-compressed `input` into conventional PCM files.
pub fn expand(
    input: &Path,
    output_dir: &Path,
    prefix: Option<&str>,
    options: &ExpandOptions,
    mut progress: Progress<'_>,
) -> Result<ExpandReport> {
    if options.maximum_file_duration == 0 {
        return Err(Error::InvalidArgument(
            "maximum file duration must be a positive number of seconds",
        ));
    }

    let name = input
        .file_name()
        .and_then(OsStr::to_str)
        .ok_or(Error::FilenameInvalid)?;
    let parsed = filename::parse(name, Operation::Expand)?;

    let mut reader = ByteReader::open(input)?;
    if reader.length() == 0 {
        return Err(Error::FileSizeZero);
    }
    let header = WavHeader::read(&mut reader)?;
    let recorded = filename::validate(&parsed, &header, Operation::Expand)?;
    let guano = Guano::read(
        &mut reader,
        header.size() as u64 + header.data_size() as u64,
    )?;

    let segments = scan_segments(&mut reader, &header)?;
    let total_output = expanded_length(&segments);
    let bytes_per_second = header.sample_rate() as u64 * BYTES_PER_SAMPLE;
    let bytes_per_slice = options.maximum_file_duration as u64 * bytes_per_second;

    let slices = match options.mode {
        ExpansionMode::Duration => {
            plan_duration_slices(&segments, total_output, bytes_per_slice, options)
        }
        ExpansionMode::Event => plan_event_slices(
            &segments,
            bytes_per_second,
            bytes_per_slice,
            options.align_to_second_transitions,
        ),
    };

    let mut tracker = progress.start(slices.iter().map(|slice| slice.length).sum());
    let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];
    let zero = vec![0u8; STREAM_BUFFER_SIZE];
    let mut files = Vec::with_capacity(slices.len());

    for slice in &slices {
        let offset_milliseconds = slice.offset * 1000 / bytes_per_second;
        let timestamp = recorded.timestamp + offset_milliseconds as i64;
        let milliseconds = match options.mode {
            ExpansionMode::Event if !options.align_to_second_transitions => {
                Some((offset_milliseconds % 1000) as u32)
            }
            _ => None,
        };

        let mut slice_header = header.clone();
        let slice_guano = guano.clone().map(|mut chunk| {
            chunk.set_timestamp(timestamp, recorded.timezone_minutes);
            chunk
        });
        slice_header.update_sizes(slice.length, slice_guano.as_ref())?;

        let slice_name = filename::output_name(
            prefix,
            &parsed.prefix,
            timestamp,
            recorded.timezone_minutes,
            milliseconds,
            "",
        )?;
        let path = output_dir.join(slice_name);
        let mut writer = ByteWriter::create(&path)?;
        slice_header.write(&mut writer)?;
        write_timeline_range(
            &mut reader,
            &mut writer,
            &segments,
            header.size() as u64,
            slice.offset,
            slice.length,
            &mut buffer,
            &zero,
            &mut tracker,
        )?;
        if let Some(chunk) = &slice_guano {
            chunk.write(&mut writer)?;
        }
        writer.finish()?;
        files.push(path);
    }

    tracker.finish();
    Ok(ExpandReport {
        files,
        expanded_bytes: total_output,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::put_sample_at;
    use quickcheck::quickcheck;

    pub(super) fn sentinel_block(count: u32) -> Vec<u8> {
        let mut block = vec![0u8; ENCODED_BLOCK_SIZE];
        for index in 0..COUNT_BITS {
            let sample = if count & (1 << index) != 0 { 1 } else { -1 };
            put_sample_at(&mut block, index, sample);
        }
        block
    }

    #[test]
    fn decodes_sentinel_counts() {
        assert_eq!(silent_block_count(&sentinel_block(0)), Some(0));
        assert_eq!(silent_block_count(&sentinel_block(7)), Some(7));
        assert_eq!(silent_block_count(&sentinel_block(u32::MAX)), Some(u32::MAX));
    }

    #[test]
    fn any_other_leading_sample_disqualifies() {
        let mut block = sentinel_block(7);
        put_sample_at(&mut block, 3, 2);
        assert_eq!(silent_block_count(&block), None);
        let mut block = sentinel_block(7);
        put_sample_at(&mut block, 0, 0);
        assert_eq!(silent_block_count(&block), None);
    }

    #[test]
    fn trailing_noise_disqualifies() {
        let mut block = sentinel_block(7);
        put_sample_at(&mut block, COUNT_BITS, 1);
        assert_eq!(silent_block_count(&block), None);
        let mut block = sentinel_block(7);
        put_sample_at(&mut block, ENCODED_BLOCK_SIZE / 2 - 1, -1);
        assert_eq!(silent_block_count(&block), None);
    }

    quickcheck! {
        fn sentinel_round_trips(count: u32) -> bool {
            silent_block_count(&sentinel_block(count)) == Some(count)
        }
    }

    fn audio_segment(output_offset: u64, output_bytes: u64) -> Segment {
        Segment {
            kind: SegmentKind::Audio,
            input_offset: 0,
            output_offset,
            input_bytes: output_bytes,
            output_bytes,
        }
    }

    const RATE_BYTES: u64 = 96_000; // one second at 48 kHz

    #[test]
    fn unaligned_events_keep_their_offsets() {
        let segments = [audio_segment(100, 512), audio_segment(10_000, 512)];
        let slices = plan_event_slices(&segments, RATE_BYTES, 10 * RATE_BYTES, false);
        let ranges: Vec<(u64, u64)> =
            slices.iter().map(|slice| (slice.offset, slice.length)).collect();
        assert_eq!(ranges, vec![(100, 512), (10_000, 512)]);
    }

    #[test]
    fn aligned_events_coalesce_within_a_second() {
        // Two events inside the first second, one in the next.
        let segments = [
            audio_segment(100, 512),
            audio_segment(50_000, 512),
            audio_segment(RATE_BYTES + 10, 512),
        ];
        let slices = plan_event_slices(&segments, RATE_BYTES, 10 * RATE_BYTES, true);
        let ranges: Vec<(u64, u64)> =
            slices.iter().map(|slice| (slice.offset, slice.length)).collect();
        assert_eq!(
            ranges,
            vec![(0, 50_512), (RATE_BYTES, 522)]
        );
    }

    #[test]
    fn long_events_are_slabbed() {
        let segments = [audio_segment(0, 5 * RATE_BYTES)];
        let slices = plan_event_slices(&segments, RATE_BYTES, 2 * RATE_BYTES, false);
        let ranges: Vec<(u64, u64)> =
            slices.iter().map(|slice| (slice.offset, slice.length)).collect();
        assert_eq!(
            ranges,
            vec![
                (0, 2 * RATE_BYTES),
                (2 * RATE_BYTES, 2 * RATE_BYTES),
                (4 * RATE_BYTES, RATE_BYTES),
            ]
        );
    }

    #[test]
    fn misaligned_headers_consume_a_short_first_window() {
        // A 488-byte header leaves the payload 24 bytes short of the
        // next 512-byte sector; that lead must be consumed before the
        // sentinel loop starts.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&48_000u32.to_le_bytes());
        bytes.extend_from_slice(&96_000u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&436u32.to_le_bytes());
        bytes.extend_from_slice(b"INFO");
        bytes.extend_from_slice(b"ICMT");
        bytes.extend_from_slice(&384u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 384]);
        bytes.extend_from_slice(b"IART");
        bytes.extend_from_slice(&32u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 32]);
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&1048u32.to_le_bytes());
        assert_eq!(bytes.len(), 488);

        bytes.extend_from_slice(&[1u8; 24]);
        bytes.extend_from_slice(&sentinel_block(3));
        bytes.extend_from_slice(&[2u8; 512]);
        let riff_size = (bytes.len() - 8) as u32;
        bytes[4..8].copy_from_slice(&riff_size.to_le_bytes());

        let path = std::path::Path::new("target/tmp");
        std::fs::create_dir_all(path).unwrap();
        let file = path.join("expand_misaligned.wav");
        std::fs::write(&file, &bytes).unwrap();

        let mut reader = crate::io::ByteReader::open(&file).unwrap();
        let header = crate::wav::WavHeader::read(&mut reader).unwrap();
        assert_eq!(header.size(), 488);
        let segments = scan_segments(&mut reader, &header).unwrap();
        let shapes: Vec<(SegmentKind, u64, u64, u64, u64)> = segments
            .iter()
            .map(|s| {
                (
                    s.kind,
                    s.input_offset,
                    s.input_bytes,
                    s.output_offset,
                    s.output_bytes,
                )
            })
            .collect();
        assert_eq!(
            shapes,
            vec![
                (SegmentKind::Audio, 0, 24, 0, 24),
                (SegmentKind::Silent, 24, 512, 24, 1536),
                (SegmentKind::Audio, 536, 512, 1560, 512),
            ]
        );
        assert_eq!(expanded_length(&segments), 2072);
    }

    #[test]
    fn duration_slices_skip_silence_unless_asked() {
        let segments = [
            audio_segment(0, 512),
            Segment {
                kind: SegmentKind::Silent,
                input_offset: 512,
                output_offset: 512,
                input_bytes: 512,
                output_bytes: 4 * RATE_BYTES,
            },
            audio_segment(512 + 4 * RATE_BYTES, 512),
        ];
        let total = expanded_length(&segments);
        let options = ExpandOptions {
            mode: ExpansionMode::Duration,
            maximum_file_duration: 1,
            generate_silent_files: false,
            align_to_second_transitions: false,
        };
        let slices = plan_duration_slices(&segments, total, RATE_BYTES, &options);
        let offsets: Vec<u64> = slices.iter().map(|slice| slice.offset).collect();
        // Slice 0 holds the first event, the final slice the second;
        // the three silent slices between them are skipped.
        assert_eq!(offsets, vec![0, 4 * RATE_BYTES]);

        let all = ExpandOptions {
            generate_silent_files: true,
            ..options
        };
        let slices = plan_duration_slices(&segments, total, RATE_BYTES, &all);
        assert_eq!(slices.len(), 5);
    }
}
