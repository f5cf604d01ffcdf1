//! Builders for synthetic AudioMoth recordings and companion files.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use mothkit::wav::WavHeader;

pub const DEVICE: &str = "24F3190361DA6A5F";

/// Comment capacity chosen so the built header is exactly 512 bytes,
/// matching the card-sector alignment the firmware writes.
pub const COMMENT_CAPACITY: usize = 408;
pub const ARTIST_CAPACITY: usize = 32;

pub const GUANO_TEXT: &str = "GUANO|Version:1.0\nTimestamp:2023-01-01T00:00:00\n\
Loc Position:51.50072 -0.12750\nTemperature Int:21.5\nOAD|Battery Voltage:4.7\n";

/// A clean scratch directory under `target/tmp`.
pub fn scratch(name: &str) -> PathBuf {
    let path = Path::new("target/tmp").join(name);
    let _ = fs::remove_dir_all(&path);
    fs::create_dir_all(&path).unwrap();
    path
}

/// The comment the firmware writes, with the given local time fields.
pub fn comment_for(time: &str, date: &str, timezone: &str) -> String {
    format!(
        "Recorded at {time} {date} ({timezone}) by AudioMoth {DEVICE} at medium gain \
         while battery state was 4.2V and temperature was 21.3C."
    )
}

fn push_u32(bytes: &mut Vec<u8>, value: u32) {
    bytes.extend_from_slice(&value.to_le_bytes());
}

fn push_u16(bytes: &mut Vec<u8>, value: u16) {
    bytes.extend_from_slice(&value.to_le_bytes());
}

/// Builds a complete recording: 512-byte header, payload, optional
/// trailing GUANO chunk.
pub fn wav_bytes(rate: u32, comment: &str, payload: &[u8], guano: Option<&str>) -> Vec<u8> {
    let artist = format!("AudioMoth {DEVICE}");

    let mut info = Vec::new();
    info.extend_from_slice(b"INFO");
    info.extend_from_slice(b"ICMT");
    push_u32(&mut info, COMMENT_CAPACITY as u32);
    info.extend_from_slice(comment.as_bytes());
    info.resize(info.len() + COMMENT_CAPACITY - comment.len(), 0);
    info.extend_from_slice(b"IART");
    push_u32(&mut info, ARTIST_CAPACITY as u32);
    info.extend_from_slice(artist.as_bytes());
    info.resize(info.len() + ARTIST_CAPACITY - artist.len(), 0);

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    push_u32(&mut bytes, 0); // patched below
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    push_u32(&mut bytes, 16);
    push_u16(&mut bytes, 1);
    push_u16(&mut bytes, 1);
    push_u32(&mut bytes, rate);
    push_u32(&mut bytes, rate * 2);
    push_u16(&mut bytes, 2);
    push_u16(&mut bytes, 16);
    bytes.extend_from_slice(b"LIST");
    push_u32(&mut bytes, info.len() as u32);
    bytes.extend_from_slice(&info);
    bytes.extend_from_slice(b"data");
    push_u32(&mut bytes, payload.len() as u32);
    assert_eq!(bytes.len(), 512, "header layout drifted");

    bytes.extend_from_slice(payload);
    if let Some(guano) = guano {
        bytes.extend_from_slice(b"guan");
        push_u32(&mut bytes, guano.len() as u32);
        bytes.extend_from_slice(guano.as_bytes());
    }

    let riff_size = (bytes.len() - 8) as u32;
    bytes[4..8].copy_from_slice(&riff_size.to_le_bytes());
    bytes
}

/// Deterministic ramp-ish sample data.
pub fn sample_values(count: usize) -> Vec<i16> {
    (0..count)
        .map(|index| ((index as i64 * 37) % 3001 - 1500) as i16)
        .collect()
}

pub fn sample_bytes(samples: &[i16]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|sample| sample.to_le_bytes())
        .collect()
}

/// A 512-byte silent-run sentinel standing for `count` silent blocks.
pub fn sentinel_block(count: u32) -> Vec<u8> {
    let mut block = vec![0u8; 512];
    for index in 0..32 {
        let sample: i16 = if count & (1 << index) != 0 { 1 } else { -1 };
        block[2 * index..2 * index + 2].copy_from_slice(&sample.to_le_bytes());
    }
    block
}

pub fn write_file(path: &Path, bytes: &[u8]) {
    fs::write(path, bytes).unwrap();
}

pub fn read_file(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap()
}

/// Parses the header of a written recording.
pub fn header_of(bytes: &[u8]) -> WavHeader {
    WavHeader::parse(bytes, bytes.len() as u64).unwrap()
}

/// The `data` payload of a written recording.
pub fn data_of(bytes: &[u8]) -> &[u8] {
    let header = header_of(bytes);
    &bytes[header.size()..header.size() + header.data_size() as usize]
}

/// The trailing GUANO text of a written recording, if any.
pub fn guano_text_of(bytes: &[u8]) -> Option<String> {
    let header = header_of(bytes);
    let offset = header.size() + header.data_size() as usize;
    if bytes.len() < offset + 8 || &bytes[offset..offset + 4] != b"guan" {
        return None;
    }
    let size = u32::from_le_bytes([
        bytes[offset + 4],
        bytes[offset + 5],
        bytes[offset + 6],
        bytes[offset + 7],
    ]) as usize;
    Some(String::from_utf8_lossy(&bytes[offset + 8..offset + 8 + size]).into_owned())
}

/// One PPS row of the sync CSV.
pub struct PpsRow {
    pub time: i64,
    pub total_samples: i64,
    pub timer_count: i64,
    pub buffers_filled: i64,
    pub buffers_written: i64,
}

/// Builds a sync CSV with the columns the firmware logs, including the
/// two the planner recomputes.
pub fn sync_csv(rows: &[PpsRow]) -> String {
    let mut csv = String::from(
        "PPS_NUMBER,AUDIOMOTH_TIME,SAMPLES,TOTAL_SAMPLES,TIMER_COUNT,\
         TIME_TO_NEXT_SAMPLE,BUFFERS_FILLED,BUFFERS_WRITTEN\n",
    );
    for (index, row) in rows.iter().enumerate() {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            index,
            row.time,
            0,
            row.total_samples,
            row.timer_count,
            0,
            row.buffers_filled,
            row.buffers_written,
        ));
    }
    csv
}
