use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::io::{ByteReader, ByteWriter};
use crate::wav::comment::format_local_datetime;

static ISO_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").unwrap()
});

static LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Loc Position:\s*(-?[0-9]+(?:\.[0-9]+)?)\s+(-?[0-9]+(?:\.[0-9]+)?)").unwrap()
});

static TEMPERATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Temperature Int:\s*(-?[0-9]+(?:\.[0-9]+)?)").unwrap());

static BATTERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Battery Voltage:\s*([0-9]+(?:\.[0-9]+)?)").unwrap());

/// A trailing `guan` chunk: GUANO bat-recording metadata carried past
/// the `data` payload.
///
/// The body is kept as raw bytes so unrecognised content survives a
/// rewrite untouched; the textual view is only materialised for edits
/// and queries.
#[derive(Clone)]
pub struct Guano {
    contents: Vec<u8>,
}

impl Guano {
    /// Reads the `guan` chunk expected at `offset`, or `None` when the
    /// file ends there or carries something else.
    pub(crate) fn read(reader: &mut ByteReader, offset: u64) -> Result<Option<Guano>> {
        if reader.length() < offset + 8 {
            return Ok(None);
        }
        let mut chunk_header = [0u8; 8];
        reader.read_exact_at(offset, &mut chunk_header)?;
        if &chunk_header[0..4] != b"guan" {
            return Ok(None);
        }
        let size = u32::from_le_bytes([
            chunk_header[4],
            chunk_header[5],
            chunk_header[6],
            chunk_header[7],
        ]);
        if offset + 8 + size as u64 > reader.length() {
            return Err(Error::HeaderInvalid("guano chunk exceeds the file size"));
        }
        let mut contents = vec![0u8; size as usize];
        reader.read_exact(&mut contents)?;
        Ok(Some(Guano { contents }))
    }

    /// Size of the chunk body in bytes.
    pub fn size(&self) -> u32 {
        self.contents.len() as u32
    }

    /// The body as text.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.contents)
    }

    /// Replaces the first `YYYY-MM-DDTHH:MM:SS` occurrence in the body
    /// with the local time of `timestamp` (UTC epoch milliseconds).
    pub(crate) fn set_timestamp(&mut self, timestamp: i64, timezone_minutes: i32) {
        let Some(replacement) =
            format_local_datetime(timestamp, timezone_minutes, "%Y-%m-%dT%H:%M:%S")
        else {
            return;
        };
        let text = self.text().into_owned();
        let edited = ISO_TIMESTAMP.replace(&text, replacement.as_str());
        if let Cow::Owned(edited) = edited {
            self.contents = edited.into_bytes();
        }
    }

    /// The `Loc Position` latitude and longitude, when present.
    pub fn location(&self) -> Option<(f64, f64)> {
        let text = self.text();
        let captures = LOCATION.captures(&text)?;
        let latitude = captures[1].parse().ok()?;
        let longitude = captures[2].parse().ok()?;
        Some((latitude, longitude))
    }

    /// The internal temperature in degrees Celsius, when present.
    pub fn temperature(&self) -> Option<f64> {
        let text = self.text();
        TEMPERATURE.captures(&text)?[1].parse().ok()
    }

    /// The battery voltage, when present.
    pub fn battery_voltage(&self) -> Option<f64> {
        let text = self.text();
        BATTERY.captures(&text)?[1].parse().ok()
    }

    /// Emits the `guan` chunk with its current size and body.
    pub(crate) fn write(&self, writer: &mut ByteWriter) -> Result<()> {
        writer.write_all(b"guan")?;
        writer.write_all(&self.size().to_le_bytes())?;
        writer.write_all(&self.contents)
    }
}
