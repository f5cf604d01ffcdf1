use crate::common::{BYTES_PER_SAMPLE, HEADER_BUFFER_SIZE, MAXIMUM_WAV_SIZE};
use crate::error::{Error, Result};
use crate::io::{ByteReader, ByteWriter};
use crate::wav::Guano;

const WAVE_FORMAT_PCM: u16 = 0x0001;

/// An `ICMT` or `IART` entry inside the `LIST`/`INFO` chunk.
///
/// The text lives at a fixed offset in the retained header bytes and may
/// be replaced, zero-padded, up to its declared capacity — never grown.
#[derive(Clone)]
struct TextField {
    offset: usize,
    capacity: usize,
    text: String,
}

impl TextField {
    fn new(bytes: &[u8], offset: usize, capacity: usize) -> TextField {
        let body = &bytes[offset..offset + capacity];
        let terminated = body.iter().position(|&b| b == 0).unwrap_or(body.len());
        TextField {
            offset,
            capacity,
            text: String::from_utf8_lossy(&body[..terminated]).into_owned(),
        }
    }
}

/// A parsed WAV header, retained verbatim up to the start of the `data`
/// payload so it can be rewritten with only the updated fields changed.
#[derive(Clone)]
pub struct WavHeader {
    raw: Vec<u8>,
    sample_rate: u32,
    data_size: u32,
    fmt_rate_offset: usize,
    data_size_offset: usize,
    icmt: Option<TextField>,
    iart: Option<TextField>,
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

impl WavHeader {
    /// Reads and parses the header at the start of `reader`.
    pub(crate) fn read(reader: &mut ByteReader) -> Result<WavHeader> {
        let length = (reader.length() as usize).min(HEADER_BUFFER_SIZE);
        let mut bytes = vec![0u8; length];
        reader.read_exact_at(0, &mut bytes)?;
        WavHeader::parse(&bytes, reader.length())
    }

    /// Parses a header from `bytes`, the opening bytes of a file of
    /// `file_size` total bytes.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<WavHeader> {
        if bytes.len() < 12 || &bytes[0..4] != b"RIFF" {
            return Err(Error::HeaderInvalid("missing RIFF chunk"));
        }
        let riff_size = read_u32(bytes, 4);
        if riff_size as u64 + 8 > file_size {
            return Err(Error::HeaderInvalid("RIFF size exceeds the file size"));
        }
        if &bytes[8..12] != b"WAVE" {
            return Err(Error::HeaderInvalid("not a WAVE file"));
        }

        let mut position = 12;
        let mut format = None;
        let mut icmt = None;
        let mut iart = None;

        // Chunk sizes are untrusted; every advance is checked against the
        // retained byte range before use.
        loop {
            if position + 8 > bytes.len() {
                return Err(Error::HeaderInvalid("missing data chunk"));
            }
            let tag = &bytes[position..position + 4];
            let size = read_u32(bytes, position + 4) as usize;
            let body = position + 8;

            if tag == b"data" {
                let fmt_rate_offset =
                    format.ok_or(Error::HeaderInvalid("missing fmt chunk"))?;
                if size as u64 > file_size - body as u64 {
                    return Err(Error::HeaderInvalid("data chunk exceeds the file size"));
                }
                return Ok(WavHeader {
                    raw: bytes[..body].to_vec(),
                    sample_rate: read_u32(bytes, fmt_rate_offset),
                    data_size: size as u32,
                    fmt_rate_offset,
                    data_size_offset: position + 4,
                    icmt,
                    iart,
                });
            }

            if body + size > bytes.len() {
                return Err(Error::HeaderInvalid("missing data chunk"));
            }

            match tag {
                b"fmt " => {
                    if size < 16 {
                        return Err(Error::HeaderInvalid("malformed fmt chunk"));
                    }
                    let audio_format = read_u16(bytes, body);
                    let channels = read_u16(bytes, body + 2);
                    let bits_per_sample = read_u16(bytes, body + 14);
                    if audio_format != WAVE_FORMAT_PCM || channels != 1 || bits_per_sample != 16
                    {
                        return Err(Error::HeaderInvalid(
                            "unsupported format (expected mono 16-bit PCM)",
                        ));
                    }
                    format = Some(body + 4);
                }
                b"LIST" => {
                    if size >= 4 && &bytes[body..body + 4] == b"INFO" {
                        let mut sub = body + 4;
                        let end = body + size;
                        while sub + 8 <= end {
                            let sub_tag = &bytes[sub..sub + 4];
                            let sub_size = read_u32(bytes, sub + 4) as usize;
                            let text = sub + 8;
                            if text + sub_size > end {
                                break;
                            }
                            match sub_tag {
                                b"ICMT" => icmt = Some(TextField::new(bytes, text, sub_size)),
                                b"IART" => iart = Some(TextField::new(bytes, text, sub_size)),
                                _ => {}
                            }
                            sub = text + sub_size + (sub_size & 1);
                        }
                    }
                }
                _ => {
                    // As per the RIFF spec, unknown chunks are ignored; the
                    // retained bytes carry them through to outputs verbatim.
                    tracing::debug!(
                        tag = %String::from_utf8_lossy(tag),
                        size,
                        "preserving unrecognised chunk"
                    );
                }
            }

            position = body + size + (size & 1);
        }
    }

    /// Header length in bytes, up to but excluding the `data` payload.
    pub fn size(&self) -> usize {
        self.raw.len()
    }

    /// The recording sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Byte count of the `data` payload.
    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    /// Number of 16-bit samples in the `data` payload.
    pub fn samples(&self) -> u64 {
        self.data_size as u64 / BYTES_PER_SAMPLE
    }

    /// The `ICMT` comment, if the header carries one.
    pub fn comment(&self) -> Option<&str> {
        self.icmt.as_ref().map(|field| field.text.as_str())
    }

    /// The `IART` artist, if the header carries one.
    pub fn artist(&self) -> Option<&str> {
        self.iart.as_ref().map(|field| field.text.as_str())
    }

    /// Replaces the comment text, zero-padded to the declared `ICMT`
    /// capacity. Fails if the text does not fit.
    pub fn update_comment(&mut self, text: &str) -> Result<()> {
        let field = self
            .icmt
            .as_mut()
            .ok_or(Error::HeaderInvalid("missing comment chunk"))?;
        if text.len() > field.capacity {
            return Err(Error::InvalidArgument(
                "comment exceeds the declared comment capacity",
            ));
        }
        self.raw[field.offset..field.offset + field.capacity].fill(0);
        self.raw[field.offset..field.offset + text.len()].copy_from_slice(text.as_bytes());
        field.text = text.to_owned();
        Ok(())
    }

    /// Rewrites the sample rate and the derived average bytes per second.
    pub fn update_sample_rate(&mut self, rate: u32) {
        let bytes_per_second = rate * BYTES_PER_SAMPLE as u32;
        self.raw[self.fmt_rate_offset..self.fmt_rate_offset + 4]
            .copy_from_slice(&rate.to_le_bytes());
        self.raw[self.fmt_rate_offset + 4..self.fmt_rate_offset + 8]
            .copy_from_slice(&bytes_per_second.to_le_bytes());
        self.sample_rate = rate;
    }

    /// Sets the `data` payload size and recomputes the outer RIFF size to
    /// cover the header, the payload and the optional trailing GUANO.
    pub fn update_sizes(&mut self, data_size: u64, guano: Option<&Guano>) -> Result<()> {
        let guano_size = guano.map(|g| 8 + g.size() as u64).unwrap_or(0);
        let total = self.raw.len() as u64 + data_size + guano_size;
        if total > MAXIMUM_WAV_SIZE {
            return Err(Error::FileSizeExceedsLimit);
        }
        let riff_size = (total - 8) as u32;
        self.raw[4..8].copy_from_slice(&riff_size.to_le_bytes());
        self.raw[self.data_size_offset..self.data_size_offset + 4]
            .copy_from_slice(&(data_size as u32).to_le_bytes());
        self.data_size = data_size as u32;
        Ok(())
    }

    /// Emits the retained header bytes in their preserved chunk order.
    pub(crate) fn write(&self, writer: &mut ByteWriter) -> Result<()> {
        writer.write_all(&self.raw)
    }

    /// The retained header bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.raw
    }
}
