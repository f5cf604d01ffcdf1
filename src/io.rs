//! Buffered positional file I/O and 16-bit little-endian sample access.
//!
//! Everything streams: operations read the header once, then move fixed
//! working buffers between one input and one or more outputs. Read
//! failures surface as [`Error::InputReadFailed`], write failures as
//! [`Error::OutputWriteFailed`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::STREAM_BUFFER_SIZE;
use crate::error::{Error, Result};

/// A buffered reader over a file with explicit positional access.
pub(crate) struct ByteReader {
    inner: BufReader<File>,
    position: u64,
    length: u64,
}

impl ByteReader {
    pub fn open(path: &Path) -> Result<ByteReader> {
        let file = File::open(path).map_err(Error::InputReadFailed)?;
        let length = file.metadata().map_err(Error::InputReadFailed)?.len();
        Ok(ByteReader {
            inner: BufReader::with_capacity(STREAM_BUFFER_SIZE, file),
            position: 0,
            length,
        })
    }

    /// Total length of the underlying file in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn seek(&mut self, position: u64) -> Result<()> {
        if position != self.position {
            self.inner
                .seek(SeekFrom::Start(position))
                .map_err(Error::InputReadFailed)?;
            self.position = position;
        }
        Ok(())
    }

    pub fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.inner
            .read_exact(buffer)
            .map_err(Error::InputReadFailed)?;
        self.position += buffer.len() as u64;
        Ok(())
    }

    pub fn read_exact_at(&mut self, position: u64, buffer: &mut [u8]) -> Result<()> {
        self.seek(position)?;
        self.read_exact(buffer)
    }
}

/// A buffered writer over a newly created file.
pub(crate) struct ByteWriter {
    inner: BufWriter<File>,
}

impl ByteWriter {
    pub fn create(path: &Path) -> Result<ByteWriter> {
        let file = File::create(path).map_err(Error::OutputWriteFailed)?;
        Ok(ByteWriter {
            inner: BufWriter::with_capacity(STREAM_BUFFER_SIZE, file),
        })
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes).map_err(Error::OutputWriteFailed)
    }

    pub fn finish(&mut self) -> Result<()> {
        self.inner.flush().map_err(Error::OutputWriteFailed)
    }
}

/// Reads the 16-bit little-endian sample at `index` samples into `buffer`.
#[inline]
pub(crate) fn sample_at(buffer: &[u8], index: usize) -> i16 {
    i16::from_le_bytes([buffer[2 * index], buffer[2 * index + 1]])
}

/// Stores a 16-bit little-endian sample at `index` samples into `buffer`.
#[inline]
pub(crate) fn put_sample_at(buffer: &mut [u8], index: usize, sample: i16) {
    buffer[2 * index..2 * index + 2].copy_from_slice(&sample.to_le_bytes());
}

/// A forward-only stream of samples drawn from a byte range of the input.
pub(crate) struct SampleStream<'r> {
    reader: &'r mut ByteReader,
    buffer: Vec<u8>,
    filled: usize,
    offset: usize,
    remaining: u64,
}

impl<'r> SampleStream<'r> {
    /// Streams `bytes` bytes of samples starting at `start`.
    pub fn new(reader: &'r mut ByteReader, start: u64, bytes: u64) -> Result<SampleStream<'r>> {
        reader.seek(start)?;
        Ok(SampleStream {
            reader,
            buffer: vec![0u8; STREAM_BUFFER_SIZE],
            filled: 0,
            offset: 0,
            remaining: bytes,
        })
    }

    /// The next sample, or `None` once the range is exhausted.
    pub fn next_sample(&mut self) -> Result<Option<i16>> {
        if self.offset >= self.filled {
            if self.remaining < 2 {
                return Ok(None);
            }
            let want = (self.buffer.len() as u64).min(self.remaining) as usize & !1;
            self.reader.read_exact(&mut self.buffer[..want])?;
            self.remaining -= want as u64;
            self.filled = want;
            self.offset = 0;
        }
        let sample = sample_at(&self.buffer, self.offset / 2);
        self.offset += 2;
        Ok(Some(sample))
    }
}

/// Accumulates output samples and flushes them in large writes.
pub(crate) struct SampleSink<'w> {
    writer: &'w mut ByteWriter,
    buffer: Vec<u8>,
    used: usize,
}

impl<'w> SampleSink<'w> {
    pub fn new(writer: &'w mut ByteWriter) -> SampleSink<'w> {
        SampleSink {
            writer,
            buffer: vec![0u8; STREAM_BUFFER_SIZE],
            used: 0,
        }
    }

    pub fn push(&mut self, sample: i16) -> Result<()> {
        if self.used == self.buffer.len() {
            self.flush()?;
        }
        put_sample_at(&mut self.buffer, self.used / 2, sample);
        self.used += 2;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.used > 0 {
            self.writer.write_all(&self.buffer[..self.used])?;
            self.used = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{put_sample_at, sample_at};

    #[test]
    fn sample_accessors_are_little_endian() {
        let mut buffer = [0u8; 6];
        put_sample_at(&mut buffer, 0, -2);
        put_sample_at(&mut buffer, 1, 0x0102);
        put_sample_at(&mut buffer, 2, i16::MIN);
        assert_eq!(buffer, [0xFE, 0xFF, 0x02, 0x01, 0x00, 0x80]);
        assert_eq!(sample_at(&buffer, 0), -2);
        assert_eq!(sample_at(&buffer, 1), 0x0102);
        assert_eq!(sample_at(&buffer, 2), i16::MIN);
    }
}
