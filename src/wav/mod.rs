//! A restricted RIFF/WAVE codec for AudioMoth recordings.
//!
//! The devices write a fixed container shape: `RIFF` … `WAVE`, a PCM
//! `fmt ` chunk, a `LIST`/`INFO` chunk whose `ICMT` and `IART` entries
//! carry the recording comment and artist, the `data` payload, and an
//! optional trailing `guan` chunk holding GUANO metadata. The codec
//! parses that shape, tolerates extra chunks by carrying their bytes
//! through untouched, and can rewrite the header with updated sizes,
//! comment text and sample rate while leaving everything else
//! byte-identical.

pub(crate) mod comment;
mod guano;
mod header;

pub use guano::Guano;
pub use header::WavHeader;
