//! Post-processing toolkit for AudioMoth acoustic logger recordings.
//!
//! The loggers write 16-bit little-endian mono PCM WAV files whose
//! headers carry textual metadata (recording time, device identifier,
//! timezone, temperature, battery voltage) and may be followed by a
//! GUANO bat-recording metadata chunk. This crate transforms those
//! files:
//!
//! - [`split`] cuts a long recording into uniform-duration pieces.
//! - [`downsample`] converts to a lower rate by integer over-sampling,
//!   averaging and linear interpolation.
//! - [`expand`] reconstructs a trigger-compressed recording, whose
//!   silent runs are stored as 512-byte sentinel blocks, into a
//!   conventional PCM timeline.
//! - [`sync`] corrects a GPS-disciplined recording against its
//!   companion CSV of per-second PPS events.
//! - [`Aligner`] aligns unsynchronised recordings to an independent GPS
//!   fix log, compensating clock drift.
//! - [`Summariser`] describes a whole recording collection as a CSV.
//!
//! Every operation is synchronous and streaming: one input, a plan
//! built in memory, then fixed-size buffers moving bytes to the
//! outputs. Nothing holds a whole payload in memory, and an optional
//! [`Progress`] callback reports integer percentages.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use mothkit::{split, Progress, SECONDS_IN_DAY};
//!
//! fn main() -> mothkit::Result<()> {
//!     let report = split(
//!         Path::new("20230101_000000.WAV"),
//!         Path::new("out"),
//!         None,
//!         SECONDS_IN_DAY,
//!         Progress::none(),
//!     )?;
//!     println!("wrote {} files", report.files.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod align;
mod common;
mod csv;
mod downsample;
mod error;
mod expand;
mod filename;
mod io;
mod progress;
mod resample;
mod split;
mod summary;
mod sync;
pub mod wav;

pub use align::{Aligner, SampleRateCalculation};
pub use common::{SampleRate, RECORDING_SAMPLE_RATES, SECONDS_IN_DAY};
pub use downsample::{downsample, DownsampleReport};
pub use error::{Error, PpsAnomalyKind, Result};
pub use expand::{expand, ExpandOptions, ExpandReport, ExpansionMode};
pub use progress::Progress;
pub use split::{split, SplitReport};
pub use summary::Summariser;
pub use sync::{sync, SyncOptions, SyncReport};
