use std::fmt;
use std::io;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The class of PPS irregularity detected by the sync planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpsAnomalyKind {
    /// One or more one-second PPS events did not arrive.
    MissedPps,
    /// A PPS event disagrees with its neighbours by more than the
    /// oscillator tolerances allow.
    Misaligned,
    /// An interval's corrected sample rate still differs from the
    /// running average after fix-ups.
    UnusualRate,
    /// The device reported more filled than written buffers; samples
    /// were lost before reaching the card.
    BufferOverflow,
}

impl fmt::Display for PpsAnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PpsAnomalyKind::MissedPps => "missed PPS event",
            PpsAnomalyKind::Misaligned => "misaligned PPS event",
            PpsAnomalyKind::UnusualRate => "unusual sample rate",
            PpsAnomalyKind::BufferOverflow => "buffer overflow",
        };
        f.write_str(text)
    }
}

/// All the ways a toolkit operation can fail.
///
/// Every operation returns one of these; nothing panics across the
/// library boundary. Partially written outputs left behind by a failed
/// operation are junk and should be deleted by the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A parameter failed its type or range check.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The file name is not in a recognised recording format.
    #[error("file name is not in a recognised format")]
    FilenameInvalid,

    /// The WAV container could not be parsed.
    #[error("header is invalid: {0}")]
    HeaderInvalid(&'static str),

    /// The file name does not agree with the metadata inside the file.
    #[error("file name does not match the recording metadata")]
    MetadataMismatch,

    /// Reading the input failed.
    #[error("could not read input: {0}")]
    InputReadFailed(io::Error),

    /// Writing an output failed.
    #[error("could not write output: {0}")]
    OutputWriteFailed(io::Error),

    /// The input file is empty.
    #[error("input file is empty")]
    FileSizeZero,

    /// An output would exceed the 32-bit RIFF size limit.
    #[error("output would exceed the maximum WAV file size")]
    FileSizeExceedsLimit,

    /// The GPS log never records the clock being set.
    #[error("time was never set from the GPS")]
    TimeSourceInvalid,

    /// Fewer than two usable GPS fixes were recovered.
    #[error("fewer than two GPS fixes were recovered")]
    InsufficientFixes,

    /// Fewer than two PPS events are present in the companion CSV.
    #[error("fewer than two PPS events are present")]
    InsufficientEvents,

    /// The PPS record is inconsistent and auto-resolution was not
    /// requested.
    #[error("PPS anomaly: {0}")]
    PpsAnomaly(PpsAnomalyKind),

    /// The recording does not fall inside the span of GPS fixes.
    #[error("recording falls outside the GPS fix range")]
    RecordingOutsideFixes,

    /// The GPS-derived sample rate disagrees with the WAV header.
    #[error("sample rate does not match the GPS estimate")]
    SampleRateMismatch,
}
