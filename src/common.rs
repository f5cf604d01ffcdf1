/// Stream sample rate (samples per second).
pub type SampleRate = u32;

/// The sample rates the AudioMoth family records at, in Hz.
pub const RECORDING_SAMPLE_RATES: [SampleRate; 8] =
    [8000, 16000, 32000, 48000, 96000, 192000, 250000, 384000];

/// Bytes occupied by one 16-bit PCM sample.
pub(crate) const BYTES_PER_SAMPLE: u64 = 2;

/// Duration of a whole day of recording, in seconds. The default slice
/// length for splitting and expansion.
pub const SECONDS_IN_DAY: u32 = 86_400;

/// A RIFF container addresses its contents with 32-bit sizes; no output
/// may grow past this.
pub(crate) const MAXIMUM_WAV_SIZE: u64 = u32::MAX as u64;

/// Working buffer for headers and GUANO chunks.
pub(crate) const HEADER_BUFFER_SIZE: usize = 32 * 1024;

/// Working buffer for streaming sample payloads.
pub(crate) const STREAM_BUFFER_SIZE: usize = 1024 * 1024;

/// Returns whether `rate` is one of the rates the devices record at.
pub(crate) fn is_recording_sample_rate(rate: SampleRate) -> bool {
    RECORDING_SAMPLE_RATES.contains(&rate)
}
