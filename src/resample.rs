//! Shared pieces of the rate-conversion engines.
//!
//! Downsample, Sync and Align all move samples between rates with the
//! same two ingredients: an exact integer-ratio output length, and
//! 64-bit linear interpolation between neighbouring input samples. The
//! operation order here is fixed; reproducibility of the float results
//! depends on it.

use num_rational::Ratio;

/// Number of output samples produced when `input_samples` are converted
/// from `source_rate` to `target_rate`.
///
/// Both rates are whole kilohertz multiples on these devices, so the
/// ratio is reduced over the kHz counts before the multiply to keep the
/// arithmetic exact.
pub(crate) fn converted_sample_count(
    input_samples: u64,
    source_rate: u32,
    target_rate: u32,
) -> u64 {
    let (to, from) = Ratio::new(target_rate / 1000, source_rate / 1000).into_raw();
    input_samples * to as u64 / from as u64
}

/// Linear interpolation at `position` between two samples.
///
/// Equivalent to `first * (1 - position) + second * position`.
#[inline]
pub(crate) fn lerp(first: f64, second: f64, position: f64) -> f64 {
    first + (second - first) * position
}

/// Rounds an interpolated value to the nearest representable sample.
#[inline]
pub(crate) fn quantise(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

#[cfg(test)]
mod test {
    use super::{converted_sample_count, lerp, quantise};
    use approx::assert_relative_eq;

    #[test]
    fn identity_rate_is_identity_length() {
        assert_eq!(converted_sample_count(96000, 48000, 48000), 96000);
    }

    #[test]
    fn integer_ratio_lengths_are_exact() {
        assert_eq!(converted_sample_count(96000, 48000, 16000), 32000);
        assert_eq!(converted_sample_count(10, 48000, 16000), 3);
        assert_eq!(converted_sample_count(250_000, 250_000, 48000), 48000);
        // 384 kHz to 250 kHz does not divide evenly; the reduced ratio is
        // 125/192.
        assert_eq!(converted_sample_count(384_000, 384_000, 250_000), 250_000);
        assert_eq!(converted_sample_count(191, 384_000, 250_000), 124);
    }

    #[test]
    fn lerp_endpoints_and_midpoint() {
        assert_relative_eq!(lerp(-100.0, 100.0, 0.0), -100.0);
        assert_relative_eq!(lerp(-100.0, 100.0, 1.0), 100.0);
        assert_relative_eq!(lerp(-100.0, 100.0, 0.5), 0.0);
    }

    #[test]
    fn quantise_rounds_and_clamps() {
        assert_eq!(quantise(0.4), 0);
        assert_eq!(quantise(0.5), 1);
        assert_eq!(quantise(-0.5), -1);
        assert_eq!(quantise(40_000.0), i16::MAX);
        assert_eq!(quantise(-40_000.0), i16::MIN);
    }
}
