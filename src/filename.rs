//! Recording filename validation.
//!
//! Each operation accepts a particular filename shape around the
//! `YYYYMMDD_HHMMSS` timestring. The validator extracts the surrounding
//! prefix and postfix, then cross-checks the timestring against the
//! `Recorded at` fields of the comment and, where required, the prefix
//! against the `IART` artist.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::wav::comment::{format_local_datetime, parse_recorded_at, RecordedAt};
use crate::wav::WavHeader;

/// The literal tag the firmware prepends to the device identifier in
/// the `IART` artist string.
const ARTIST_TAG: &str = "AudioMoth ";

static SPLIT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)(\d{8}_\d{6})(_SYNC)?\.WAV$").unwrap());

static EXPAND_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)(\d{8}_\d{6}|\d{6})T\.WAV$").unwrap());

static SYNC_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)(\d{8}_\d{6})\.WAV$").unwrap());

static ANY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)(\d{8}_\d{6}|\d{6})(_\d{3})?(T|_SYNC)?\.WAV$").unwrap()
});

/// The operation a filename is being validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Split,
    Downsample,
    Expand,
    Sync,
}

/// The pieces of a recognised recording filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedFilename {
    pub prefix: String,
    pub timestring: String,
    pub postfix: String,
}

/// Splits `name` against the pattern for `operation`.
pub(crate) fn parse(name: &str, operation: Operation) -> Result<ParsedFilename> {
    let pattern = match operation {
        Operation::Split | Operation::Downsample => &SPLIT_NAME,
        Operation::Expand => &EXPAND_NAME,
        Operation::Sync => &SYNC_NAME,
    };
    let captures = pattern.captures(name).ok_or(Error::FilenameInvalid)?;
    let postfix = match operation {
        // An existing _SYNC postfix is preserved on outputs.
        Operation::Split | Operation::Downsample => captures
            .get(3)
            .map(|m| m.as_str().to_owned())
            .unwrap_or_default(),
        Operation::Expand | Operation::Sync => String::new(),
    };
    Ok(ParsedFilename {
        prefix: captures[1].to_owned(),
        timestring: captures[2].to_owned(),
        postfix,
    })
}

/// Cross-checks a parsed filename against the recording metadata and
/// returns the original timestamp.
pub(crate) fn validate(
    parsed: &ParsedFilename,
    header: &WavHeader,
    operation: Operation,
) -> Result<RecordedAt> {
    let comment = header.comment().ok_or(Error::MetadataMismatch)?;
    let recorded = parse_recorded_at(comment).ok_or(Error::MetadataMismatch)?;

    let pattern = if parsed.timestring.len() == 6 {
        "%H%M%S"
    } else {
        "%Y%m%d_%H%M%S"
    };
    let expected = format_local_datetime(recorded.timestamp, recorded.timezone_minutes, pattern)
        .ok_or(Error::MetadataMismatch)?;
    if expected != parsed.timestring {
        return Err(Error::MetadataMismatch);
    }

    if matches!(operation, Operation::Expand | Operation::Sync) && !parsed.prefix.is_empty() {
        let artist = header.artist().ok_or(Error::MetadataMismatch)?;
        let device = artist
            .strip_prefix(ARTIST_TAG)
            .ok_or(Error::MetadataMismatch)?;
        if parsed.prefix.trim_end_matches('_') != device {
            return Err(Error::MetadataMismatch);
        }
    }

    Ok(recorded)
}

/// Whether `name` matches any recognised recording shape; reports the
/// trigger marker for the Summariser.
pub(crate) fn recognise(name: &str) -> Option<bool> {
    let captures = ANY_NAME.captures(name)?;
    Some(captures.get(4).map(|m| m.as_str()) == Some("T"))
}

/// Builds an output filename:
/// `[prefix_][existing_prefix]YYYYMMDD_HHMMSS[_mmm][postfix].WAV`.
pub(crate) fn output_name(
    prefix: Option<&str>,
    existing_prefix: &str,
    timestamp: i64,
    timezone_minutes: i32,
    milliseconds: Option<u32>,
    postfix: &str,
) -> Result<String> {
    let time = format_local_datetime(timestamp, timezone_minutes, "%Y%m%d_%H%M%S")
        .ok_or(Error::InvalidArgument("timestamp is out of range"))?;
    let mut name = String::new();
    if let Some(prefix) = prefix {
        if !prefix.is_empty() {
            name.push_str(prefix);
            name.push('_');
        }
    }
    name.push_str(existing_prefix);
    name.push_str(&time);
    if let Some(milliseconds) = milliseconds {
        name.push_str(&format!("_{milliseconds:03}"));
    }
    name.push_str(postfix);
    name.push_str(".WAV");
    Ok(name)
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("20230101_000000.WAV", "", "20230101_000000", "")]
    #[case("24F3190361DA6A5F_20230101_000000.WAV", "24F3190361DA6A5F_", "20230101_000000", "")]
    #[case("20230101_000000_SYNC.WAV", "", "20230101_000000", "_SYNC")]
    fn split_names(
        #[case] name: &str,
        #[case] prefix: &str,
        #[case] timestring: &str,
        #[case] postfix: &str,
    ) {
        let parsed = parse(name, Operation::Split).unwrap();
        assert_eq!(parsed.prefix, prefix);
        assert_eq!(parsed.timestring, timestring);
        assert_eq!(parsed.postfix, postfix);
    }

    #[rstest]
    #[case("20230101_000000T.WAV", "20230101_000000")]
    #[case("000000T.WAV", "000000")]
    fn expand_accepts_trigger_names(#[case] name: &str, #[case] timestring: &str) {
        let parsed = parse(name, Operation::Expand).unwrap();
        assert_eq!(parsed.timestring, timestring);
    }

    #[rstest]
    #[case("20230101_000000.WAV", Operation::Expand)]
    #[case("20230101_000000T.WAV", Operation::Sync)]
    #[case("notarecording.WAV", Operation::Split)]
    #[case("20230101_000000.wav", Operation::Split)]
    fn rejected_names(#[case] name: &str, #[case] operation: Operation) {
        assert!(matches!(
            parse(name, operation),
            Err(Error::FilenameInvalid)
        ));
    }

    #[test]
    fn recognises_the_union_of_shapes() {
        assert_eq!(recognise("20230101_000000.WAV"), Some(false));
        assert_eq!(recognise("20230101_000000T.WAV"), Some(true));
        assert_eq!(recognise("20230101_000000_500.WAV"), Some(false));
        assert_eq!(recognise("20230101_000000_SYNC.WAV"), Some(false));
        assert_eq!(recognise("README.TXT"), None);
    }

    #[test]
    fn builds_output_names() {
        // 2023-01-01 00:00:03 UTC
        let timestamp = 1_672_531_203_000;
        assert_eq!(
            output_name(None, "", timestamp, 0, None, "").unwrap(),
            "20230101_000003.WAV"
        );
        assert_eq!(
            output_name(Some("OUT"), "DEV_", timestamp, 0, Some(250), "_SYNC").unwrap(),
            "OUT_DEV_20230101_000003_250_SYNC.WAV"
        );
        // The timestring is rendered in the recording's local time.
        assert_eq!(
            output_name(None, "", timestamp, 60, None, "").unwrap(),
            "20230101_010003.WAV"
        );
    }
}
