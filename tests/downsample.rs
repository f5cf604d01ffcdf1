mod test_support;

use mothkit::{downsample, Error, Progress};
use test_support::*;

#[test]
fn three_to_one_block_means() {
    let dir = scratch("downsample_means");
    let out = dir.join("out");
    std::fs::create_dir_all(&out).unwrap();
    let comment = comment_for("00:00:00", "01/01/2023", "UTC");
    let samples = sample_values(96_000); // 2 s at 48 kHz
    let input = dir.join("20230101_000000.WAV");
    write_file(
        &input,
        &wav_bytes(48_000, &comment, &sample_bytes(&samples), Some(GUANO_TEXT)),
    );

    let report = downsample(&input, &out, None, 16_000, Progress::none()).unwrap();
    assert_eq!(report.output_samples, 32_000);

    let bytes = read_file(&report.file);
    let header = header_of(&bytes);
    assert_eq!(header.sample_rate(), 16_000);
    assert_eq!(header.data_size(), 64_000);
    // The GUANO is carried through after the new data.
    assert_eq!(guano_text_of(&bytes).as_deref(), Some(GUANO_TEXT));

    let data = data_of(&bytes);
    for index in 0..32_000usize {
        let mean = (samples[3 * index] as f64
            + samples[3 * index + 1] as f64
            + samples[3 * index + 2] as f64)
            / 3.0;
        let expected = mean.round() as i16;
        let actual =
            i16::from_le_bytes([data[2 * index], data[2 * index + 1]]);
        assert_eq!(actual, expected, "sample {index}");
    }
}

#[test]
fn equal_rates_are_the_identity() {
    let dir = scratch("downsample_identity");
    let out = dir.join("out");
    std::fs::create_dir_all(&out).unwrap();
    let comment = comment_for("00:00:00", "01/01/2023", "UTC");
    let samples = sample_values(48_000);
    let input = dir.join("20230101_000000.WAV");
    write_file(
        &input,
        &wav_bytes(48_000, &comment, &sample_bytes(&samples), None),
    );

    let report = downsample(&input, &out, None, 48_000, Progress::none()).unwrap();
    let bytes = read_file(&report.file);
    assert_eq!(header_of(&bytes).sample_rate(), 48_000);
    assert_eq!(data_of(&bytes), &sample_bytes(&samples)[..]);
}

#[test]
fn requested_rate_above_source_is_rejected() {
    let dir = scratch("downsample_above");
    let comment = comment_for("00:00:00", "01/01/2023", "UTC");
    let input = dir.join("20230101_000000.WAV");
    write_file(&input, &wav_bytes(48_000, &comment, &[0; 9600], None));
    assert!(matches!(
        downsample(&input, &dir, None, 96_000, Progress::none()),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn unrecognised_rate_is_rejected() {
    let dir = scratch("downsample_bad_rate");
    let input = dir.join("20230101_000000.WAV");
    write_file(&input, b"placeholder");
    assert!(matches!(
        downsample(&input, &dir, None, 44_100, Progress::none()),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn sync_postfix_is_preserved() {
    let dir = scratch("downsample_postfix");
    let out = dir.join("out");
    std::fs::create_dir_all(&out).unwrap();
    let comment = comment_for("00:00:00", "01/01/2023", "UTC");
    let samples = sample_values(9600);
    let input = dir.join("20230101_000000_SYNC.WAV");
    write_file(
        &input,
        &wav_bytes(96_000, &comment, &sample_bytes(&samples), None),
    );

    let report = downsample(&input, &out, None, 48_000, Progress::none()).unwrap();
    assert_eq!(
        report.file.file_name().unwrap().to_string_lossy(),
        "20230101_000000_SYNC.WAV"
    );
    assert_eq!(report.output_samples, 4800);
}
