mod test_support;

use mothkit::{Progress, Summariser};
use test_support::*;

#[test]
fn valid_and_empty_files_both_get_rows() {
    let dir = scratch("summary_rows");
    let comment = comment_for("00:00:00", "01/01/2023", "UTC");
    let samples = sample_values(48_000);
    let valid = dir.join("20230101_000000.WAV");
    write_file(
        &valid,
        &wav_bytes(48_000, &comment, &sample_bytes(&samples), Some(GUANO_TEXT)),
    );
    let empty = dir.join("20230102_000000.WAV");
    write_file(&empty, &[]);

    let mut summariser = Summariser::new();
    summariser.summarise(&dir, &valid, Progress::none()).unwrap();
    summariser.summarise(&dir, &empty, Progress::none()).unwrap();
    let path = summariser.finalise(&dir).unwrap();
    assert_eq!(path.file_name().unwrap().to_string_lossy(), "SUMMARY.CSV");

    let csv = std::fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("File Name,Folder,File Size (bytes)"));
    assert_eq!(
        lines[1],
        "20230101_000000.WAV,,96644,2023-01-01 00:00:00 (UTC),48000,48000,\
         1.000,FALSE,51.500720,-0.127500,21.3,4.2"
    );
    // The unreadable file keeps only its name, folder and size.
    assert_eq!(lines[2], "20230102_000000.WAV,,0,,,,,,,,,");
}

#[test]
fn triggered_recordings_report_their_expanded_length() {
    let dir = scratch("summary_triggered");
    let comment = comment_for("00:00:00", "01/01/2023", "UTC");
    let mut payload = sample_bytes(&sample_values(256));
    payload.extend_from_slice(&sentinel_block(7));
    let input = dir.join("20230101_000000T.WAV");
    write_file(&input, &wav_bytes(48_000, &comment, &payload, None));

    let mut summariser = Summariser::new();
    summariser.summarise(&dir, &input, Progress::none()).unwrap();
    let path = summariser.finalise(&dir).unwrap();
    let csv = std::fs::read_to_string(path).unwrap();
    let row = csv.lines().nth(1).unwrap();
    // 512 audio bytes + 7 silent blocks = 2048 samples when expanded.
    assert!(row.contains(",TRUE,"));
    assert!(row.contains(",2048,"));
}

#[test]
fn rows_are_sorted_by_folder_then_name() {
    let dir = scratch("summary_sorted");
    let nested = dir.join("NESTED");
    std::fs::create_dir_all(&nested).unwrap();
    let comment = comment_for("00:00:00", "01/01/2023", "UTC");
    let bytes = wav_bytes(48_000, &comment, &[], None);

    let a = dir.join("20230101_000000.WAV");
    let b = nested.join("20230101_000000.WAV");
    write_file(&a, &bytes);
    write_file(&b, &bytes);

    let mut summariser = Summariser::new();
    // Deliberately out of order.
    summariser.summarise(&dir, &b, Progress::none()).unwrap();
    summariser.summarise(&dir, &a, Progress::none()).unwrap();
    let path = summariser.finalise(&dir).unwrap();
    let csv = std::fs::read_to_string(path).unwrap();
    let folders: Vec<&str> = csv
        .lines()
        .skip(1)
        .map(|line| line.split(',').nth(1).unwrap())
        .collect();
    assert_eq!(folders, vec!["", "NESTED"]);
}

#[test]
fn finalising_without_reinitialising_duplicates_rows() {
    let dir = scratch("summary_duplicates");
    let comment = comment_for("00:00:00", "01/01/2023", "UTC");
    let input = dir.join("20230101_000000.WAV");
    write_file(&input, &wav_bytes(48_000, &comment, &[], None));

    let mut summariser = Summariser::new();
    summariser.summarise(&dir, &input, Progress::none()).unwrap();
    summariser.summarise(&dir, &input, Progress::none()).unwrap();
    let path = summariser.finalise(&dir).unwrap();
    let csv = std::fs::read_to_string(path).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert_eq!(csv.lines().nth(1), csv.lines().nth(2));
}

#[test]
fn unrecognised_names_are_rejected() {
    let dir = scratch("summary_unrecognised");
    let stray = dir.join("NOTES.TXT");
    write_file(&stray, b"not a recording");
    let mut summariser = Summariser::new();
    assert!(summariser.summarise(&dir, &stray, Progress::none()).is_err());
}
