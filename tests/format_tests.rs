//! Layout detection and normalization over the on-disk fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use proptest::prelude::*;
use rstest::rstest;

use coqu::source::format::{detect, normalize, SourceFormat};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn fixture_text(name: &str) -> String {
    fs::read_to_string(fixture(name)).unwrap()
}

#[rstest]
#[case("sample.cbl", SourceFormat::Standard)]
#[case("seqnum.cbl", SourceFormat::Sequence)]
#[case("panvalet.cbl", SourceFormat::Panvalet)]
fn detection(#[case] name: &str, #[case] expected: SourceFormat) {
    assert_eq!(detect(&fixture_text(name)), expected);
}

#[test]
fn sequence_normalization_strips_both_margins() {
    let norm = normalize(&fixture_text("seqnum.cbl"));
    assert_eq!(norm.format, SourceFormat::Sequence);
    // Sequence numbers and the identification area are both gone.
    assert!(!norm.text().contains("000100"));
    assert!(!norm.text().contains("SQ0000"));
    assert!(norm.text().contains("IDENTIFICATION DIVISION."));
    // Original line numbers survive.
    assert_eq!(norm.lines[0].number, 1);
    assert_eq!(norm.lines.last().unwrap().number, norm.lines.len());
}

#[test]
fn panvalet_normalization_strips_markers_and_numbers() {
    let norm = normalize(&fixture_text("panvalet.cbl"));
    assert_eq!(norm.format, SourceFormat::Panvalet);
    assert!(norm.text().contains("IDENTIFICATION DIVISION."));
    assert!(!norm.text().contains("+000100"));
}

#[rstest]
#[case("sample.cbl")]
#[case("seqnum.cbl")]
#[case("panvalet.cbl")]
fn normalization_is_idempotent_on_fixtures(#[case] name: &str) {
    let once = normalize(&fixture_text(name));
    let twice = normalize(&once.text());
    assert_eq!(once.text(), twice.text());
}

#[test]
fn comment_indicator_survives_normalization() {
    let text = "000100* HEADER CARD\n000200 MOVE A TO B.\n";
    let norm = normalize(text);
    assert_eq!(norm.format, SourceFormat::Sequence);
    // Indicator column stays at column 7.
    assert_eq!(norm.lines[0].text.chars().nth(6), Some('*'));
}

proptest! {
    // Free-text sources classify standard and pass through untouched, so a
    // second pass changes nothing.
    #[test]
    fn normalization_idempotent_on_free_text(
        src in proptest::collection::vec("[A-Z \\-\\.]{0,40}", 0..40)
    ) {
        let text = src.join("\n");
        let once = normalize(&text);
        let twice = normalize(&once.text());
        prop_assert_eq!(once.text(), twice.text());
    }
}
