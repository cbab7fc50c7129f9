//! Source layout detection and normalization
//!
//! COBOL sources arrive in three layouts: free-ish `standard` text, the
//! classic `sequence` card format (sequence numbers in columns 1-6, code in
//! 7-72, identification area from 73), and `panvalet` library listings whose
//! first column carries version markers. Detection samples the first 200
//! non-empty lines; normalization strips the non-code columns while keeping
//! the original line numbers, so every later report points at the user's file.
//!
//! Normalization is idempotent: stripped output classifies as `standard`.

use serde::{Deserialize, Serialize};

use crate::source::iter_lines;

const SAMPLE_LINES: usize = 200;
const SEQUENCE_THRESHOLD: f64 = 0.90;
const PANVALET_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Standard,
    Sequence,
    Panvalet,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceFormat::Standard => "standard",
            SourceFormat::Sequence => "sequence",
            SourceFormat::Panvalet => "panvalet",
        };
        f.write_str(s)
    }
}

/// One normalized line, keyed by its original (pre-normalization) number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedLine {
    pub number: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSource {
    pub format: SourceFormat,
    pub lines: Vec<NormalizedLine>,
}

impl NormalizedSource {
    pub fn line(&self, number: usize) -> Option<&str> {
        self.lines
            .iter()
            .find(|l| l.number == number)
            .map(|l| l.text.as_str())
    }

    /// Rejoin the normalized text (used for idempotence checks and hashing
    /// of intermediate stages, never for reporting).
    pub fn text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }
}

pub fn detect(text: &str) -> SourceFormat {
    let mut sampled = 0usize;
    let mut sequence = 0usize;
    let mut panvalet = 0usize;
    for (_, line) in iter_lines(text) {
        if line.trim().is_empty() {
            continue;
        }
        sampled += 1;
        if has_sequence_area(line) {
            sequence += 1;
        }
        if has_panvalet_marker(line) {
            panvalet += 1;
        }
        if sampled >= SAMPLE_LINES {
            break;
        }
    }
    if sampled == 0 {
        return SourceFormat::Standard;
    }
    let total = sampled as f64;
    if sequence as f64 / total >= SEQUENCE_THRESHOLD {
        SourceFormat::Sequence
    } else if panvalet as f64 / total >= PANVALET_THRESHOLD {
        SourceFormat::Panvalet
    } else {
        SourceFormat::Standard
    }
}

/// Columns 1-6 all digits.
fn has_sequence_area(line: &str) -> bool {
    let prefix: Vec<char> = line.chars().take(6).collect();
    prefix.len() == 6 && prefix.iter().all(|c| c.is_ascii_digit())
}

/// Panvalet version marker in column 1, followed by the usual numbered body.
fn has_panvalet_marker(line: &str) -> bool {
    let mut chars = line.chars();
    match chars.next() {
        Some('+') | Some('-') | Some('*') => {}
        _ => return false,
    }
    // A marker directly against a sequence number or spaces; a lone '*'
    // against area-A text is a comment, not a marker.
    matches!(chars.next(), Some(c) if c.is_ascii_digit() || c == ' ')
}

pub fn normalize(text: &str) -> NormalizedSource {
    let format = detect(text);
    let lines = iter_lines(text)
        .map(|(number, line)| NormalizedLine {
            number,
            text: strip_line(line, format),
        })
        .collect();
    NormalizedSource { format, lines }
}

fn strip_line(line: &str, format: SourceFormat) -> String {
    match format {
        SourceFormat::Standard => line.to_string(),
        // Blank columns 1-6 and drop 73+. Blanking instead of deleting keeps
        // every format's area A at column 8, so the indexer's column rules
        // and reported positions hold across layouts.
        SourceFormat::Sequence => {
            let code: String = line.chars().skip(6).take(66).collect();
            if code.trim().is_empty() {
                String::new()
            } else {
                format!("      {code}")
            }
        }
        // Marker column first, then the usual numbered card underneath.
        SourceFormat::Panvalet => {
            let rest: String = line.chars().skip(1).collect();
            if has_sequence_area(&rest) {
                strip_line(&rest, SourceFormat::Sequence)
            } else {
                rest
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_standard() {
        let text = "       IDENTIFICATION DIVISION.\n       PROGRAM-ID. T.\n";
        assert_eq!(detect(text), SourceFormat::Standard);
    }

    #[test]
    fn numbered_cards_are_sequence_format() {
        let text = "000100 IDENTIFICATION DIVISION.\n000200 PROGRAM-ID. T.\n";
        assert_eq!(detect(text), SourceFormat::Sequence);
        let norm = normalize(text);
        assert_eq!(norm.lines[0].text, "       IDENTIFICATION DIVISION.");
        assert_eq!(norm.lines[0].number, 1);
    }

    #[test]
    fn sequence_strip_removes_identification_area() {
        let code = "000100 MOVE A TO B.";
        let padded = format!("{:<72}SERIAL01", code);
        let norm = normalize(&format!("{padded}\n{padded}\n"));
        assert_eq!(norm.format, SourceFormat::Sequence);
        assert!(!norm.lines[0].text.contains("SERIAL01"));
    }

    #[test]
    fn normalization_is_idempotent() {
        let text = "000100 IDENTIFICATION DIVISION.\n000200*COMMENT CARD\n000300 PROCEDURE DIVISION.\n";
        let once = normalize(text);
        let twice = normalize(&once.text());
        assert_eq!(once.text(), twice.text());
        assert_eq!(twice.format, SourceFormat::Standard);
    }

    #[test]
    fn panvalet_markers_detected_and_stripped() {
        let text = "+000100 IDENTIFICATION DIVISION.\n 000200 PROGRAM-ID. T.\n-000300 PROCEDURE DIVISION.\n";
        assert_eq!(detect(text), SourceFormat::Panvalet);
        let norm = normalize(text);
        assert_eq!(norm.lines[0].text, "       IDENTIFICATION DIVISION.");
        let twice = normalize(&norm.text());
        assert_eq!(norm.text(), twice.text());
    }
}
