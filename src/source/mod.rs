//! Source reading and decoding
//!
//! Reads a compilation unit into memory, decodes it (UTF-8 with a Latin-1
//! fallback; EBCDIC is out of scope), and exposes numbered logical lines.
//! Line numbers are 1-based everywhere in the engine.

pub mod format;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Utf8,
    Latin1,
}

/// A decoded source file. The raw bytes are retained because cache keys are
/// computed over them, before any normalization.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub text: String,
    pub encoding: Encoding,
}

impl SourceFile {
    pub fn read(path: &Path) -> Result<SourceFile> {
        let bytes = fs::read(path).map_err(|source| EngineError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
        SourceFile::from_bytes(path, bytes)
    }

    pub fn from_bytes(path: &Path, bytes: Vec<u8>) -> Result<SourceFile> {
        // NUL bytes mean binary content in either encoding.
        if let Some(offset) = bytes.iter().position(|&b| b == 0) {
            return Err(EngineError::Decoding {
                path: path.to_path_buf(),
                offset,
            });
        }
        let (text, encoding) = match std::str::from_utf8(&bytes) {
            Ok(s) => (s.to_string(), Encoding::Utf8),
            Err(_) => (bytes.iter().map(|&b| b as char).collect(), Encoding::Latin1),
        };
        Ok(SourceFile {
            path: path.to_path_buf(),
            bytes,
            text,
            encoding,
        })
    }

    pub fn line_count(&self) -> usize {
        count_lines(&self.text)
    }

    /// Numbered lines, with trailing `\r` stripped.
    pub fn lines(&self) -> impl Iterator<Item = (usize, &str)> {
        iter_lines(&self.text)
    }
}

pub fn count_lines(text: &str) -> usize {
    iter_lines(text).count()
}

// `split('\n')` yields a trailing empty element for newline-terminated text;
// drop it so the line count matches what an editor reports.
pub fn iter_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut lines: Vec<&str> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();
    if text.ends_with('\n') {
        lines.pop();
    }
    lines.into_iter().enumerate().map(|(i, l)| (i + 1, l))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_is_preferred() {
        let src = SourceFile::from_bytes(Path::new("a.cbl"), b"HELLO\n".to_vec()).unwrap();
        assert_eq!(src.encoding, Encoding::Utf8);
        assert_eq!(src.text, "HELLO\n");
    }

    #[test]
    fn latin1_fallback_maps_bytes() {
        let src = SourceFile::from_bytes(Path::new("a.cbl"), vec![b'A', 0xE9, b'\n']).unwrap();
        assert_eq!(src.encoding, Encoding::Latin1);
        assert_eq!(src.text, "A\u{e9}\n");
    }

    #[test]
    fn nul_byte_reports_offset() {
        let err = SourceFile::from_bytes(Path::new("a.cbl"), vec![b'A', 0, b'B']).unwrap_err();
        match err {
            EngineError::Decoding { offset, .. } => assert_eq!(offset, 1),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn line_numbering_is_one_based_and_ignores_trailing_newline() {
        let src = SourceFile::from_bytes(Path::new("a.cbl"), b"A\nB\nC\n".to_vec()).unwrap();
        let lines: Vec<_> = src.lines().collect();
        assert_eq!(lines, vec![(1, "A"), (2, "B"), (3, "C")]);
        assert_eq!(src.line_count(), 3);
    }
}
