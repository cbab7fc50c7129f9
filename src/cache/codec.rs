//! Cache entry codec
//!
//! Layout, stable across tool versions: magic `COQU`, big-endian u16 codec
//! version, then length-prefixed frames: tool version string, JSON header,
//! JSON index record, and an optional JSON AST record. Frames carry field
//! names, so a reader can reject a record it does not understand instead of
//! misreading it; any magic or version mismatch is a cache miss upstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::index::StructuralIndex;
use crate::parse::ParseOutcome;
use crate::source::format::SourceFormat;

pub const MAGIC: [u8; 4] = *b"COQU";
pub const CODEC_VERSION: u16 = 1;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("record truncated")]
    Truncated,
    #[error("bad magic bytes")]
    BadMagic,
    #[error("codec version {0} not supported")]
    Version(u16),
    #[error("record body: {0}")]
    Body(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHeader {
    pub source_path: String,
    pub source_hash: String,
    pub lines: usize,
    pub cached_at: DateTime<Utc>,
    pub format: SourceFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub header: CacheHeader,
    pub index: StructuralIndex,
    pub ast: Option<ParseOutcome>,
}

pub fn encode(entry: &CacheEntry) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&CODEC_VERSION.to_be_bytes());
    frame(&mut buf, env!("CARGO_PKG_VERSION").as_bytes());
    frame(&mut buf, &serde_json::to_vec(&entry.header)?);
    frame(&mut buf, &serde_json::to_vec(&entry.index)?);
    if let Some(ast) = &entry.ast {
        frame(&mut buf, &serde_json::to_vec(ast)?);
    }
    Ok(buf)
}

pub fn decode(bytes: &[u8]) -> Result<CacheEntry, CodecError> {
    let mut cursor = Cursor { bytes, pos: 0 };
    if cursor.take(4)? != MAGIC.as_slice() {
        return Err(CodecError::BadMagic);
    }
    let version = u16::from_be_bytes(cursor.take(2)?.try_into().unwrap_or([0, 0]));
    if version != CODEC_VERSION {
        return Err(CodecError::Version(version));
    }
    let _tool_version = cursor.frame()?;
    let header: CacheHeader = serde_json::from_slice(cursor.frame()?)?;
    let index: StructuralIndex = serde_json::from_slice(cursor.frame()?)?;
    let ast = if cursor.pos < cursor.bytes.len() {
        Some(serde_json::from_slice(cursor.frame()?)?)
    } else {
        None
    };
    Ok(CacheEntry { header, index, ast })
}

fn frame(buf: &mut Vec<u8>, body: &[u8]) {
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(body);
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.pos + n > self.bytes.len() {
            return Err(CodecError::Truncated);
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn frame(&mut self) -> Result<&'a [u8], CodecError> {
        let len_bytes = self.take(4)?;
        let len = u32::from_be_bytes(len_bytes.try_into().unwrap_or([0; 4])) as usize;
        self.take(len)
    }
}
