//! Engine error taxonomy
//!
//! Fatal error kinds surfaced to callers. Recoverable conditions (unresolved
//! copybooks, cyclic COPY chains, parser diagnostics) are not errors: they are
//! recorded on the affected program and the operation completes. A name lookup
//! with no hit is a structured empty result, never an error.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown command or invalid flag combination.
    #[error("usage: {0}")]
    Usage(String),

    /// The source (or script) file could not be read.
    #[error("cannot access {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Source bytes undecodable as UTF-8 or Latin-1.
    #[error("{path}: undecodable byte at offset {offset}")]
    Decoding { path: PathBuf, offset: usize },

    /// A query that cannot be executed (no loaded program, bad target).
    #[error("{0}")]
    Query(String),

    /// Invalid user-supplied regular expression.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A cache maintenance operation failed outright.
    #[error("cache: {0}")]
    Cache(String),

    /// A load was cancelled at a safe point; no state was persisted.
    #[error("interrupted")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Process exit code for one-shot and script modes.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Usage(_) => 2,
            EngineError::FileAccess { .. } | EngineError::Decoding { .. } => 3,
            EngineError::Query(_) | EngineError::Pattern(_) | EngineError::Cache(_) => 4,
            EngineError::Interrupted => 130,
        }
    }
}
