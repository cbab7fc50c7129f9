//! coqu — structural and semantic queries over large COBOL sources
//!
//! The engine loads a compilation unit, normalizes its layout, expands
//! copybooks, and builds a line-span skeleton of divisions, sections,
//! paragraphs and data items without a full parse. Indexes and ASTs are
//! cached content-addressed, so reloading an unchanged file is a file read
//! plus a hash. A small command language (see [`query`]) answers structural
//! questions from the index alone and semantic ones (PERFORM/CALL/MOVE/GO TO
//! edges) from on-demand chunk analysis or a full parse.
//!
//! Pipeline: [`source`] → [`source::format`] → [`preproc`] → [`index`] →
//! [`cache`], orchestrated by [`workspace`]. The [`cli`] module and the
//! `coqu` binary are thin callers; nothing in the engine depends on them.

pub mod analyze;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod parse;
pub mod preproc;
pub mod query;
pub mod source;
pub mod workspace;

pub use error::{EngineError, Result};
