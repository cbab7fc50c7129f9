//! Loaded program records

use std::path::PathBuf;

use serde::Serialize;

use crate::index::{LineSpan, StructuralIndex};
use crate::parse::ParseOutcome;
use crate::preproc::PreprocWarning;
use crate::source::format::{NormalizedSource, SourceFormat};
use crate::source::{iter_lines, Encoding};

/// One loaded compilation unit. Identity is the content hash: reloading a
/// changed file produces a new `Program`, swapped in whole. The structural
/// index and AST never mutate after construction.
#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub path: PathBuf,
    pub hash: String,
    pub encoding: Encoding,
    pub format: SourceFormat,
    /// Total lines in the original source.
    pub lines: usize,
    /// Original decoded text, the authority for `--body` output.
    pub raw_text: String,
    pub source: NormalizedSource,
    pub index: StructuralIndex,
    pub ast: Option<ParseOutcome>,
    pub warnings: Vec<PreprocWarning>,
    pub from_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramSummary {
    pub name: String,
    pub path: PathBuf,
    pub lines: usize,
    pub format: SourceFormat,
    pub sections: usize,
    pub paragraphs: usize,
    pub copybooks: usize,
    pub unresolved_copybooks: usize,
    pub from_cache: bool,
    pub has_ast: bool,
}

impl Program {
    /// Original source lines for an inclusive span.
    pub fn original_span(&self, span: LineSpan) -> Vec<(usize, String)> {
        iter_lines(&self.raw_text)
            .filter(|(n, _)| span.contains(*n))
            .map(|(n, l)| (n, l.to_string()))
            .collect()
    }

    /// Normalized lines for a span, the working view for chunk analysis and
    /// segment parsing.
    pub fn normalized_span(&self, span: LineSpan) -> Vec<(usize, String)> {
        self.source
            .lines
            .iter()
            .filter(|l| span.contains(l.number))
            .map(|l| (l.number, l.text.clone()))
            .collect()
    }

    pub fn normalized_lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.source.lines.iter().map(|l| (l.number, l.text.as_str()))
    }

    /// Normalized PROCEDURE DIVISION lines, or empty when there is none.
    pub fn procedure_lines(&self) -> Vec<(usize, String)> {
        match self.index.procedure_span() {
            Some(span) => self.normalized_span(span),
            None => Vec::new(),
        }
    }

    pub fn summary(&self) -> ProgramSummary {
        ProgramSummary {
            name: self.name.clone(),
            path: self.path.clone(),
            lines: self.lines,
            format: self.format,
            sections: self.index.sections.len(),
            paragraphs: self.index.paragraphs.len(),
            copybooks: self.index.copies.len(),
            unresolved_copybooks: self.index.copies.iter().filter(|c| !c.resolved).count(),
            from_cache: self.from_cache,
            has_ast: self.ast.is_some(),
        }
    }
}
