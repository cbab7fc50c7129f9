//! Full parser frontend
//!
//! Drives the grammar backend over a whole expanded stream or an isolated
//! segment. Segment parsing prepends a synthetic `PROCEDURE DIVISION.` header
//! when the slice lacks one, so a paragraph body parses in isolation.
//! Diagnostics accumulate instead of aborting; past the configured threshold
//! the outcome is flagged `degraded` and still returned.

pub mod ast;
pub mod grammar;
pub mod lexer;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use ast::{AstNode, NodeKind, Span};
pub use grammar::{CobolGrammar, Grammar, ParseDiagnostic};
pub use lexer::{Token, TokenKind};

use crate::preproc::ExpandedSource;

static PROCEDURE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*PROCEDURE\s+DIVISION").unwrap());

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Diagnostic count above which the AST is flagged degraded.
    pub diagnostic_threshold: usize,
}

impl Default for ParseOptions {
    fn default() -> ParseOptions {
        ParseOptions {
            diagnostic_threshold: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub ast: AstNode,
    pub diagnostics: Vec<ParseDiagnostic>,
    pub degraded: bool,
}

/// Parse the whole expanded stream. Spans land in root-source coordinates
/// because the stream's anchors do.
pub fn parse_full(expanded: &ExpandedSource, opts: &ParseOptions) -> ParseOutcome {
    let lines: Vec<(usize, String)> = expanded
        .lines
        .iter()
        .map(|l| (l.anchor, l.text.clone()))
        .collect();
    parse_with(&CobolGrammar, &lines, opts)
}

/// Parse an isolated slice, typically one paragraph or section.
pub fn parse_segment(lines: &[(usize, String)], opts: &ParseOptions) -> ParseOutcome {
    let has_header = lines.iter().any(|(_, t)| PROCEDURE_HEADER.is_match(t));
    if has_header {
        return parse_with(&CobolGrammar, lines, opts);
    }
    let first = lines.first().map(|(n, _)| *n).unwrap_or(1);
    let mut synthetic = Vec::with_capacity(lines.len() + 1);
    synthetic.push((first, "       PROCEDURE DIVISION.".to_string()));
    synthetic.extend(lines.iter().cloned());
    parse_with(&CobolGrammar, &synthetic, opts)
}

/// Run any grammar backend over numbered lines.
pub fn parse_with<G: Grammar>(
    grammar: &G,
    lines: &[(usize, String)],
    opts: &ParseOptions,
) -> ParseOutcome {
    let tokens = grammar.tokenize(lines);
    let (ast, diagnostics) = grammar.parse(&tokens);
    let degraded = diagnostics.len() > opts.diagnostic_threshold;
    ParseOutcome {
        ast,
        diagnostics,
        degraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(src: &str, start: usize) -> Vec<(usize, String)> {
        src.lines()
            .enumerate()
            .map(|(i, l)| (start + i, l.to_string()))
            .collect()
    }

    #[test]
    fn segment_gets_synthetic_header() {
        let lines = numbered("       2100-VALIDATE.\n           CALL 'AUDITLOG'.\n", 120);
        let outcome = parse_segment(&lines, &ParseOptions::default());
        assert!(outcome.diagnostics.is_empty());
        let para = outcome.ast.find_paragraph("2100-VALIDATE").unwrap();
        assert_eq!(para.span.start_line, 120);
    }

    #[test]
    fn degraded_flag_uses_threshold() {
        let mut src = String::from("       PROCEDURE DIVISION.\n       P1.\n");
        for _ in 0..3 {
            src.push_str("           ??? NOISE.\n");
        }
        let lines = numbered(&src, 1);
        let opts = ParseOptions {
            diagnostic_threshold: 2,
        };
        let outcome = parse_segment(&lines, &opts);
        assert_eq!(outcome.diagnostics.len(), 3);
        assert!(outcome.degraded);
    }

    #[test]
    fn parse_is_deterministic() {
        let lines = numbered(
            "       PROCEDURE DIVISION.\n       A.\n           PERFORM B.\n       B.\n           GOBACK.\n",
            1,
        );
        let a = parse_segment(&lines, &ParseOptions::default());
        let b = parse_segment(&lines, &ParseOptions::default());
        assert_eq!(a, b);
        assert!(a.ast.structurally_eq(&b.ast));
    }
}
