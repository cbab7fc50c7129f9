//! Chunk analysis
//!
//! Extracts transfer-of-control and data-movement references from a slice of
//! procedure text: PERFORM (with THRU), CALL (literal vs identifier kept
//! apart), GO TO (including DEPENDING ON lists) and MOVE. Works on raw lines
//! with dedicated patterns, no parse required; when an AST covering the chunk
//! exists, [`analyze_ast`] yields the same edge shapes from statement nodes
//! and is preferred by callers. References come back in source order.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::parse::{AstNode, NodeKind};
use crate::preproc::is_comment_line;

static PERFORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bPERFORM\s+([A-Z0-9][A-Z0-9-]*)(\s+(?:THRU|THROUGH)\s+([A-Z0-9][A-Z0-9-]*))?")
        .unwrap()
});
static CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bCALL\s+(?:"([^"]+)"|'([^']+)'|([A-Z0-9][A-Z0-9-]*))"#).unwrap()
});
static GOTO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bGO\s+TO\s+([A-Z0-9][A-Z0-9-]*(?:\s+[A-Z0-9][A-Z0-9-]*)*)").unwrap()
});
static MOVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bMOVE\s+(.+?)\s+TO\s+(.+?)(?:\.|$)").unwrap());

/// Words that follow PERFORM without naming a paragraph.
const PERFORM_KEYWORDS: &[&str] = &["UNTIL", "VARYING", "TIMES", "WITH", "TEST", "FOREVER"];

const VERB_STOPPERS: &[&str] = &[
    "MOVE", "PERFORM", "CALL", "GO", "IF", "ELSE", "DISPLAY", "COMPUTE", "ADD", "SUBTRACT",
    "MULTIPLY", "DIVIDE", "SET", "READ", "WRITE", "OPEN", "CLOSE", "EVALUATE", "WHEN", "STOP",
    "EXIT", "GOBACK", "INITIALIZE", "INSPECT", "STRING", "UNSTRING", "ACCEPT",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    Perform,
    PerformThru,
    CallLiteral,
    CallIdentifier,
    Goto,
    MoveTo,
    MoveFrom,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Perform => "perform",
            ReferenceKind::PerformThru => "perform-thru",
            ReferenceKind::CallLiteral => "call-literal",
            ReferenceKind::CallIdentifier => "call-identifier",
            ReferenceKind::Goto => "goto",
            ReferenceKind::MoveTo => "move-to",
            ReferenceKind::MoveFrom => "move-from",
        }
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One directed reference out of the analyzed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub target: String,
    pub line: usize,
}

/// A MOVE with its operands kept together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveStatement {
    pub line: usize,
    pub from: String,
    pub to: Vec<String>,
}

/// Regex-driven extraction over `(line number, text)` pairs.
pub fn analyze_lines<'a>(lines: impl IntoIterator<Item = (usize, &'a str)>) -> Vec<Reference> {
    let mut out = Vec::new();
    for (number, text) in lines {
        if is_comment_line(text) {
            continue;
        }
        // Collected per line with match offsets so several statements on one
        // line keep their order.
        let mut found: Vec<(usize, Reference)> = Vec::new();

        for caps in PERFORM_RE.captures_iter(text) {
            let name = caps[1].to_ascii_uppercase();
            if PERFORM_KEYWORDS.contains(&name.as_str()) {
                continue;
            }
            let whole = caps.get(0).unwrap();
            // `PERFORM 5 TIMES` names a count, not a paragraph.
            if name.chars().all(|c| c.is_ascii_digit())
                && followed_by_times(text, whole.end())
            {
                continue;
            }
            if let Some(thru) = caps.get(3) {
                found.push((
                    whole.start(),
                    Reference {
                        kind: ReferenceKind::Perform,
                        target: name,
                        line: number,
                    },
                ));
                found.push((
                    whole.start() + 1,
                    Reference {
                        kind: ReferenceKind::PerformThru,
                        target: thru.as_str().to_ascii_uppercase(),
                        line: number,
                    },
                ));
            } else {
                found.push((
                    whole.start(),
                    Reference {
                        kind: ReferenceKind::Perform,
                        target: name,
                        line: number,
                    },
                ));
            }
        }

        for caps in CALL_RE.captures_iter(text) {
            let start = caps.get(0).unwrap().start();
            if let Some(lit) = caps.get(1).or(caps.get(2)) {
                found.push((
                    start,
                    Reference {
                        kind: ReferenceKind::CallLiteral,
                        target: lit.as_str().to_string(),
                        line: number,
                    },
                ));
            } else if let Some(ident) = caps.get(3) {
                found.push((
                    start,
                    Reference {
                        kind: ReferenceKind::CallIdentifier,
                        target: ident.as_str().to_ascii_uppercase(),
                        line: number,
                    },
                ));
            }
        }

        for caps in GOTO_RE.captures_iter(text) {
            let start = caps.get(0).unwrap().start();
            for (offset, word) in caps[1].split_whitespace().enumerate() {
                let upper = word.to_ascii_uppercase();
                if upper == "DEPENDING" {
                    break;
                }
                if VERB_STOPPERS.contains(&upper.as_str()) {
                    break;
                }
                found.push((
                    start + offset,
                    Reference {
                        kind: ReferenceKind::Goto,
                        target: upper,
                        line: number,
                    },
                ));
            }
        }

        for stmt in moves_in_line(number, text) {
            let start = text.to_ascii_uppercase().find("MOVE").unwrap_or(0);
            if is_identifier(&stmt.from) {
                found.push((
                    start,
                    Reference {
                        kind: ReferenceKind::MoveFrom,
                        target: stmt.from.clone(),
                        line: number,
                    },
                ));
            }
            for (offset, target) in stmt.to.iter().enumerate() {
                found.push((
                    start + 1 + offset,
                    Reference {
                        kind: ReferenceKind::MoveTo,
                        target: target.clone(),
                        line: number,
                    },
                ));
            }
        }

        found.sort_by_key(|(pos, _)| *pos);
        out.extend(found.into_iter().map(|(_, r)| r));
    }
    out
}

/// MOVE statements with both operand sides, for the `moves` listing.
pub fn moves_in<'a>(lines: impl IntoIterator<Item = (usize, &'a str)>) -> Vec<MoveStatement> {
    let mut out = Vec::new();
    for (number, text) in lines {
        if is_comment_line(text) {
            continue;
        }
        out.extend(moves_in_line(number, text));
    }
    out
}

fn moves_in_line(number: usize, text: &str) -> Vec<MoveStatement> {
    MOVE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let from = caps[1].split_whitespace().next()?.to_string();
            let from = strip_subscript(&from).to_ascii_uppercase();
            let mut to = Vec::new();
            for word in caps[2].split([' ', '\t', ',']) {
                if word.is_empty() {
                    continue;
                }
                let upper = strip_subscript(word).to_ascii_uppercase();
                if VERB_STOPPERS.contains(&upper.as_str()) {
                    break;
                }
                if !is_identifier(&upper) {
                    continue;
                }
                to.push(upper);
            }
            if to.is_empty() {
                return None;
            }
            Some(MoveStatement {
                line: number,
                from,
                to,
            })
        })
        .collect()
}

fn followed_by_times(text: &str, from: usize) -> bool {
    text[from..]
        .split_whitespace()
        .next()
        .is_some_and(|w| w.eq_ignore_ascii_case("TIMES"))
}

fn strip_subscript(word: &str) -> &str {
    let word = word.trim_end_matches('.');
    match word.find('(') {
        Some(p) => &word[..p],
        None => word,
    }
}

fn is_identifier(word: &str) -> bool {
    !word.is_empty()
        && word.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !word.chars().all(|c| c.is_ascii_digit())
}

/// Edge extraction from statement nodes, preferred once a parse exists.
pub fn analyze_ast(node: &AstNode) -> Vec<Reference> {
    let mut out = Vec::new();
    node.walk(&mut |n| {
        if let NodeKind::Statement { verb } = &n.kind {
            statement_edges(verb, n, &mut out);
        }
    });
    out
}

fn statement_edges(verb: &str, node: &AstNode, out: &mut Vec<Reference>) {
    let line = node.span.start_line;
    let words: Vec<(bool, String)> = node
        .children
        .iter()
        .filter_map(|c| match &c.kind {
            NodeKind::Identifier { name } => Some((true, name.clone())),
            NodeKind::Literal { value } => Some((false, value.clone())),
            _ => None,
        })
        .collect();

    match verb {
        "PERFORM" => {
            let Some((is_ident, name)) = words.first() else {
                return;
            };
            if !is_ident || PERFORM_KEYWORDS.contains(&name.as_str()) {
                return;
            }
            out.push(Reference {
                kind: ReferenceKind::Perform,
                target: name.clone(),
                line,
            });
            let thru = words
                .iter()
                .position(|(_, w)| w == "THRU" || w == "THROUGH")
                .and_then(|p| words.get(p + 1));
            if let Some((true, target)) = thru {
                out.push(Reference {
                    kind: ReferenceKind::PerformThru,
                    target: target.clone(),
                    line,
                });
            }
        }
        "CALL" => {
            if let Some((is_ident, name)) = words.first() {
                out.push(Reference {
                    kind: if *is_ident {
                        ReferenceKind::CallIdentifier
                    } else {
                        ReferenceKind::CallLiteral
                    },
                    target: name.clone(),
                    line,
                });
            }
        }
        "GO" => {
            for (is_ident, name) in words.iter().skip_while(|(_, w)| w == "TO") {
                if name == "DEPENDING" {
                    break;
                }
                if *is_ident {
                    out.push(Reference {
                        kind: ReferenceKind::Goto,
                        target: name.clone(),
                        line,
                    });
                }
            }
        }
        "MOVE" => {
            let Some(split) = words.iter().position(|(_, w)| w == "TO") else {
                return;
            };
            if let Some((true, from)) = words.first() {
                if from != "TO" {
                    out.push(Reference {
                        kind: ReferenceKind::MoveFrom,
                        target: from.clone(),
                        line,
                    });
                }
            }
            for (is_ident, name) in &words[split + 1..] {
                if *is_ident {
                    out.push(Reference {
                        kind: ReferenceKind::MoveTo,
                        target: name.clone(),
                        line,
                    });
                }
            }
        }
        _ => {}
    }
}
