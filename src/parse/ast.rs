//! AST node model
//!
//! A tree of tagged variants, each carrying a source span and kind-specific
//! payload. Queries pattern-match on [`NodeKind`]; there is no visitor
//! machinery. Two ASTs are *structurally* equal when kinds and children
//! match, spans aside.

use serde::{Deserialize, Serialize};

/// Line/column source range, 1-based, end-inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Span {
    pub fn point(line: usize, column: usize) -> Span {
        Span {
            start_line: line,
            start_column: column,
            end_line: line,
            end_column: column,
        }
    }

    pub fn extend_to(&mut self, line: usize, column: usize) {
        if (line, column) > (self.end_line, self.end_column) {
            self.end_line = line;
            self.end_column = column;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NodeKind {
    Program,
    Division { name: String },
    Section { name: String },
    Paragraph { name: String },
    Sentence,
    Statement { verb: String },
    Identifier { name: String },
    Literal { value: String },
    Exec { language: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstNode {
    #[serde(flatten)]
    pub kind: NodeKind,
    pub span: Span,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AstNode>,
}

impl AstNode {
    pub fn new(kind: NodeKind, span: Span) -> AstNode {
        AstNode {
            kind,
            span,
            children: Vec::new(),
        }
    }

    /// Kind-and-children equality; spans do not participate.
    pub fn structurally_eq(&self, other: &AstNode) -> bool {
        self.kind == other.kind
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.structurally_eq(b))
    }

    /// Preorder walk.
    pub fn walk(&self, f: &mut impl FnMut(&AstNode)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    pub fn find_paragraph(&self, name: &str) -> Option<&AstNode> {
        if let NodeKind::Paragraph { name: n_name } = &self.kind {
            if n_name.eq_ignore_ascii_case(name) {
                return Some(self);
            }
        }
        self.children.iter().find_map(|c| c.find_paragraph(name))
    }
}
