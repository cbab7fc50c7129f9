//! Structural index
//!
//! The navigable skeleton of a program: divisions, sections, paragraphs, data
//! items, COPY directives, EXEC blocks and comments, each with 1-based line
//! positions in the pre-expansion source. Built by a handful of regex passes
//! (see [`builder`]) without a full parse, so it scales to multi-million-line
//! sources. Once built, an index is immutable.

pub mod builder;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use builder::build_index;

/// Inclusive 1-based line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

impl LineSpan {
    pub fn new(start: usize, end: usize) -> LineSpan {
        LineSpan { start, end }
    }

    pub fn contains(&self, line: usize) -> bool {
        self.start <= line && line <= self.end
    }

    pub fn encloses(&self, other: &LineSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DivisionName {
    Identification,
    Environment,
    Data,
    Procedure,
}

impl DivisionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            DivisionName::Identification => "IDENTIFICATION",
            DivisionName::Environment => "ENVIRONMENT",
            DivisionName::Data => "DATA",
            DivisionName::Procedure => "PROCEDURE",
        }
    }

    pub fn from_word(word: &str) -> Option<DivisionName> {
        match word.to_ascii_uppercase().as_str() {
            "IDENTIFICATION" | "ID" => Some(DivisionName::Identification),
            "ENVIRONMENT" => Some(DivisionName::Environment),
            "DATA" => Some(DivisionName::Data),
            "PROCEDURE" => Some(DivisionName::Procedure),
            _ => None,
        }
    }
}

impl std::fmt::Display for DivisionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Division {
    pub name: DivisionName,
    pub span: LineSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub division: DivisionName,
    pub span: LineSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub name: String,
    /// Absent for paragraphs sitting directly under the division.
    pub section: Option<String>,
    pub division: DivisionName,
    pub span: LineSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    pub level: u8,
    pub name: String,
    pub line: usize,
    /// PIC clause text, verbatim, when present.
    pub picture: Option<String>,
    /// Enclosing item by level nesting; condition names (88) bind to the
    /// nearest non-88/non-66 item.
    pub parent: Option<String>,
    /// DATA DIVISION section this item sits in (WORKING-STORAGE, FILE, ...).
    pub section: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyDirective {
    pub name: String,
    pub library: Option<String>,
    pub line: usize,
    /// REPLACING clause text, verbatim.
    pub replacing: Option<String>,
    pub resolved: bool,
    pub resolved_path: Option<PathBuf>,
    /// Copybook that contained the directive; `None` for the root source.
    pub copied_from: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecKind {
    Sql,
    Cics,
    Dli,
}

impl ExecKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecKind::Sql => "SQL",
            ExecKind::Cics => "CICS",
            ExecKind::Dli => "DLI",
        }
    }

    pub fn from_word(word: &str) -> Option<ExecKind> {
        match word.to_ascii_uppercase().as_str() {
            "SQL" => Some(ExecKind::Sql),
            "CICS" => Some(ExecKind::Cics),
            "DLI" => Some(ExecKind::Dli),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecBlock {
    pub kind: ExecKind,
    pub span: LineSpan,
    /// The block text, verbatim, EXEC through END-EXEC.
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentClass {
    /// Part of a comment run directly above a division/section/paragraph.
    Header,
    /// Inside a structural element's body.
    Inline,
    /// Attached to nothing.
    Orphan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub line: usize,
    pub column: usize,
    pub text: String,
    pub class: CommentClass,
    /// For header comments, the element the run introduces.
    pub attached_to: Option<String>,
}

/// Immutable structural snapshot of one program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StructuralIndex {
    pub divisions: Vec<Division>,
    pub sections: Vec<Section>,
    pub paragraphs: Vec<Paragraph>,
    pub data_items: Vec<DataItem>,
    pub copies: Vec<CopyDirective>,
    pub execs: Vec<ExecBlock>,
    pub comments: Vec<Comment>,
    /// Highest pre-expansion line covered by any entry.
    pub line_count: usize,
}

impl StructuralIndex {
    pub fn division(&self, name: &str) -> Option<&Division> {
        let wanted = DivisionName::from_word(name)?;
        self.divisions.iter().find(|d| d.name == wanted)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn paragraph(&self, name: &str) -> Option<&Paragraph> {
        self.paragraphs
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn data_item(&self, name: &str) -> Option<&DataItem> {
        self.data_items
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    pub fn procedure_span(&self) -> Option<LineSpan> {
        self.divisions
            .iter()
            .find(|d| d.name == DivisionName::Procedure)
            .map(|d| d.span)
    }

    /// Items in a given DATA DIVISION section (by section name prefix, so
    /// "WORKING-STORAGE" matches `WORKING-STORAGE SECTION`).
    pub fn data_items_in(&self, section: &str) -> impl Iterator<Item = &DataItem> {
        let wanted = section.to_ascii_uppercase();
        self.data_items.iter().filter(move |d| {
            d.section
                .as_deref()
                .is_some_and(|s| s.to_ascii_uppercase().starts_with(&wanted))
        })
    }

    /// Resolve a name to a span, trying paragraph, then section, then
    /// division. Used to scope searches and chunk analyses.
    pub fn span_of(&self, name: &str) -> Option<LineSpan> {
        if let Some(p) = self.paragraph(name) {
            return Some(p.span);
        }
        if let Some(s) = self.section(name) {
            return Some(s.span);
        }
        self.division(name).map(|d| d.span)
    }
}
