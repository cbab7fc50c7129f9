//! Index construction
//!
//! One linear pass over the expanded stream. Each structural header closes
//! its predecessor's span at the previous line; the last open entries close
//! at the highest attributed line. Lines matching no pattern contribute no
//! structure but stay available for search. The pass never fails: malformed
//! input yields a sparser index, not an error.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::preproc::{is_comment_line, ExpandedSource};

use super::{
    Comment, CommentClass, DataItem, Division, DivisionName, LineSpan, Paragraph, Section,
    StructuralIndex,
};

static DIVISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(IDENTIFICATION|ID|ENVIRONMENT|DATA|PROCEDURE)\s+DIVISION(?:\s+USING\s+[^.]*)?\s*\.")
        .unwrap()
});
static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([A-Z0-9][A-Z0-9-]*)\s+SECTION\s*(?:USING\s+[^.]*)?\s*\.").unwrap()
});
static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*([A-Z0-9][A-Z0-9-]*)\s*\.\s*$").unwrap());
static DATA_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(\d{1,2})\s+([A-Z0-9][A-Z0-9-]*)(.*)$").unwrap());
static PIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bPIC(?:TURE)?(?:\s+IS)?\s+([A-Z0-9()$*,+./-]+)").unwrap()
});

/// Scope terminators that would otherwise look like paragraph headers.
const NOT_PARAGRAPHS: &[&str] = &[
    "END-IF",
    "END-PERFORM",
    "END-EVALUATE",
    "END-READ",
    "END-WRITE",
    "END-REWRITE",
    "END-RETURN",
    "END-SEARCH",
    "END-STRING",
    "END-UNSTRING",
    "END-CALL",
    "END-COMPUTE",
    "END-ADD",
    "END-SUBTRACT",
    "END-MULTIPLY",
    "END-DIVIDE",
    "END-DELETE",
    "END-START",
    "END-ACCEPT",
    "END-DISPLAY",
    "END-EXEC",
];

#[derive(Debug, Clone)]
enum LineKind {
    Blank,
    Comment,
    Header(String),
    Code,
}

pub fn build_index(expanded: &ExpandedSource) -> StructuralIndex {
    let mut ix = StructuralIndex::default();

    let mut open_division: Option<usize> = None;
    let mut open_section: Option<usize> = None;
    let mut open_paragraph: Option<usize> = None;
    let mut current_division: Option<DivisionName> = None;
    let mut current_section: Option<String> = None;

    // Data item nesting by level number.
    let mut level_stack: Vec<(u8, String)> = Vec::new();
    let mut last_elementary: Option<String> = None;
    let mut last_01: Option<String> = None;

    let mut max_line = 0usize;
    // Root-source line kinds, for comment classification afterwards.
    let mut root_kinds: Vec<(usize, LineKind)> = Vec::new();
    let mut candidates: Vec<(usize, usize, String)> = Vec::new();

    for l in &expanded.lines {
        max_line = max_line.max(l.anchor);
        let root = l.file == 0;
        let text = l.text.as_str();

        if l.in_exec {
            if root {
                root_kinds.push((l.line, LineKind::Code));
            }
            continue;
        }
        if text.trim().is_empty() {
            if root {
                root_kinds.push((l.line, LineKind::Blank));
            }
            continue;
        }
        if is_comment_line(text) {
            if root {
                root_kinds.push((l.line, LineKind::Comment));
                let column = text
                    .chars()
                    .position(|c| c == '*' || c == '/')
                    .map(|p| p + 1)
                    .unwrap_or(1);
                candidates.push((l.line, column, text.trim().to_string()));
            }
            continue;
        }

        if let Some(caps) = DIVISION_RE.captures(text) {
            if let Some(name) = DivisionName::from_word(&caps[1]) {
                close(&mut ix.paragraphs, &mut open_paragraph, l.anchor, |p| &mut p.span);
                close(&mut ix.sections, &mut open_section, l.anchor, |s| &mut s.span);
                close(&mut ix.divisions, &mut open_division, l.anchor, |d| &mut d.span);
                ix.divisions.push(Division {
                    name,
                    span: LineSpan::new(l.anchor, l.anchor),
                });
                open_division = Some(ix.divisions.len() - 1);
                current_division = Some(name);
                current_section = None;
                level_stack.clear();
                if root {
                    root_kinds.push((l.line, LineKind::Header(name.as_str().to_string())));
                }
                continue;
            }
        }

        if let Some(caps) = SECTION_RE.captures(text) {
            if let Some(division) = current_division {
                let name = caps[1].to_ascii_uppercase();
                close(&mut ix.paragraphs, &mut open_paragraph, l.anchor, |p| &mut p.span);
                close(&mut ix.sections, &mut open_section, l.anchor, |s| &mut s.span);
                ix.sections.push(Section {
                    name: name.clone(),
                    division,
                    span: LineSpan::new(l.anchor, l.anchor),
                });
                open_section = Some(ix.sections.len() - 1);
                current_section = Some(name.clone());
                level_stack.clear();
                if root {
                    root_kinds.push((l.line, LineKind::Header(name)));
                }
                continue;
            }
        }

        if current_division == Some(DivisionName::Data) {
            if let Some(caps) = DATA_ITEM_RE.captures(text) {
                if let Ok(level) = caps[1].parse::<u8>() {
                    if matches!(level, 1..=49 | 66 | 77 | 88) {
                        let name = caps[2].to_ascii_uppercase();
                        let tail = &caps[3];
                        let picture = PIC_RE
                            .captures(tail)
                            .map(|p| p[1].trim_end_matches('.').to_string());
                        let parent = match level {
                            88 => last_elementary.clone(),
                            66 => last_01.clone(),
                            77 => {
                                level_stack.clear();
                                None
                            }
                            _ => {
                                while level_stack
                                    .last()
                                    .is_some_and(|(top, _)| *top >= level)
                                {
                                    level_stack.pop();
                                }
                                level_stack.last().map(|(_, n)| n.clone())
                            }
                        };
                        if level != 88 && level != 66 {
                            level_stack.push((level, name.clone()));
                            last_elementary = Some(name.clone());
                            if level == 1 || level == 77 {
                                last_01 = Some(name.clone());
                            }
                        }
                        ix.data_items.push(DataItem {
                            level,
                            name,
                            line: l.anchor,
                            picture,
                            parent,
                            section: current_section.clone(),
                        });
                        if root {
                            root_kinds.push((l.line, LineKind::Code));
                        }
                        continue;
                    }
                }
            }
        }

        if current_division == Some(DivisionName::Procedure) {
            if let Some(caps) = PARAGRAPH_RE.captures(text) {
                let name = caps[1].to_ascii_uppercase();
                // Headers live in area A (columns 8-11); a one-word sentence
                // like `GOBACK.` sits in area B and is not a paragraph.
                let indent = text.chars().take_while(|c| c.is_whitespace()).count();
                if indent <= 10 && !NOT_PARAGRAPHS.contains(&name.as_str()) {
                    close(&mut ix.paragraphs, &mut open_paragraph, l.anchor, |p| &mut p.span);
                    ix.paragraphs.push(Paragraph {
                        name: name.clone(),
                        section: current_section.clone(),
                        division: DivisionName::Procedure,
                        span: LineSpan::new(l.anchor, l.anchor),
                    });
                    open_paragraph = Some(ix.paragraphs.len() - 1);
                    if root {
                        root_kinds.push((l.line, LineKind::Header(name)));
                    }
                    continue;
                }
            }
        }

        if root {
            root_kinds.push((l.line, LineKind::Code));
        }
    }

    // EOF closes everything still open.
    close(&mut ix.paragraphs, &mut open_paragraph, max_line + 1, |p| &mut p.span);
    close(&mut ix.sections, &mut open_section, max_line + 1, |s| &mut s.span);
    close(&mut ix.divisions, &mut open_division, max_line + 1, |d| &mut d.span);

    ix.copies = expanded.copies.clone();
    ix.execs = expanded.execs.clone();
    ix.line_count = max_line;
    ix.comments = classify_comments(&ix, &root_kinds, candidates);
    ix
}

/// Terminate the open entry's span at `next_start - 1`, never before its own
/// first line.
fn close<T>(
    items: &mut [T],
    open: &mut Option<usize>,
    next_start: usize,
    span_of: impl Fn(&mut T) -> &mut LineSpan,
) {
    if let Some(i) = open.take() {
        let span = span_of(&mut items[i]);
        span.end = next_start.saturating_sub(1).max(span.start);
    }
}

/// Header comments introduce the next structural element; a comment run is
/// broken by code or by a gap in root line numbering (a consumed directive).
fn classify_comments(
    ix: &StructuralIndex,
    root_kinds: &[(usize, LineKind)],
    candidates: Vec<(usize, usize, String)>,
) -> Vec<Comment> {
    let mut attach: HashMap<usize, Option<String>> = HashMap::new();
    let mut carry: Option<String> = None;
    let mut prev_line = 0usize;
    for (line, kind) in root_kinds.iter().rev() {
        if prev_line != 0 && prev_line != line + 1 {
            carry = None;
        }
        match kind {
            LineKind::Header(name) => carry = Some(name.clone()),
            LineKind::Blank => {}
            LineKind::Comment => {
                attach.insert(*line, carry.clone());
            }
            LineKind::Code => carry = None,
        }
        prev_line = *line;
    }

    let paragraph_spans: Vec<LineSpan> = ix.paragraphs.iter().map(|p| p.span).collect();
    let section_spans: Vec<LineSpan> = ix.sections.iter().map(|s| s.span).collect();

    candidates
        .into_iter()
        .map(|(line, column, text)| {
            let attached = attach.get(&line).cloned().flatten();
            let class = if attached.is_some() {
                CommentClass::Header
            } else if inside_body(&paragraph_spans, line) || inside_body(&section_spans, line) {
                CommentClass::Inline
            } else {
                CommentClass::Orphan
            };
            Comment {
                line,
                column,
                text,
                class,
                attached_to: attached,
            }
        })
        .collect()
}

/// Strictly after a span's header line but within the span.
fn inside_body(spans: &[LineSpan], line: usize) -> bool {
    // Spans are ordered by start line.
    let idx = spans.partition_point(|s| s.start < line);
    idx > 0 && spans[idx - 1].start < line && line <= spans[idx - 1].end
}
