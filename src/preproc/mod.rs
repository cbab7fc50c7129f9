//! COPY/REPLACE preprocessing
//!
//! Expands COPY directives against the workspace copybook roots, applies
//! REPLACING/REPLACE substitutions, and passes EXEC SQL/CICS/DLI blocks
//! through verbatim. Every output line carries its origin (file and line) and
//! an *anchor*: the pre-expansion root-source line it is attributed to, which
//! is the line of the COPY directive for copybook bodies. All reporting runs
//! on anchors so line numbers always belong to the user's file.
//!
//! An unresolved copybook is never fatal: the directive is replaced with a
//! placeholder comment line and recorded. A cyclic COPY skips the cycle edge
//! the same way. Output is a pure function of the source text, the copybook
//! file contents, and the search paths at expansion time.

pub mod replacing;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::index::{CopyDirective, ExecBlock, ExecKind, LineSpan};
use crate::source::format::{normalize, NormalizedLine, NormalizedSource};
use crate::source::SourceFile;
use replacing::{apply_rules, parse_pairs, ReplaceRule};

static COPY_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|\s)COPY\s+[A-Z0-9]").unwrap());
static COPY_STMT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bCOPY\s+([A-Z0-9][A-Z0-9-]*)(?:\s+(?:OF|IN)\s+([A-Z0-9][A-Z0-9-]*))?(\s+REPLACING\s+.*?)?\s*\.",
    )
    .unwrap()
});
static EXEC_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bEXEC\s+(SQL|CICS|DLI)\b").unwrap());
static EXEC_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bEND-EXEC").unwrap());
static REPLACE_STMT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*REPLACE\s+(.*)$").unwrap());

/// Copybook lookup over the workspace search roots. Extension order is fixed;
/// the first hit wins.
#[derive(Debug, Clone, Default)]
pub struct CopybookResolver {
    roots: Vec<PathBuf>,
}

const COPY_EXTENSIONS: [&str; 4] = ["cpy", "copy", "CPY", "COPY"];

impl CopybookResolver {
    pub fn new(roots: Vec<PathBuf>) -> CopybookResolver {
        CopybookResolver { roots }
    }

    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        for root in &self.roots {
            for ext in COPY_EXTENSIONS {
                let candidate = root.join(format!("{name}.{ext}"));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
            let bare = root.join(name);
            if bare.is_file() {
                return Some(bare);
            }
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreprocWarning {
    UnresolvedCopy { name: String, line: usize },
    CyclicCopy { name: String, line: usize },
}

impl std::fmt::Display for PreprocWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreprocWarning::UnresolvedCopy { name, line } => {
                write!(f, "line {line}: copybook {name} not found on search path")
            }
            PreprocWarning::CyclicCopy { name, line } => {
                write!(f, "line {line}: cyclic COPY of {name} skipped")
            }
        }
    }
}

/// One post-expansion line with its origin and root-source attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedLine {
    pub text: String,
    /// Index into [`ExpandedSource::files`]; 0 is the root source.
    pub file: u16,
    /// Line number within the origin file.
    pub line: usize,
    /// Root-source line this text is attributed to.
    pub anchor: usize,
    /// Inside an EXEC ... END-EXEC block (opaque to the indexer).
    pub in_exec: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExpandedSource {
    pub files: Vec<PathBuf>,
    pub lines: Vec<ExpandedLine>,
    pub copies: Vec<CopyDirective>,
    pub execs: Vec<ExecBlock>,
    pub warnings: Vec<PreprocWarning>,
}

impl ExpandedSource {
    /// Origin of the 0-based post-expansion line: (file, line within file).
    pub fn origin(&self, index: usize) -> Option<(&Path, usize)> {
        let l = self.lines.get(index)?;
        Some((self.files[l.file as usize].as_path(), l.line))
    }

    /// Rejoined expanded text; used for determinism checks.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }

    /// `(anchor, text)` pairs, the indexer's working view.
    pub fn anchored_lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines.iter().map(|l| (l.anchor, l.text.as_str()))
    }
}

pub fn is_comment_line(text: &str) -> bool {
    matches!(text.trim_start().chars().next(), Some('*') | Some('/'))
}

pub struct Preprocessor<'a> {
    resolver: &'a CopybookResolver,
}

struct ExpandState {
    files: Vec<PathBuf>,
    lines: Vec<ExpandedLine>,
    copies: Vec<CopyDirective>,
    execs: Vec<ExecBlock>,
    warnings: Vec<PreprocWarning>,
    /// REPLACE table; program-wide until REPLACE OFF.
    replace_rules: Vec<ReplaceRule>,
    /// Names currently being expanded, for cycle breaking.
    active: Vec<String>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(resolver: &'a CopybookResolver) -> Preprocessor<'a> {
        Preprocessor { resolver }
    }

    pub fn expand(&self, root: &Path, source: &NormalizedSource) -> ExpandedSource {
        let mut state = ExpandState {
            files: vec![root.to_path_buf()],
            lines: Vec::with_capacity(source.lines.len()),
            copies: Vec::new(),
            execs: Vec::new(),
            warnings: Vec::new(),
            replace_rules: Vec::new(),
            active: Vec::new(),
        };
        self.expand_lines(&mut state, 0, &source.lines, None, None, &[]);
        ExpandedSource {
            files: state.files,
            lines: state.lines,
            copies: state.copies,
            execs: state.execs,
            warnings: state.warnings,
        }
    }

    /// Walk one file's lines. `anchor` pins all output to a root line when
    /// expanding a copybook; `container` is that copybook's name.
    fn expand_lines(
        &self,
        state: &mut ExpandState,
        file_id: u16,
        lines: &[NormalizedLine],
        anchor: Option<usize>,
        container: Option<&str>,
        copy_rules: &[ReplaceRule],
    ) {
        let mut i = 0;
        while i < lines.len() {
            let line = &lines[i];
            let at = anchor.unwrap_or(line.number);

            if is_comment_line(&line.text) {
                emit(state, file_id, line, at, false);
                i += 1;
                continue;
            }

            if let Some(caps) = EXEC_START.captures(&line.text) {
                let kind = ExecKind::from_word(&caps[1]).unwrap_or(ExecKind::Sql);
                let mut j = i;
                while j < lines.len() && !EXEC_END.is_match(&lines[j].text) {
                    j += 1;
                }
                let j = j.min(lines.len() - 1);
                let body = lines[i..=j]
                    .iter()
                    .map(|l| l.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                let span = LineSpan::new(at, anchor.unwrap_or(lines[j].number));
                for l in &lines[i..=j] {
                    emit(state, file_id, l, anchor.unwrap_or(l.number), true);
                }
                state.execs.push(ExecBlock { kind, span, body });
                i = j + 1;
                continue;
            }

            if REPLACE_STMT.is_match(&line.text) {
                let (stmt, consumed) = gather_statement(lines, i);
                let clause = REPLACE_STMT
                    .captures(&stmt)
                    .map(|c| c[1].to_string())
                    .unwrap_or_default();
                if clause.trim().trim_end_matches('.').eq_ignore_ascii_case("OFF") {
                    state.replace_rules.clear();
                } else {
                    state.replace_rules = parse_pairs(&clause)
                        .iter()
                        .filter_map(|(from, to)| ReplaceRule::compile(from, to))
                        .collect();
                }
                i += consumed;
                continue;
            }

            if COPY_START.is_match(&line.text) {
                let (stmt, consumed) = gather_statement(lines, i);
                if let Some(caps) = COPY_STMT.captures(&stmt) {
                    let name = caps[1].to_ascii_uppercase();
                    let library = caps.get(2).map(|m| m.as_str().to_ascii_uppercase());
                    let replacing_text = caps.get(3).map(|m| m.as_str().trim().to_string());
                    self.expand_copy(
                        state,
                        &name,
                        library,
                        replacing_text,
                        at,
                        container,
                        file_id,
                        line,
                    );
                    i += consumed;
                    continue;
                }
                // Looked like COPY but never terminated; fall through as text.
            }

            let text = apply_rules(&state.replace_rules, &apply_rules(copy_rules, &line.text));
            state.lines.push(ExpandedLine {
                text,
                file: file_id,
                line: line.number,
                anchor: at,
                in_exec: false,
            });
            i += 1;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_copy(
        &self,
        state: &mut ExpandState,
        name: &str,
        library: Option<String>,
        replacing_text: Option<String>,
        at: usize,
        container: Option<&str>,
        file_id: u16,
        line: &NormalizedLine,
    ) {
        let mut directive = CopyDirective {
            name: name.to_string(),
            library,
            line: at,
            replacing: replacing_text.clone(),
            resolved: false,
            resolved_path: None,
            copied_from: container.map(str::to_string),
        };

        if state.active.iter().any(|a| a == name) {
            warn!(copybook = name, line = at, "cyclic COPY skipped");
            state.warnings.push(PreprocWarning::CyclicCopy {
                name: name.to_string(),
                line: at,
            });
            emit_placeholder(state, file_id, line, at, name, "cyclic");
            state.copies.push(directive);
            return;
        }

        let Some(path) = self.resolver.resolve(name) else {
            warn!(copybook = name, line = at, "copybook not found");
            state.warnings.push(PreprocWarning::UnresolvedCopy {
                name: name.to_string(),
                line: at,
            });
            emit_placeholder(state, file_id, line, at, name, "unresolved");
            state.copies.push(directive);
            return;
        };

        let book = match SourceFile::read(&path) {
            Ok(b) => b,
            Err(_) => {
                state.warnings.push(PreprocWarning::UnresolvedCopy {
                    name: name.to_string(),
                    line: at,
                });
                emit_placeholder(state, file_id, line, at, name, "unreadable");
                state.copies.push(directive);
                return;
            }
        };

        directive.resolved = true;
        directive.resolved_path = Some(path.clone());
        state.copies.push(directive);

        let rules: Vec<ReplaceRule> = replacing_text
            .as_deref()
            .and_then(|t| {
                t.to_ascii_uppercase()
                    .find("REPLACING")
                    .map(|pos| t[pos + "REPLACING".len()..].to_string())
            })
            .map(|clause| {
                parse_pairs(clause.trim_end_matches('.'))
                    .iter()
                    .filter_map(|(from, to)| ReplaceRule::compile(from, to))
                    .collect()
            })
            .unwrap_or_default();

        let normalized = normalize(&book.text);
        let new_id = state.files.len() as u16;
        state.files.push(path);
        state.active.push(name.to_string());
        self.expand_lines(state, new_id, &normalized.lines, Some(at), Some(name), &rules);
        state.active.pop();
    }
}

fn emit(state: &mut ExpandState, file_id: u16, line: &NormalizedLine, anchor: usize, in_exec: bool) {
    state.lines.push(ExpandedLine {
        text: line.text.clone(),
        file: file_id,
        line: line.number,
        anchor,
        in_exec,
    });
}

fn emit_placeholder(
    state: &mut ExpandState,
    file_id: u16,
    line: &NormalizedLine,
    anchor: usize,
    name: &str,
    why: &str,
) {
    state.lines.push(ExpandedLine {
        text: format!("*> COPY {name} ({why})"),
        file: file_id,
        line: line.number,
        anchor,
        in_exec: false,
    });
}

/// Join lines from `start` until the statement-terminating period; returns
/// the joined text and how many lines were consumed.
fn gather_statement(lines: &[NormalizedLine], start: usize) -> (String, usize) {
    let mut text = String::new();
    let mut consumed = 0;
    for line in &lines[start..] {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(line.text.trim());
        consumed += 1;
        if line.text.trim_end().ends_with('.') {
            break;
        }
    }
    (text, consumed)
}
