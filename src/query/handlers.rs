//! Query handlers
//!
//! One function per command. Every handler borrows the workspace read-only;
//! the single exception is `--exact`, which may force a full parse through
//! the workspace first and then proceeds on the immutable view.

use regex::Regex;

use crate::analyze::{self, Reference, ReferenceKind};
use crate::error::{EngineError, Result};
use crate::index::{CommentClass, ExecKind, LineSpan};
use crate::workspace::{Program, Workspace};

use super::{Command, QueryValue};

pub fn dispatch(ws: &mut Workspace, cmd: &Command) -> Result<QueryValue> {
    // `--exact` escalates to a full parse before the read-only pass.
    if cmd.has("exact") {
        let name = target(ws, cmd)?.name.clone();
        ws.ensure_ast(&name)?;
    }
    match cmd.name.as_str() {
        "divisions" => divisions(target(ws, cmd)?),
        "division" => division(target(ws, cmd)?, cmd),
        "sections" => sections(target(ws, cmd)?, cmd),
        "section" => section(target(ws, cmd)?, cmd),
        "paragraphs" => paragraphs(target(ws, cmd)?, cmd),
        "paragraph" => paragraph(target(ws, cmd)?, cmd),
        "working-storage" => data_items(target(ws, cmd)?, cmd, "WORKING-STORAGE"),
        "file-section" => data_items(target(ws, cmd)?, cmd, "FILE"),
        "linkage" => data_items(target(ws, cmd)?, cmd, "LINKAGE"),
        "variable" => variable(target(ws, cmd)?, cmd),
        "copybooks" => copybooks(target(ws, cmd)?),
        "copybook" => copybook(ws, cmd),
        "copybook-deps" => copybook_deps(target(ws, cmd)?, cmd),
        "calls" => calls(target(ws, cmd)?, cmd),
        "performs" => performs(target(ws, cmd)?, cmd),
        "moves" => moves(target(ws, cmd)?, cmd),
        "sql" => execs(target(ws, cmd)?, cmd, ExecKind::Sql),
        "cics" => execs(target(ws, cmd)?, cmd, ExecKind::Cics),
        "comments" => comments(target(ws, cmd)?, cmd),
        "find" => find(target(ws, cmd)?, cmd),
        "references" => references(target(ws, cmd)?, cmd),
        "where-used" => where_used(ws, cmd),
        other => Err(EngineError::Usage(format!("unknown query: {other}"))),
    }
}

/// The program a query runs against: `--program <name>` or the most recently
/// loaded one.
fn target<'a>(ws: &'a Workspace, cmd: &Command) -> Result<&'a Program> {
    match cmd.value("program") {
        Some(name) => ws
            .get(name)
            .ok_or_else(|| EngineError::Query(format!("no program named {name}"))),
        None => ws
            .current()
            .ok_or_else(|| EngineError::Query("no program loaded".to_string())),
    }
}

fn divisions(p: &Program) -> Result<QueryValue> {
    let rows = p
        .index
        .divisions
        .iter()
        .map(|d| {
            vec![
                d.name.to_string(),
                d.span.start.to_string(),
                d.span.end.to_string(),
                d.span.len().to_string(),
            ]
        })
        .collect();
    Ok(QueryValue::table(vec!["DIVISION", "START", "END", "LINES"], rows))
}

fn division(p: &Program, cmd: &Command) -> Result<QueryValue> {
    let name = cmd.require_arg(0, "a division name")?;
    let Some(div) = p.index.division(name) else {
        return Ok(QueryValue::Empty(format!("no division named {name}")));
    };
    if cmd.has("body") {
        return Ok(QueryValue::Lines(p.original_span(div.span)));
    }
    Ok(QueryValue::table(
        vec!["DIVISION", "START", "END", "LINES"],
        vec![vec![
            div.name.to_string(),
            div.span.start.to_string(),
            div.span.end.to_string(),
            div.span.len().to_string(),
        ]],
    ))
}

fn sections(p: &Program, cmd: &Command) -> Result<QueryValue> {
    let division = cmd.value("division");
    let rows = p
        .index
        .sections
        .iter()
        .filter(|s| {
            division.is_none_or(|d| s.division.as_str().eq_ignore_ascii_case(d))
        })
        .map(|s| {
            vec![
                s.name.clone(),
                s.division.to_string(),
                s.span.start.to_string(),
                s.span.end.to_string(),
            ]
        })
        .collect();
    Ok(QueryValue::table(
        vec!["SECTION", "DIVISION", "START", "END"],
        rows,
    ))
}

fn section(p: &Program, cmd: &Command) -> Result<QueryValue> {
    let name = cmd.require_arg(0, "a section name")?;
    let Some(sec) = p.index.section(name) else {
        return Ok(QueryValue::Empty(format!("no section named {name}")));
    };
    if cmd.has("body") {
        return Ok(QueryValue::Lines(p.original_span(sec.span)));
    }
    Ok(QueryValue::table(
        vec!["SECTION", "DIVISION", "START", "END"],
        vec![vec![
            sec.name.clone(),
            sec.division.to_string(),
            sec.span.start.to_string(),
            sec.span.end.to_string(),
        ]],
    ))
}

fn paragraphs(p: &Program, cmd: &Command) -> Result<QueryValue> {
    let section = cmd.value("section");
    let rows = p
        .index
        .paragraphs
        .iter()
        .filter(|para| {
            section.is_none_or(|s| {
                para.section
                    .as_deref()
                    .is_some_and(|ps| ps.eq_ignore_ascii_case(s))
            })
        })
        .map(|para| {
            vec![
                para.name.clone(),
                para.section.clone().unwrap_or_default(),
                para.span.start.to_string(),
                para.span.end.to_string(),
            ]
        })
        .collect();
    Ok(QueryValue::table(
        vec!["PARAGRAPH", "SECTION", "START", "END"],
        rows,
    ))
}

fn paragraph(p: &Program, cmd: &Command) -> Result<QueryValue> {
    let name = cmd.require_arg(0, "a paragraph name")?;
    let Some(para) = p.index.paragraph(name) else {
        return Ok(QueryValue::Empty(format!("no paragraph named {name}")));
    };

    if cmd.has("body") {
        return Ok(QueryValue::Lines(p.original_span(para.span)));
    }
    if cmd.has("analyze") {
        return Ok(refs_table(chunk_refs(p, para.span, cmd.has("exact"), name)));
    }
    if cmd.has("calls") {
        let refs: Vec<Reference> = chunk_refs(p, para.span, cmd.has("exact"), name)
            .into_iter()
            .filter(|r| {
                matches!(
                    r.kind,
                    ReferenceKind::Perform
                        | ReferenceKind::PerformThru
                        | ReferenceKind::Goto
                        | ReferenceKind::CallLiteral
                        | ReferenceKind::CallIdentifier
                )
            })
            .collect();
        return Ok(refs_table(refs));
    }
    if cmd.has("called-by") {
        let mut rows = Vec::new();
        for other in &p.index.paragraphs {
            for r in chunk_refs(p, other.span, false, &other.name) {
                let inbound = matches!(
                    r.kind,
                    ReferenceKind::Perform | ReferenceKind::PerformThru | ReferenceKind::Goto
                );
                if inbound && r.target.eq_ignore_ascii_case(&para.name) {
                    rows.push(vec![
                        other.name.clone(),
                        r.line.to_string(),
                        r.kind.to_string(),
                    ]);
                }
            }
        }
        return Ok(QueryValue::table(vec!["PARAGRAPH", "LINE", "KIND"], rows));
    }

    Ok(QueryValue::table(
        vec!["PARAGRAPH", "SECTION", "START", "END", "LINES"],
        vec![vec![
            para.name.clone(),
            para.section.clone().unwrap_or_default(),
            para.span.start.to_string(),
            para.span.end.to_string(),
            para.span.len().to_string(),
        ]],
    ))
}

fn data_items(p: &Program, cmd: &Command, section: &str) -> Result<QueryValue> {
    let level = match cmd.value("level") {
        Some(v) => Some(v.parse::<u8>().map_err(|_| {
            EngineError::Usage(format!("--level expects a number, got {v}"))
        })?),
        None => None,
    };
    let rows = p
        .index
        .data_items_in(section)
        .filter(|d| level.is_none_or(|l| d.level == l))
        .map(data_item_row)
        .collect();
    Ok(QueryValue::table(
        vec!["LEVEL", "NAME", "PICTURE", "LINE", "PARENT"],
        rows,
    ))
}

fn data_item_row(d: &crate::index::DataItem) -> Vec<String> {
    vec![
        format!("{:02}", d.level),
        d.name.clone(),
        d.picture.clone().unwrap_or_default(),
        d.line.to_string(),
        d.parent.clone().unwrap_or_default(),
    ]
}

fn variable(p: &Program, cmd: &Command) -> Result<QueryValue> {
    let name = cmd.require_arg(0, "a data item name")?;
    let Some(item) = p.index.data_item(name) else {
        return Ok(QueryValue::Empty(format!("no data item named {name}")));
    };
    if cmd.has("body") {
        return Ok(QueryValue::Lines(
            p.original_span(LineSpan::new(item.line, item.line)),
        ));
    }
    if cmd.has("references") || cmd.has("writes") || cmd.has("reads") {
        return references_for(p, &item.name, cmd);
    }
    Ok(QueryValue::table(
        vec!["LEVEL", "NAME", "PICTURE", "LINE", "PARENT", "SECTION"],
        vec![vec![
            format!("{:02}", item.level),
            item.name.clone(),
            item.picture.clone().unwrap_or_default(),
            item.line.to_string(),
            item.parent.clone().unwrap_or_default(),
            item.section.clone().unwrap_or_default(),
        ]],
    ))
}

fn copybooks(p: &Program) -> Result<QueryValue> {
    let rows = p
        .index
        .copies
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.line.to_string(),
                if c.resolved { "Resolved" } else { "Unresolved" }.to_string(),
                c.resolved_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                c.copied_from.clone().unwrap_or_default(),
            ]
        })
        .collect();
    Ok(QueryValue::table(
        vec!["COPYBOOK", "LINE", "STATUS", "PATH", "VIA"],
        rows,
    ))
}

fn copybook(ws: &Workspace, cmd: &Command) -> Result<QueryValue> {
    let name = cmd.require_arg(0, "a copybook name")?;
    if cmd.has("contents") {
        return match ws.copybook_text(name) {
            Some((_, text)) => Ok(QueryValue::Lines(
                text.lines()
                    .enumerate()
                    .map(|(i, l)| (i + 1, l.to_string()))
                    .collect(),
            )),
            None => Ok(QueryValue::Empty(format!(
                "copybook {name} not found on search path"
            ))),
        };
    }
    if cmd.has("used-by") {
        return where_used(ws, cmd);
    }
    let p = target(ws, cmd)?;
    let rows: Vec<Vec<String>> = p
        .index
        .copies
        .iter()
        .filter(|c| c.name.eq_ignore_ascii_case(name))
        .map(|c| {
            vec![
                c.name.clone(),
                c.line.to_string(),
                if c.resolved { "Resolved" } else { "Unresolved" }.to_string(),
                c.replacing.clone().unwrap_or_default(),
            ]
        })
        .collect();
    if rows.is_empty() {
        return Ok(QueryValue::Empty(format!("no COPY of {name} in {}", p.name)));
    }
    Ok(QueryValue::table(
        vec!["COPYBOOK", "LINE", "STATUS", "REPLACING"],
        rows,
    ))
}

fn copybook_deps(p: &Program, cmd: &Command) -> Result<QueryValue> {
    let edges: Vec<(String, String, usize)> = p
        .index
        .copies
        .iter()
        .map(|c| {
            (
                c.copied_from.clone().unwrap_or_else(|| p.name.clone()),
                c.name.clone(),
                c.line,
            )
        })
        .collect();
    if cmd.value("format").is_some_and(|f| f.eq_ignore_ascii_case("dot")) {
        let mut dot = String::from("digraph copybooks {\n");
        for (from, to, _) in &edges {
            dot.push_str(&format!("    \"{from}\" -> \"{to}\";\n"));
        }
        dot.push('}');
        return Ok(QueryValue::Text(dot));
    }
    let rows = edges
        .into_iter()
        .map(|(from, to, line)| vec![from, to, line.to_string()])
        .collect();
    Ok(QueryValue::table(vec!["FROM", "TO", "LINE"], rows))
}

fn calls(p: &Program, cmd: &Command) -> Result<QueryValue> {
    let program_filter = cmd.value("program");
    let refs: Vec<Reference> = procedure_refs(p)
        .into_iter()
        .filter(|r| {
            matches!(
                r.kind,
                ReferenceKind::CallLiteral | ReferenceKind::CallIdentifier
            )
        })
        .filter(|r| !cmd.has("external") || r.kind == ReferenceKind::CallLiteral)
        .filter(|r| program_filter.is_none_or(|p| r.target.eq_ignore_ascii_case(p)))
        .collect();
    Ok(refs_table(refs))
}

fn performs(p: &Program, cmd: &Command) -> Result<QueryValue> {
    let refs = match cmd.value("paragraph") {
        Some(name) => match p.index.paragraph(name) {
            Some(para) => chunk_refs(p, para.span, false, name),
            None => return Ok(QueryValue::Empty(format!("no paragraph named {name}"))),
        },
        None => procedure_refs(p),
    };
    let refs: Vec<Reference> = refs
        .into_iter()
        .filter(|r| {
            if cmd.has("thru") {
                r.kind == ReferenceKind::PerformThru
            } else {
                matches!(r.kind, ReferenceKind::Perform | ReferenceKind::PerformThru)
            }
        })
        .collect();
    Ok(refs_table(refs))
}

fn moves(p: &Program, cmd: &Command) -> Result<QueryValue> {
    let to_filter = cmd.value("to");
    let from_filter = cmd.value("from");
    let lines = p.procedure_lines();
    let rows = analyze::moves_in(lines.iter().map(|(n, t)| (*n, t.as_str())))
        .into_iter()
        .filter(|m| to_filter.is_none_or(|f| m.to.iter().any(|t| t.eq_ignore_ascii_case(f))))
        .filter(|m| from_filter.is_none_or(|f| m.from.eq_ignore_ascii_case(f)))
        .map(|m| vec![m.line.to_string(), m.from, m.to.join(" ")])
        .collect();
    Ok(QueryValue::table(vec!["LINE", "FROM", "TO"], rows))
}

fn execs(p: &Program, cmd: &Command, kind: ExecKind) -> Result<QueryValue> {
    let blocks: Vec<&crate::index::ExecBlock> =
        p.index.execs.iter().filter(|e| e.kind == kind).collect();
    if cmd.has("body") {
        let mut lines = Vec::new();
        for block in &blocks {
            for (offset, text) in block.body.lines().enumerate() {
                lines.push((block.span.start + offset, text.to_string()));
            }
        }
        return Ok(QueryValue::Lines(lines));
    }
    let rows = blocks
        .iter()
        .map(|e| {
            vec![
                e.kind.to_string(),
                e.span.start.to_string(),
                e.span.end.to_string(),
            ]
        })
        .collect();
    Ok(QueryValue::table(vec!["KIND", "START", "END"], rows))
}

fn comments(p: &Program, cmd: &Command) -> Result<QueryValue> {
    let for_element = cmd.value("for");
    let rows = p
        .index
        .comments
        .iter()
        .filter(|c| !cmd.has("orphan") || c.class == CommentClass::Orphan)
        .filter(|c| !cmd.has("header") || c.class == CommentClass::Header)
        .filter(|c| {
            for_element.is_none_or(|e| {
                c.attached_to
                    .as_deref()
                    .is_some_and(|a| a.eq_ignore_ascii_case(e))
            })
        })
        .map(|c| {
            vec![
                c.line.to_string(),
                match c.class {
                    CommentClass::Header => "header",
                    CommentClass::Inline => "inline",
                    CommentClass::Orphan => "orphan",
                }
                .to_string(),
                c.text.clone(),
            ]
        })
        .collect();
    Ok(QueryValue::table(vec!["LINE", "CLASS", "TEXT"], rows))
}

fn find(p: &Program, cmd: &Command) -> Result<QueryValue> {
    let pattern = cmd.require_arg(0, "a regular expression")?;
    let re = Regex::new(pattern)?;
    let span = match cmd.value("in") {
        Some(scope) => match p.index.span_of(scope) {
            Some(sp) => Some(sp),
            None => {
                return Ok(QueryValue::Empty(format!("no element named {scope}")));
            }
        },
        None => None,
    };
    let hits = p
        .normalized_lines()
        .filter(|(n, _)| span.is_none_or(|sp| sp.contains(*n)))
        .filter(|(_, t)| re.is_match(t))
        .map(|(n, t)| (n, t.to_string()))
        .collect();
    Ok(QueryValue::Lines(hits))
}

fn references(p: &Program, cmd: &Command) -> Result<QueryValue> {
    let name = cmd.require_arg(0, "an identifier")?.to_string();
    references_for(p, &name, cmd)
}

/// Word-boundary mentions of a name, classified read/write from MOVE edges.
fn references_for(p: &Program, name: &str, cmd: &Command) -> Result<QueryValue> {
    let re = word_pattern(name)?;
    let proc_lines = p.procedure_lines();
    let stmts = analyze::moves_in(proc_lines.iter().map(|(n, t)| (*n, t.as_str())));
    let writes: Vec<usize> = stmts
        .iter()
        .filter(|m| m.to.iter().any(|t| t.eq_ignore_ascii_case(name)))
        .map(|m| m.line)
        .collect();
    let reads: Vec<usize> = stmts
        .iter()
        .filter(|m| m.from.eq_ignore_ascii_case(name))
        .map(|m| m.line)
        .collect();
    let definition = p.index.data_item(name).map(|d| d.line);

    let rows: Vec<Vec<String>> = p
        .normalized_lines()
        .filter(|(_, t)| re.is_match(t))
        .filter_map(|(n, t)| {
            let is_write = writes.contains(&n);
            let is_read = reads.contains(&n);
            if cmd.has("writes") && !is_write {
                return None;
            }
            if cmd.has("reads") && !is_read {
                return None;
            }
            let kind = if is_write && is_read {
                "read-write"
            } else if is_write {
                "write"
            } else if is_read {
                "read"
            } else if definition == Some(n) {
                "definition"
            } else {
                "reference"
            };
            Some(vec![n.to_string(), kind.to_string(), t.trim().to_string()])
        })
        .collect();
    if rows.is_empty() {
        return Ok(QueryValue::Empty(format!("no references to {name}")));
    }
    Ok(QueryValue::table(vec!["LINE", "KIND", "TEXT"], rows))
}

fn where_used(ws: &Workspace, cmd: &Command) -> Result<QueryValue> {
    let name = cmd.require_arg(0, "a copybook name")?;
    let mut rows = Vec::new();
    for p in ws.programs() {
        for c in p.index.copies.iter().filter(|c| c.name.eq_ignore_ascii_case(name)) {
            rows.push(vec![
                p.name.clone(),
                c.line.to_string(),
                if c.resolved { "Resolved" } else { "Unresolved" }.to_string(),
            ]);
        }
    }
    if rows.is_empty() {
        return Ok(QueryValue::Empty(format!("copybook {name} is not used")));
    }
    Ok(QueryValue::table(vec!["PROGRAM", "LINE", "STATUS"], rows))
}

// ---- shared helpers ----------------------------------------------------

/// References in a span; AST edges when `--exact` produced a parse, the
/// chunk analyzer otherwise.
fn chunk_refs(p: &Program, span: LineSpan, exact: bool, name: &str) -> Vec<Reference> {
    if exact {
        if let Some(outcome) = &p.ast {
            if let Some(node) = outcome.ast.find_paragraph(name) {
                return analyze::analyze_ast(node);
            }
        }
    }
    let lines = p.normalized_span(span);
    analyze::analyze_lines(lines.iter().map(|(n, t)| (*n, t.as_str())))
}

fn procedure_refs(p: &Program) -> Vec<Reference> {
    let lines = p.procedure_lines();
    analyze::analyze_lines(lines.iter().map(|(n, t)| (*n, t.as_str())))
}

fn refs_table(refs: Vec<Reference>) -> QueryValue {
    let rows = refs
        .into_iter()
        .map(|r| vec![r.line.to_string(), r.kind.to_string(), r.target])
        .collect();
    QueryValue::table(vec!["LINE", "KIND", "TARGET"], rows)
}

/// `\b` treats `-` as a boundary, which splits COBOL names; match with
/// explicit word-character guards instead.
fn word_pattern(name: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(
        r"(?i)(^|[^A-Z0-9-]){}([^A-Z0-9-]|$)",
        regex::escape(name)
    ))?)
}
