//! Chunk analysis over loaded fixtures, plus the AST-backed variant.

use std::path::{Path, PathBuf};

use coqu::analyze::{analyze_ast, analyze_lines, ReferenceKind};
use coqu::config::EngineContext;
use coqu::workspace::{LoadOptions, Workspace};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn load_fixture(name: &str) -> (tempfile::TempDir, Workspace, String) {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::new(EngineContext::with_cache_dir(dir.path().join("cache")));
    let prog = ws.load(&fixture(name), &LoadOptions::default()).unwrap();
    (dir, ws, prog)
}

#[test]
fn validate_paragraph_has_one_call_and_no_performs() {
    let (_t, ws, name) = load_fixture("sample.cbl");
    let p = ws.get(&name).unwrap();
    let span = p.index.paragraph("2100-VALIDATE").unwrap().span;
    let lines = p.normalized_span(span);
    let refs = analyze_lines(lines.iter().map(|(n, t)| (*n, t.as_str())));

    let calls: Vec<_> = refs
        .iter()
        .filter(|r| r.kind == ReferenceKind::CallLiteral)
        .collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].target, "AUDITLOG");
    assert_eq!(calls[0].line, 48);
    assert!(refs
        .iter()
        .all(|r| !matches!(r.kind, ReferenceKind::Perform | ReferenceKind::PerformThru)));
}

#[test]
fn caller_external_calls_with_line_numbers() {
    let (_t, ws, name) = load_fixture("caller.cbl");
    let p = ws.get(&name).unwrap();
    let lines = p.procedure_lines();
    let refs = analyze_lines(lines.iter().map(|(n, t)| (*n, t.as_str())));

    let calls: Vec<_> = refs
        .iter()
        .filter(|r| r.kind == ReferenceKind::CallLiteral)
        .collect();
    assert_eq!(calls.len(), 2);
    assert_eq!((calls[0].target.as_str(), calls[0].line), ("SAMPLE", 8));
    assert_eq!((calls[1].target.as_str(), calls[1].line), ("UTILITY", 9));
    let proc_span = p.index.procedure_span().unwrap();
    assert!(calls.iter().all(|c| proc_span.contains(c.line)));
}

#[test]
fn perform_edges_count_and_order() {
    let (_t, ws, name) = load_fixture("sample.cbl");
    let p = ws.get(&name).unwrap();
    let lines = p.procedure_lines();
    let refs = analyze_lines(lines.iter().map(|(n, t)| (*n, t.as_str())));

    let performs: Vec<_> = refs
        .iter()
        .filter(|r| r.kind == ReferenceKind::Perform)
        .collect();
    assert_eq!(performs.len(), 6);
    let targets: Vec<&str> = performs.iter().map(|r| r.target.as_str()).collect();
    assert_eq!(
        targets,
        vec![
            "1000-INIT-PARA",
            "2000-PROCESS-PARA",
            "3000-CLEANUP-PARA",
            "1100-READ-FIRST",
            "2100-VALIDATE",
            "2200-UPDATE",
        ]
    );
    // Source order means strictly ascending lines here.
    let lines_seen: Vec<usize> = performs.iter().map(|r| r.line).collect();
    let mut sorted = lines_seen.clone();
    sorted.sort_unstable();
    assert_eq!(lines_seen, sorted);
}

#[test]
fn ast_edges_match_regex_edges_for_a_paragraph() {
    let (_t, mut ws, name) = load_fixture("sample.cbl");
    assert!(ws.ensure_ast(&name).unwrap());
    let p = ws.get(&name).unwrap();
    let outcome = p.ast.as_ref().unwrap();
    assert!(!outcome.degraded);

    let node = outcome.ast.find_paragraph("2100-VALIDATE").unwrap();
    let ast_refs = analyze_ast(node);
    let call = ast_refs
        .iter()
        .find(|r| r.kind == ReferenceKind::CallLiteral)
        .unwrap();
    assert_eq!(call.target, "AUDITLOG");
    assert!(ast_refs
        .iter()
        .all(|r| !matches!(r.kind, ReferenceKind::Perform | ReferenceKind::PerformThru)));
}

#[test]
fn analysis_is_fast_enough_for_interactive_use() {
    let (_t, ws, name) = load_fixture("sample.cbl");
    let p = ws.get(&name).unwrap();
    let span = p.index.paragraph("2000-PROCESS-PARA").unwrap().span;
    let lines = p.normalized_span(span);

    let started = std::time::Instant::now();
    for _ in 0..100 {
        let refs = analyze_lines(lines.iter().map(|(n, t)| (*n, t.as_str())));
        assert!(!refs.is_empty());
    }
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
}
