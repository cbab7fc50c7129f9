//! The command surface end to end: listings, bodies, semantic queries,
//! search, and the universal modifiers.

use std::path::{Path, PathBuf};

use coqu::config::EngineContext;
use coqu::error::EngineError;
use coqu::query::{self, Command, QueryOutput, QueryValue};
use coqu::workspace::{LoadOptions, Workspace};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn sample_workspace() -> (tempfile::TempDir, Workspace) {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::new(EngineContext::with_cache_dir(dir.path().join("cache")));
    ws.load(&fixture("sample.cbl"), &LoadOptions::default()).unwrap();
    (dir, ws)
}

fn run(ws: &mut Workspace, parts: &[&str]) -> QueryOutput {
    let tokens: Vec<String> = parts.iter().map(|s| s.to_string()).collect();
    let cmd = Command::from_tokens(&tokens).unwrap();
    query::execute(ws, &cmd).unwrap()
}

fn rows(output: &QueryOutput) -> &Vec<Vec<String>> {
    match &output.value {
        QueryValue::Table { rows, .. } => rows,
        other => panic!("expected a table, got {other:?}"),
    }
}

fn lines(output: &QueryOutput) -> &Vec<(usize, String)> {
    match &output.value {
        QueryValue::Lines(lines) => lines,
        other => panic!("expected lines, got {other:?}"),
    }
}

#[test]
fn divisions_lists_all_four() {
    let (_t, mut ws) = sample_workspace();
    let out = run(&mut ws, &["divisions"]);
    let rows = rows(&out);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0][0], "IDENTIFICATION");
    assert_eq!(rows[0][1], "1");
}

#[test]
fn paragraph_analyze_matches_seed_scenario() {
    let (_t, mut ws) = sample_workspace();
    let out = run(&mut ws, &["paragraph", "2100-VALIDATE", "--analyze"]);
    let rows = rows(&out);
    let calls: Vec<_> = rows.iter().filter(|r| r[1] == "call-literal").collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][2], "AUDITLOG");
    assert!(rows.iter().all(|r| r[1] != "perform"));
}

#[test]
fn calls_external_on_caller() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::new(EngineContext::with_cache_dir(dir.path().join("cache")));
    ws.load(&fixture("caller.cbl"), &LoadOptions::default()).unwrap();
    let out = run(&mut ws, &["calls", "--external"]);
    let rows = rows(&out);
    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0][2].as_str(), rows[0][0].as_str()), ("SAMPLE", "8"));
    assert_eq!((rows[1][2].as_str(), rows[1][0].as_str()), ("UTILITY", "9"));
}

#[test]
fn find_returns_hits_in_source_order() {
    let (_t, mut ws) = sample_workspace();
    let out = run(&mut ws, &["find", r"MOVE\s+SPACES\s+TO"]);
    let hits = lines(&out);
    assert_eq!(hits.len(), 3);
    let numbers: Vec<usize> = hits.iter().map(|(n, _)| *n).collect();
    assert_eq!(numbers, vec![30, 44, 57]);
    assert!(hits.iter().all(|(_, t)| t.contains("MOVE SPACES TO")));
}

#[test]
fn find_scoped_to_an_element() {
    let (_t, mut ws) = sample_workspace();
    let out = run(
        &mut ws,
        &["find", r"MOVE\s+SPACES\s+TO", "--in", "2100-VALIDATE"],
    );
    assert_eq!(lines(&out).len(), 1);
}

#[test]
fn count_modifier_collapses_to_a_number() {
    let (_t, mut ws) = sample_workspace();
    let out = run(&mut ws, &["find", r"MOVE\s+SPACES\s+TO", "--count"]);
    assert_eq!(out.value, QueryValue::Count(3));
}

#[test]
fn body_reads_original_source() {
    let (_t, mut ws) = sample_workspace();
    let out = run(&mut ws, &["paragraph", "2100-VALIDATE", "--body"]);
    let body = lines(&out);
    assert_eq!(body.first().unwrap().0, 43);
    assert!(body.iter().any(|(_, t)| t.contains("CALL 'AUDITLOG'")));
}

#[test]
fn working_storage_level_filter() {
    let (_t, mut ws) = sample_workspace();
    let out = run(&mut ws, &["working-storage", "--level", "88"]);
    let rows = rows(&out);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], "WS-EOF");
}

#[test]
fn file_section_and_linkage_split() {
    let (_t, mut ws) = sample_workspace();
    let out = run(&mut ws, &["file-section"]);
    assert!(rows(&out).iter().any(|r| r[1] == "CUST-REC"));
    let out = run(&mut ws, &["linkage"]);
    assert!(matches!(&out.value, QueryValue::Table { rows, .. } if rows.is_empty()));
}

#[test]
fn references_classify_reads_and_writes() {
    let (_t, mut ws) = sample_workspace();
    let out = run(&mut ws, &["references", "WS-EOF-FLAG", "--writes"]);
    let row_data = rows(&out);
    assert_eq!(row_data.len(), 2);
    assert!(row_data.iter().all(|r| r[1] == "write" || r[1] == "read-write"));

    let out = run(&mut ws, &["references", "WS-WORK-AREA"]);
    let all = rows(&out);
    assert!(all.iter().any(|r| r[1] == "definition"));
    assert!(all.iter().any(|r| r[1] == "write"));
}

#[test]
fn variable_lookup_and_miss() {
    let (_t, mut ws) = sample_workspace();
    let out = run(&mut ws, &["variable", "WS-READ-COUNT"]);
    let rows = rows(&out);
    assert_eq!(rows[0][2], "9(7)");

    let out = run(&mut ws, &["variable", "NO-SUCH-ITEM"]);
    assert!(matches!(out.value, QueryValue::Empty(_)));
}

#[test]
fn sql_listing_and_body() {
    let (_t, mut ws) = sample_workspace();
    let out = run(&mut ws, &["sql"]);
    assert_eq!(rows(&out).len(), 1);
    let out = run(&mut ws, &["sql", "--body"]);
    assert!(lines(&out).iter().any(|(_, t)| t.contains("UPDATE CUSTOMER")));
    let out = run(&mut ws, &["cics"]);
    assert!(matches!(&out.value, QueryValue::Table { rows, .. } if rows.is_empty()));
}

#[test]
fn moves_filters_by_target() {
    let (_t, mut ws) = sample_workspace();
    let out = run(&mut ws, &["moves", "--to", "WS-WORK-AREA"]);
    let rows = rows(&out);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r[1] == "SPACES"));
}

#[test]
fn performs_lists_edges_and_called_by_inverts_them() {
    let (_t, mut ws) = sample_workspace();
    let out = run(&mut ws, &["performs"]);
    assert_eq!(rows(&out).len(), 6);

    let out = run(&mut ws, &["paragraph", "2100-VALIDATE", "--called-by"]);
    let rows = rows(&out);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], "2000-PROCESS-PARA");
}

#[test]
fn comments_header_filter() {
    let (_t, mut ws) = sample_workspace();
    let out = run(&mut ws, &["comments", "--header"]);
    let row_data = rows(&out);
    assert_eq!(row_data.len(), 1);
    assert!(row_data[0][2].contains("NIGHTLY"));
    let out = run(&mut ws, &["comments", "--for", "ENVIRONMENT"]);
    assert_eq!(rows(&out).len(), 1);
}

#[test]
fn copybook_queries_and_where_used() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::new(EngineContext::with_cache_dir(dir.path().join("cache")));
    ws.add_copypath(fixture("copybooks"));
    ws.load(&fixture("copyuse.cbl"), &LoadOptions::default()).unwrap();

    let out = run(&mut ws, &["copybooks"]);
    let row_data = rows(&out);
    assert_eq!(row_data.len(), 2);
    assert!(row_data.iter().all(|r| r[2] == "Resolved"));

    let out = run(&mut ws, &["where-used", "CUSTREC"]);
    assert_eq!(rows(&out)[0][0], "COPYUSE");

    let out = run(&mut ws, &["copybook", "CUSTREC", "--contents"]);
    assert!(lines(&out).iter().any(|(_, t)| t.contains("WS-CUST-ID")));

    let out = run(&mut ws, &["copybook-deps", "--format", "dot"]);
    match &out.value {
        QueryValue::Text(dot) => {
            assert!(dot.starts_with("digraph"));
            assert!(dot.contains("\"COPYUSE\" -> \"CUSTREC\""));
            assert!(dot.contains("\"COPYUSE\" -> \"CUSTTAG\""));
        }
        other => panic!("expected dot text, got {other:?}"),
    }
}

#[test]
fn unresolved_copybook_surfaces_in_status() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::new(EngineContext::with_cache_dir(dir.path().join("cache")));
    let name = ws.load(&fixture("copymiss.cbl"), &LoadOptions::default()).unwrap();
    assert_eq!(ws.get(&name).unwrap().warnings.len(), 1);

    let out = run(&mut ws, &["copybooks"]);
    let rows = rows(&out);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], "DATEUTIL");
    assert_eq!(rows[0][1], "5");
    assert_eq!(rows[0][2], "Unresolved");
}

#[test]
fn no_procedure_division_yields_an_empty_listing() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::new(EngineContext::with_cache_dir(dir.path().join("cache")));
    ws.load(&fixture("noproc.cbl"), &LoadOptions::default()).unwrap();
    let out = run(&mut ws, &["paragraphs"]);
    assert!(matches!(&out.value, QueryValue::Table { rows, .. } if rows.is_empty()));
}

#[test]
fn program_flag_selects_a_loaded_program() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::new(EngineContext::with_cache_dir(dir.path().join("cache")));
    ws.load(&fixture("sample.cbl"), &LoadOptions::default()).unwrap();
    ws.load(&fixture("caller.cbl"), &LoadOptions::default()).unwrap();
    // Default target is the most recent load.
    let out = run(&mut ws, &["paragraphs"]);
    assert_eq!(rows(&out).len(), 1);
    let out = run(&mut ws, &["paragraphs", "--program", "SAMPLE"]);
    assert_eq!(rows(&out).len(), 7);
}

#[test]
fn exact_modifier_uses_the_parser() {
    let (_t, mut ws) = sample_workspace();
    let out = run(&mut ws, &["paragraph", "2100-VALIDATE", "--analyze", "--exact"]);
    let rows = rows(&out);
    assert!(rows.iter().any(|r| r[1] == "call-literal" && r[2] == "AUDITLOG"));
    // The parse stuck around for later queries.
    assert!(ws.current().unwrap().ast.is_some());
}

#[test]
fn unknown_query_is_a_usage_error() {
    let (_t, mut ws) = sample_workspace();
    let cmd = Command::from_tokens(&["frobnicate".to_string()]).unwrap();
    let err = query::execute(&mut ws, &cmd).unwrap_err();
    assert!(matches!(err, EngineError::Usage(_)));
}

#[test]
fn queries_without_a_loaded_program_fail_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::new(EngineContext::with_cache_dir(dir.path().join("cache")));
    let cmd = Command::from_tokens(&["divisions".to_string()]).unwrap();
    let err = query::execute(&mut ws, &cmd).unwrap_err();
    assert!(matches!(err, EngineError::Query(_)));
}

#[test]
fn bad_find_pattern_reports_the_regex_error() {
    let (_t, mut ws) = sample_workspace();
    let cmd = Command::from_tokens(&["find".to_string(), "(".to_string()]).unwrap();
    let err = query::execute(&mut ws, &cmd).unwrap_err();
    assert!(matches!(err, EngineError::Pattern(_)));
}
