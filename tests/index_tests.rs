//! Structural indexing over the fixtures: spans, containment, data items,
//! comments, and the awkward edge cases.

use std::path::{Path, PathBuf};

use coqu::config::EngineContext;
use coqu::index::{CommentClass, DivisionName, StructuralIndex};
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

fn index_of<'a>(ws: &'a Workspace, name: &str) -> &'a StructuralIndex {
    &ws.get(name).unwrap().index
}

#[test]
fn sample_divisions_and_paragraphs() {
    let (_t, ws, name) = load_fixture("sample.cbl");
    let ix = index_of(&ws, &name);

    let names: Vec<DivisionName> = ix.divisions.iter().map(|d| d.name).collect();
    assert_eq!(
        names,
        vec![
            DivisionName::Identification,
            DivisionName::Environment,
            DivisionName::Data,
            DivisionName::Procedure,
        ]
    );
    assert_eq!(ix.divisions[0].span.start, 1);

    let expected = [
        "0000-MAIN-PARA",
        "1000-INIT-PARA",
        "1100-READ-FIRST",
        "2000-PROCESS-PARA",
        "2100-VALIDATE",
        "2200-UPDATE",
        "3000-CLEANUP-PARA",
    ];
    let actual: Vec<&str> = ix.paragraphs.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(actual, expected);
}

#[test]
fn spans_nest_cleanly() {
    let (_t, ws, name) = load_fixture("sample.cbl");
    let ix = index_of(&ws, &name);

    for section in &ix.sections {
        let containers: Vec<_> = ix
            .divisions
            .iter()
            .filter(|d| d.span.encloses(&section.span))
            .collect();
        assert_eq!(containers.len(), 1, "section {} must sit in one division", section.name);
    }
    for para in &ix.paragraphs {
        let in_division = ix
            .divisions
            .iter()
            .filter(|d| d.span.encloses(&para.span))
            .count();
        assert_eq!(in_division, 1, "paragraph {} must sit in one division", para.name);
    }
    // Peer paragraphs never overlap.
    for pair in ix.paragraphs.windows(2) {
        assert!(pair[0].span.end < pair[1].span.start);
    }
    let program = ws.get(&name).unwrap();
    assert!(ix.line_count <= program.lines);
}

#[test]
fn data_items_capture_levels_pictures_and_parents() {
    let (_t, ws, name) = load_fixture("sample.cbl");
    let ix = index_of(&ws, &name);

    let eof_flag = ix.data_item("WS-EOF-FLAG").unwrap();
    assert_eq!(eof_flag.level, 5);
    assert_eq!(eof_flag.parent.as_deref(), Some("WS-FLAGS"));
    assert_eq!(eof_flag.picture.as_deref(), Some("X"));
    assert_eq!(eof_flag.section.as_deref(), Some("WORKING-STORAGE"));

    // Condition names bind to the nearest real item.
    let eof = ix.data_item("WS-EOF").unwrap();
    assert_eq!(eof.level, 88);
    assert_eq!(eof.parent.as_deref(), Some("WS-EOF-FLAG"));

    let count = ix.data_item("WS-READ-COUNT").unwrap();
    assert_eq!(count.picture.as_deref(), Some("9(7)"));

    let rec = ix.data_item("CUST-REC").unwrap();
    assert_eq!(rec.section.as_deref(), Some("FILE"));
}

#[test]
fn exec_blocks_are_indexed_not_parsed() {
    let (_t, ws, name) = load_fixture("sample.cbl");
    let ix = index_of(&ws, &name);
    assert_eq!(ix.execs.len(), 1);
    let sql = &ix.execs[0];
    assert_eq!(sql.span.start, 50);
    assert_eq!(sql.span.end, 54);
    assert!(sql.body.contains("UPDATE CUSTOMER"));
    // Nothing inside the block leaked into the paragraph list.
    assert!(ix.paragraphs.iter().all(|p| p.name != "CUSTOMER"));
}

#[test]
fn header_comment_attaches_forward() {
    let (_t, ws, name) = load_fixture("sample.cbl");
    let ix = index_of(&ws, &name);
    let comment = ix.comments.iter().find(|c| c.line == 3).unwrap();
    assert_eq!(comment.class, CommentClass::Header);
    assert_eq!(comment.attached_to.as_deref(), Some("ENVIRONMENT"));
    assert!(comment.text.contains("NIGHTLY"));
}

#[test]
fn no_procedure_division_means_no_paragraphs() {
    let (_t, ws, name) = load_fixture("noproc.cbl");
    let ix = index_of(&ws, &name);
    assert!(ix.paragraphs.is_empty());
    assert!(ix.procedure_span().is_none());
    assert!(ix.data_item("WS-ONLY-DATA").is_some());
}

#[test]
fn verb_named_paragraph_still_indexes() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("verbpara.cbl");
    std::fs::write(
        &src,
        "       IDENTIFICATION DIVISION.\n       PROGRAM-ID. VERBPARA.\n       PROCEDURE DIVISION.\n       MOVE.\n           DISPLAY 'HI'.\n",
    )
    .unwrap();
    let mut ws = Workspace::new(EngineContext::with_cache_dir(dir.path().join("cache")));
    let name = ws.load(&src, &LoadOptions::default()).unwrap();
    let ix = index_of(&ws, &name);
    assert!(ix.paragraph("MOVE").is_some());
}

#[test]
fn section_without_paragraphs_is_fine() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("sectonly.cbl");
    std::fs::write(
        &src,
        "       IDENTIFICATION DIVISION.\n       PROGRAM-ID. SECTONLY.\n       PROCEDURE DIVISION.\n       INIT SECTION.\n           DISPLAY 'NO PARAGRAPHS HERE'.\n",
    )
    .unwrap();
    let mut ws = Workspace::new(EngineContext::with_cache_dir(dir.path().join("cache")));
    let name = ws.load(&src, &LoadOptions::default()).unwrap();
    let ix = index_of(&ws, &name);
    assert!(ix.section("INIT").is_some());
    assert!(ix.paragraphs.is_empty());
}

#[test]
fn sequence_format_keeps_original_line_numbers() {
    let (_t, ws, name) = load_fixture("seqnum.cbl");
    let ix = index_of(&ws, &name);
    assert_eq!(ix.divisions[0].span.start, 1);
    let para = ix.paragraph("0000-BEGIN").unwrap();
    assert_eq!(para.span.start, 7);
    assert!(ix.paragraph("0100-WORK").is_some());
}

fn synthetic_source(paragraphs: usize) -> String {
    let mut text = String::from(
        "       IDENTIFICATION DIVISION.\n       PROGRAM-ID. BIG.\n       PROCEDURE DIVISION.\n",
    );
    for i in 0..paragraphs {
        text.push_str(&format!("       P{i:07}.\n"));
        text.push_str("      * FILLER COMMENT LINE.\n");
        text.push_str("      * ANOTHER COMMENT LINE.\n");
        text.push_str(&format!("           PERFORM P{:07}.\n", (i + 1) % paragraphs.max(1)));
    }
    text
}

#[test]
fn hundred_thousand_lines_index_quickly() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("big.cbl");
    std::fs::write(&src, synthetic_source(25_000)).unwrap();
    let mut ws = Workspace::new(EngineContext::with_cache_dir(dir.path().join("cache")));
    let started = std::time::Instant::now();
    let name = ws.load(&src, &LoadOptions::default()).unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    assert_eq!(index_of(&ws, &name).paragraphs.len(), 25_000);
}

// The full boundary target: two million lines, one minute. Run with
// `cargo test -- --ignored` on a machine you trust to have the memory.
#[test]
#[ignore]
fn two_million_lines_index_within_a_minute() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("huge.cbl");
    std::fs::write(&src, synthetic_source(500_000)).unwrap();
    let mut ws = Workspace::new(EngineContext::with_cache_dir(dir.path().join("cache")));
    let started = std::time::Instant::now();
    let name = ws.load(&src, &LoadOptions::default()).unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(60));
    assert_eq!(index_of(&ws, &name).paragraphs.len(), 500_000);
}

#[test]
fn copybook_items_attribute_to_the_copy_line() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::new(EngineContext::with_cache_dir(dir.path().join("cache")));
    ws.add_copypath(fixture("copybooks"));
    let name = ws.load(&fixture("copyuse.cbl"), &LoadOptions::default()).unwrap();
    let ix = index_of(&ws, &name);
    let cust = ix.data_item("WS-CUST-ID").unwrap();
    assert_eq!(cust.line, 5);
    let alt = ix.data_item("WS-ALT-ID").unwrap();
    assert_eq!(alt.line, 6);
    let program = ws.get(&name).unwrap();
    assert!(ix.line_count <= program.lines);
}
