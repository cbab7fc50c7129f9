//! COPY expansion, REPLACING, REPLACE tables, and origin tracking.

use std::path::{Path, PathBuf};

use coqu::preproc::{CopybookResolver, PreprocWarning, Preprocessor};
use coqu::source::format::normalize;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn copybook_root() -> PathBuf {
    fixture("copybooks")
}

fn expand_fixture(name: &str, roots: Vec<PathBuf>) -> coqu::preproc::ExpandedSource {
    let path = fixture(name);
    let text = std::fs::read_to_string(&path).unwrap();
    let resolver = CopybookResolver::new(roots);
    Preprocessor::new(&resolver).expand(&path, &normalize(&text))
}

#[test]
fn resolved_copybook_is_spliced_in() {
    let expanded = expand_fixture("copyuse.cbl", vec![copybook_root()]);
    assert!(expanded.warnings.is_empty());
    assert!(expanded.text().contains("WS-CUST-ID"));
    let directive = &expanded.copies[0];
    assert_eq!(directive.name, "CUSTREC");
    assert!(directive.resolved);
    assert!(directive.resolved_path.as_ref().unwrap().ends_with("CUSTREC.cpy"));
}

#[test]
fn replacing_partial_word_rewrites_tags() {
    let expanded = expand_fixture("copyuse.cbl", vec![copybook_root()]);
    assert!(expanded.text().contains("WS-ALT-ID"));
    assert!(expanded.text().contains("WS-ALT-NAME"));
    assert!(!expanded.text().contains(":TAG:"));
    let tagged = expanded.copies.iter().find(|c| c.name == "CUSTTAG").unwrap();
    assert!(tagged.replacing.as_ref().unwrap().contains("REPLACING"));
}

#[test]
fn unresolved_copybook_warns_and_continues() {
    let expanded = expand_fixture("copymiss.cbl", vec![copybook_root()]);
    assert_eq!(
        expanded.warnings,
        vec![PreprocWarning::UnresolvedCopy {
            name: "DATEUTIL".to_string(),
            line: 5,
        }]
    );
    let directive = &expanded.copies[0];
    assert!(!directive.resolved);
    // Placeholder comment keeps downstream line anchoring intact.
    assert!(expanded.text().contains("COPY DATEUTIL (unresolved)"));
}

#[test]
fn cyclic_copy_is_broken_with_a_warning() {
    let expanded = expand_fixture("cyclic.cbl", vec![copybook_root()]);
    assert_eq!(
        expanded.warnings,
        vec![PreprocWarning::CyclicCopy {
            name: "LOOPSELF".to_string(),
            line: 5,
        }]
    );
    // The first expansion went through; only the cycle edge was skipped.
    assert!(expanded.text().contains("WS-LOOP-AREA"));
}

#[test]
fn copybook_lines_anchor_to_the_directive() {
    let expanded = expand_fixture("copyuse.cbl", vec![copybook_root()]);
    let cust_line = expanded
        .lines
        .iter()
        .find(|l| l.text.contains("WS-CUST-ID"))
        .unwrap();
    assert_eq!(cust_line.anchor, 5);
    assert!(cust_line.file != 0);
    let (origin_file, origin_line) = expanded
        .origin(
            expanded
                .lines
                .iter()
                .position(|l| l.text.contains("WS-CUST-ID"))
                .unwrap(),
        )
        .unwrap();
    assert!(origin_file.ends_with("CUSTREC.cpy"));
    assert_eq!(origin_line, 2);
}

#[test]
fn expansion_is_deterministic() {
    let a = expand_fixture("copyuse.cbl", vec![copybook_root()]);
    let b = expand_fixture("copyuse.cbl", vec![copybook_root()]);
    assert_eq!(a.text(), b.text());
    assert_eq!(a, b);
}

#[test]
fn replace_directive_applies_until_off() {
    let text = "\
       REPLACE ==OLD-NAME== BY ==NEW-NAME==.
       MOVE OLD-NAME TO TARGET-A.
       REPLACE OFF.
       MOVE OLD-NAME TO TARGET-B.
";
    let resolver = CopybookResolver::new(vec![]);
    let expanded = Preprocessor::new(&resolver).expand(Path::new("inline.cbl"), &normalize(text));
    let lines: Vec<&str> = expanded.lines.iter().map(|l| l.text.as_str()).collect();
    assert!(lines[0].contains("NEW-NAME"));
    assert!(lines[1].contains("OLD-NAME"));
}

#[test]
fn exec_blocks_pass_through_verbatim() {
    let text = "\
       EXEC SQL
           SELECT 1 FROM SYSIBM.SYSDUMMY1
       END-EXEC.
       MOVE A TO B.
";
    let resolver = CopybookResolver::new(vec![]);
    let expanded = Preprocessor::new(&resolver).expand(Path::new("inline.cbl"), &normalize(text));
    assert_eq!(expanded.execs.len(), 1);
    let block = &expanded.execs[0];
    assert_eq!(block.span.start, 1);
    assert_eq!(block.span.end, 3);
    assert!(block.body.contains("SYSDUMMY1"));
    // The block's lines stay in the stream, flagged opaque.
    assert!(expanded.lines.iter().any(|l| l.in_exec && l.text.contains("SELECT")));
}
