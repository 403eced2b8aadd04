//! Integration tests for the declaration parser.
//!
//! These exercise the public parsing API against the build fixtures and
//! against whitespace and comment variations of the same declarations.

use std::fs::File;
use std::path::PathBuf;

use ksd::syntax::{self, DeclarationKind, Location};

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

// =============================================================================
// Fixtures
// =============================================================================

#[test]
fn test_parse_fixture_files() {
    let src = testdata_path().join("build/src");
    let cases = [
        ("ping.kql", "Ping", "function", "()"),
        ("functions/daily_totals.kql", "DailyTotals", "function", "(region:string)"),
        ("tables/events.kql", "Events", "table", "(Timestamp:datetime, Name:string, Payload:dynamic)"),
        ("tables/regions.kusto", "Regions", "table", "(Name:string, Code:int)"),
    ];

    for (file, name, kind, signature) in cases {
        let reader = File::open(src.join(file)).expect("fixture should exist");
        let parsed = syntax::parse(reader).expect("fixture should parse");
        let decl = &parsed.declaration;
        assert_eq!(decl.name(), name, "name in {}", file);
        assert_eq!(decl.kind().as_str(), kind, "kind in {}", file);
        assert_eq!(decl.signature(), signature, "signature in {}", file);
    }
}

#[test]
fn test_function_body_is_verbatim() {
    let reader = File::open(testdata_path().join("build/src/functions/daily_totals.kql")).unwrap();
    let parsed = syntax::parse(reader).unwrap();
    assert_eq!(
        parsed.declaration.body(),
        "(region:string) {\n    Sales\n    | where Region == region\n    | summarize Total = sum(Amount) by bin(Timestamp, 1d)\n}\n"
    );
    assert_eq!(
        parsed.declaration.doc(),
        "Daily sales totals for a region. Amounts are in USD."
    );
}

// =============================================================================
// Whitespace and comments
// =============================================================================

#[test]
fn test_whitespace_between_tokens_is_insignificant() {
    let functions = [
        "let f=(a:int){a}",
        "let f = (a:int) {a}",
        "let\tf\t=\t(a:int){a}",
        "let\n  f\n  =\n  (a:int){a}",
        "   let f   =(a:int){a}",
    ];
    for input in functions {
        let parsed = syntax::parse_str(input).unwrap();
        assert_eq!(parsed.declaration.name(), "f", "input {:?}", input);
        assert!(parsed.declaration.is_function());
        assert_eq!(parsed.declaration.signature(), "(a:int)", "input {:?}", input);
    }

    let tables = [
        "let t=datatable(a:int)[]",
        "let t = datatable (a:int) [ ]",
        "let t\n=\ndatatable\n(a:int)\n[\n]",
        "let  t  =  datatable\t(a:int)\t[]",
    ];
    for input in tables {
        let parsed = syntax::parse_str(input).unwrap();
        assert_eq!(parsed.declaration.name(), "t", "input {:?}", input);
        assert!(parsed.declaration.is_table());
        assert_eq!(parsed.declaration.signature(), "(a:int)", "input {:?}", input);
        assert_eq!(parsed.declaration.body(), "");
        assert!(parsed.warnings.is_empty(), "input {:?}", input);
    }
}

#[test]
fn test_doc_is_the_comment_run_above_let() {
    let cases = [
        ("let x=(a){b}", ""),
        ("// one\nlet x=(a){b}", "one"),
        ("// one\n// two\nlet x=(a){b}", "one two"),
        ("// old\n\n// new\nlet x=(a){b}", "new"),
        ("// old\nprint 1\n// new\nlet x=(a){b}", "new"),
        ("// say \"hi\"\nlet x=(a){b}", "say \\\"hi\\\""),
    ];

    for (input, doc) in cases {
        let parsed = syntax::parse_str(input).unwrap();
        assert_eq!(parsed.declaration.doc(), doc, "input {:?}", input);
    }
}

#[test]
fn test_table_rows_produce_a_warning() {
    let parsed = syntax::parse_str("let t = datatable(a:int) [1, 2, 3]").unwrap();
    assert!(matches!(
        parsed.declaration.kind(),
        DeclarationKind::Table { .. }
    ));
    assert_eq!(parsed.warnings.len(), 1);
    assert_eq!(parsed.warnings[0].ignored, "1, 2, 3");
    assert_eq!(parsed.warnings[0].location, Location { row: 1, col: 27 });
}

// =============================================================================
// Faults
// =============================================================================

#[test]
fn test_faults_name_the_problem() {
    let cases = [
        ("", "[1,1] missing 'let' statement in file"),
        ("// only a comment", "[1,18] missing 'let' statement in file"),
        ("let x$=(a){b}", "[1,6] unexpected character '$'"),
        ("let x=(", "[1,8] unmatched parenthesis, missing ')' in function signature"),
        (
            "let x=datatable(a)[",
            "[1,20] unmatched brackets, missing ']' for end of table body",
        ),
        (
            "let x=datatable(a",
            "[1,18] unmatched parenthesis, missing ')' in declaration signature",
        ),
    ];

    for (input, message) in cases {
        let err = syntax::parse_str(input).unwrap_err();
        assert_eq!(err.to_string(), message, "input {:?}", input);
    }
}

#[test]
fn test_fault_location_is_exposed() {
    // Only the first declaration is parsed; the rest is function body.
    let parsed = syntax::parse_str("let x = (a) {}\nlet y$ = (b) {}").unwrap();
    assert_eq!(parsed.declaration.name(), "x");

    let err = syntax::parse_str("\n\nlet x$=(a){b}").unwrap_err();
    assert_eq!(err.location(), Some(Location { row: 3, col: 6 }));
}
