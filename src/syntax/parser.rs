//! Declaration parser.
//!
//! Two grammars share the `let <name> =` prefix:
//!
//! ```text
//! function:  let \s+ {name} \s* = \s* ({signature}) {body...}
//! table:     let \s+ {name} \s* = \s* datatable \s* ({signature}) \s* [{rows}]
//! ```
//!
//! Function bodies are not parsed; everything from the opening `(` to the
//! end of the file is kept verbatim. Table rows are skipped with a warning.

use std::io::Read;

use unicode_general_category::{get_general_category, GeneralCategory};

use super::declaration::{Declaration, DeclarationKind};
use super::lexer::{Cursor, LexFault, Span};
use super::{ParseError, ParseWarning};

const LET: &str = "let";
const DATATABLE: &str = "datatable";
const COMMENT: &str = "//";

/// A successfully parsed file.
#[derive(Debug, Clone)]
pub struct Parsed {
    pub declaration: Declaration,
    pub warnings: Vec<ParseWarning>,
}

/// Parse the single declaration held by `reader`.
pub fn parse<R: Read>(reader: R) -> Result<Parsed, ParseError> {
    parse_cursor(Cursor::from_reader(reader)?)
}

pub fn parse_str(source: &str) -> Result<Parsed, ParseError> {
    parse_cursor(Cursor::new(source))
}

fn parse_cursor(mut cursor: Cursor) -> Result<Parsed, ParseError> {
    let doc = harvest_doc(&mut cursor)?;
    let mut parser = Parser {
        cursor,
        warnings: Vec::new(),
    };
    let (name, kind) = parser.run()?;
    Ok(Parsed {
        declaration: Declaration::new(name, doc, kind),
        warnings: parser.warnings,
    })
}

/// Collect the doc comment and leave the cursor at the start of the `let`
/// line.
///
/// Only the run of `//` lines directly above `let` counts; a blank or
/// non-comment line ends the run.
fn harvest_doc(cursor: &mut Cursor) -> Result<String, ParseError> {
    let mut preceding: Vec<Span> = Vec::new();
    let let_line = loop {
        let Some(line) = cursor.read_line() else {
            return Err(ParseError::syntax(
                cursor.location(),
                "missing 'let' statement in file",
            ));
        };
        if cursor.text(line).trim_start().starts_with(LET) {
            break line;
        }
        preceding.push(line);
    };
    cursor.seek(let_line.start);

    let run_start = preceding
        .iter()
        .rposition(|line| !cursor.text(*line).starts_with(COMMENT))
        .map_or(0, |i| i + 1);

    let doc = preceding[run_start..]
        .iter()
        .map(|line| {
            cursor.text(*line)[COMMENT.len()..]
                .trim()
                .replace('"', "\\\"")
        })
        .collect::<Vec<_>>()
        .join(" ");
    Ok(doc)
}

/// Parser stages. Each carries what has been validated so far.
enum Stage {
    Keyword,
    Name,
    Kind { name: String },
    TableSignature { name: String, open: usize },
    TableRows { name: String, signature: String },
}

enum Step {
    Next(Stage),
    Done { name: String, kind: DeclarationKind },
}

struct Parser {
    cursor: Cursor,
    warnings: Vec<ParseWarning>,
}

impl Parser {
    fn run(&mut self) -> Result<(String, DeclarationKind), ParseError> {
        let mut stage = Stage::Keyword;
        loop {
            stage = match self.step(stage)? {
                Step::Next(next) => next,
                Step::Done { name, kind } => return Ok((name, kind)),
            };
        }
    }

    fn step(&mut self, stage: Stage) -> Result<Step, ParseError> {
        match stage {
            Stage::Keyword => self.keyword(),
            Stage::Name => self.name(),
            Stage::Kind { name } => self.kind(name),
            Stage::TableSignature { name, open } => self.table_signature(name, open),
            Stage::TableRows { name, signature } => self.table_rows(name, signature),
        }
    }

    // \s*let
    fn keyword(&mut self) -> Result<Step, ParseError> {
        self.cursor.skip_space();
        let token = self.cursor.read_token();
        let text = self.cursor.text(token.span);
        if text != LET {
            return Err(self.fault_at(
                token.span.start,
                format!("expected 'let' statement, found {}", text),
            ));
        }
        Ok(Step::Next(Stage::Name))
    }

    // \s+{name}\s*=
    fn name(&mut self) -> Result<Step, ParseError> {
        self.cursor.skip_space();
        let assignment = self.cursor.consume_till('=');
        if !assignment.more {
            return Err(self.fault("expected variable assignment '=' after identifier"));
        }

        let raw = Span::new(assignment.span.start, assignment.span.end - 1);
        let mut name = String::new();
        for (i, c) in self.cursor.text(raw).char_indices() {
            if is_identifier(c) {
                name.push(c);
            } else if !c.is_whitespace() {
                return Err(self.fault_at(raw.start + i, format!("unexpected character '{}'", c)));
            }
        }

        if name.is_empty() {
            return Err(self.fault_at(raw.end, "expected identifier before '='"));
        }
        Ok(Step::Next(Stage::Kind { name }))
    }

    // \s*( for functions, \s*datatable\s*( for tables
    fn kind(&mut self, name: String) -> Result<Step, ParseError> {
        let opener = match self.cursor.read_spaced_with(|c| c == '(' || c == 'd') {
            Ok(scan) if scan.more => scan.span,
            Ok(_) | Err(LexFault::Unexpected { .. }) => {
                return Err(self.fault(
                    "expected '(' for function declaration, or 'datatable' for table declaration",
                ));
            }
        };

        if self.cursor.text(opener) == "(" {
            // The signature grammar is too loose to parse safely, so only the
            // first closing parenthesis is located, quotes included, and the
            // rest is passed through.
            let signature = self.cursor.consume_through(')');
            if !signature.more {
                return Err(self.fault("unmatched parenthesis, missing ')' in function signature"));
            }
            let signature = opener.to(signature.span);
            let mut body = signature;
            while let Some(line) = self.cursor.read_line() {
                body = body.to(line);
            }
            return Ok(Step::Done {
                name,
                kind: DeclarationKind::Function {
                    signature: self.cursor.text(signature).to_string(),
                    body: self.cursor.text(body).to_string(),
                },
            });
        }

        let keyword = self.cursor.consume_till('(');
        let span = opener.to(keyword.span);
        if !self.cursor.text(span).starts_with(DATATABLE) {
            return Err(self.fault_at(
                opener.start,
                "invalid keyword. expected 'datatable' for table declaration",
            ));
        }
        if !keyword.more {
            return Err(self.fault("expected '(' after 'datatable' for table declaration"));
        }

        let open = span.end - 1;
        let between = Span::new(span.start + DATATABLE.len(), open);
        if let Some((i, c)) = self
            .cursor
            .text(between)
            .char_indices()
            .find(|(_, c)| !c.is_whitespace())
        {
            return Err(self.fault_at(between.start + i, format!("invalid character '{}'", c)));
        }

        Ok(Step::Next(Stage::TableSignature { name, open }))
    }

    // ({signature}), the opening parenthesis already consumed
    fn table_signature(&mut self, name: String, open: usize) -> Result<Step, ParseError> {
        let close = self.cursor.consume_till(')');
        if !close.more {
            return Err(self.fault("unmatched parenthesis, missing ')' in declaration signature"));
        }
        let signature = self.cursor.text(Span::new(open, close.span.end)).to_string();
        Ok(Step::Next(Stage::TableRows { name, signature }))
    }

    // \s*[{rows}]
    fn table_rows(&mut self, name: String, signature: String) -> Result<Step, ParseError> {
        let open = match self.cursor.read_spaced('[') {
            Ok(scan) if scan.more => scan.span,
            Ok(_) => return Err(self.fault("expected '[' for beginning of table body")),
            Err(LexFault::Unexpected { .. }) => {
                return Err(self.fault(
                    "unexpected character found. expected '[' for beginning of table body",
                ));
            }
        };

        let close = self.cursor.consume_till(']');
        if !close.more {
            return Err(self.fault("unmatched brackets, missing ']' for end of table body"));
        }

        let rows = Span::new(open.end, close.span.end - 1);
        let text = self.cursor.text(rows);
        if let Some(i) = text.find(|c: char| c != '[' && c != ']' && !c.is_whitespace()) {
            let warning = ParseWarning {
                location: self.cursor.location_at(rows.start + i),
                message: "syncing data within datatable syntax is not currently supported, \
                          the table rows will be ignored"
                    .to_string(),
                ignored: text[i..].trim_end().to_string(),
            };
            self.warnings.push(warning);
        }

        Ok(Step::Done {
            name,
            kind: DeclarationKind::Table { signature },
        })
    }

    fn fault(&self, message: impl Into<String>) -> ParseError {
        ParseError::syntax(self.cursor.location(), message)
    }

    fn fault_at(&self, offset: usize, message: impl Into<String>) -> ParseError {
        ParseError::syntax(self.cursor.location_at(offset), message)
    }
}

/// Letters, decimal digits and underscores. Identifiers that need quoting
/// (spaces, dots, dashes) are not supported in declarations.
///
/// Other numerics (`²`, `Ⅷ`) are not identifier characters even though
/// `char::is_alphanumeric` accepts them.
fn is_identifier(c: char) -> bool {
    use GeneralCategory::*;
    c == '_'
        || matches!(
            get_general_category(c),
            UppercaseLetter
                | LowercaseLetter
                | TitlecaseLetter
                | ModifierLetter
                | OtherLetter
                | DecimalNumber
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Location;

    fn parse_ok(input: &str) -> Parsed {
        match parse_str(input) {
            Ok(parsed) => parsed,
            Err(e) => panic!("parsing {:?} failed: {}", input, e),
        }
    }

    fn parse_err(input: &str) -> ParseError {
        match parse_str(input) {
            Ok(parsed) => panic!("parsing {:?} should fail, got {:?}", input, parsed),
            Err(e) => e,
        }
    }

    #[test]
    fn test_parse_declarations() {
        let cases = [
            ("fn", "let x=(any){ok}"),
            ("fn_spaced", "let x = (any){ok}"),
            ("fn_spaced_newline", "let\nx\n=\n(any){ok}"),
            ("fn_comments", "//c1\n//c2\n//c3\nlet x=(any){ok}"),
            ("table", "let x=datatable(any)[ok]"),
            ("table_spaced", "let x = datatable(any) [ ok ]"),
            ("table_spaced_newline", "let\nx\n=\ndatatable(\nany\n)[\nok\n]"),
            ("table_comments", "//c1\n//c2\n//c3\nlet x=datatable(any)[ok]"),
        ];

        for (name, input) in cases {
            let parsed = parse_ok(input);
            let decl = &parsed.declaration;
            assert_eq!(decl.name(), "x", "{}", name);

            if name.starts_with("table") {
                assert!(decl.is_table(), "{}", name);
                assert_eq!(decl.body(), "", "{}", name);
            } else {
                assert!(decl.is_function(), "{}", name);
                assert_eq!(decl.body(), "(any){ok}", "{}", name);
            }

            if input.starts_with("//c1") {
                assert_eq!(decl.doc(), "c1 c2 c3", "{}", name);
            } else {
                assert_eq!(decl.doc(), "", "{}", name);
            }
        }
    }

    #[test]
    fn test_parse_accepted_syntax() {
        let cases = [
            "let x = ( any    ) { ok }",
            "let\nx\n=\n(\nany\n)\n{\nok\n}",
            "//c1\n//c2\n//c3\nlet x=()",
            "let x=datatable()[]",
            "let x = datatable ( any ) [ ok ] ",
            "let\nx\n=\ndatatable\n(\nany\n)[\n\n]",
            "let x = datatable(a,b,c,d)[any]",
            "//c1\n//c2\n//c3\nlet x=datatable()[]",
            "let my_func2 = (a:string = ')') { a }",
            "let Greet = (s:string = \"it's\") { print s }",
            "let Q = (s:string = 'say \"hi') { s }",
        ];

        for input in cases {
            parse_ok(input);
        }
    }

    #[test]
    fn test_parse_syntax_errors() {
        let cases = [
            ("noLet", "", "missing 'let'"),
            ("noLetWithComment", "// comment", "missing 'let'"),
            ("unfinishedLet", "// comment\nlet", "expected variable assignment"),
            ("unfinishedLetEqual", "// comment\nlet x", "expected variable assignment"),
            ("unfinishedLetDecl", "// comment\nlet x=", "expected '('"),
            ("invalid", "// comment\nlet x=unknown", "expected '('"),
            ("invalidData", "// comment\nlet x=datan", "invalid keyword"),
            ("missingTableSig", "// comment\nlet x=datatable", "expected '(' after 'datatable'"),
            ("missingTableClose", "// comment\nlet x=datatable(", "missing ')'"),
            ("missingFunctionClose", "let x=(", "missing ')'"),
            ("missingTableBody", "let x=datatable(a)", "expected '['"),
            ("invalidTableBody", "let x=datatable(a) {}", "unexpected character found"),
            ("missingTableBodyClose", "let x=datatable(a)[", "missing ']'"),
            ("notLet", "letx=(a){b}", "expected 'let' statement, found letx=(a){b}"),
            ("emptyName", "let = (a){b}", "expected identifier"),
        ];

        for (name, input, expected) in cases {
            let err = parse_err(input);
            assert!(
                err.to_string().contains(expected),
                "{}: expected {:?} in {:?}",
                name,
                expected,
                err.to_string()
            );
            assert!(err.location().is_some(), "{}", name);
        }
    }

    #[test]
    fn test_invalid_name_character_location() {
        let err = parse_err("let x$=(a){b}");
        assert_eq!(err.location(), Some(Location { row: 1, col: 6 }));
        assert_eq!(err.to_string(), "[1,6] unexpected character '$'");

        let err = parse_err("// doc\nlet  my-func = (a){b}");
        assert_eq!(err.location(), Some(Location { row: 2, col: 8 }));
        assert!(err.to_string().contains("'-'"));
    }

    #[test]
    fn test_invalid_character_after_datatable_location() {
        let err = parse_err("let x=datatable y(a)[]");
        assert_eq!(err.location(), Some(Location { row: 1, col: 17 }));
        assert_eq!(err.to_string(), "[1,17] invalid character 'y'");

        let err = parse_err("let x=\n  datatable \n z (a)[]");
        assert_eq!(err.location(), Some(Location { row: 3, col: 2 }));
    }

    #[test]
    fn test_unexpected_kind_location() {
        let err = parse_err("let x =\n  unknown");
        assert_eq!(err.location(), Some(Location { row: 2, col: 3 }));
    }

    #[test]
    fn test_whitespace_insensitivity() {
        let functions = [
            "let x=(any){ok}",
            "let   x   =   (any){ok}",
            "\n\nlet\n\tx\n=\n\n(any) {ok}",
            "  let x =(any)\n{ok}",
        ];
        for input in functions {
            let decl = parse_ok(input).declaration;
            assert_eq!(decl.name(), "x", "{:?}", input);
            assert!(decl.is_function(), "{:?}", input);
            assert_eq!(decl.signature(), "(any)", "{:?}", input);
        }

        let tables = [
            "let x=datatable(a:string)[]",
            "let x = datatable (a:string) []",
            "let\n x\n =\n datatable\n\t(a:string)\n[\n]",
        ];
        for input in tables {
            let decl = parse_ok(input).declaration;
            assert_eq!(decl.name(), "x", "{:?}", input);
            assert!(decl.is_table(), "{:?}", input);
            assert_eq!(decl.signature(), "(a:string)", "{:?}", input);
        }
    }

    #[test]
    fn test_function_body_is_verbatim() {
        let input = "// Adds one.\nlet AddOne = (a:int) {\n    a + 1\n}\n\n// trailing\n";
        let decl = parse_ok(input).declaration;
        assert_eq!(decl.name(), "AddOne");
        assert_eq!(decl.signature(), "(a:int)");
        assert_eq!(decl.body(), "(a:int) {\n    a + 1\n}\n\n// trailing\n");
        assert_eq!(decl.doc(), "Adds one.");
    }

    #[test]
    fn test_function_signature_with_unpaired_quote() {
        let decl = parse_ok("let Greet = (s:string = \"it's\") { print s }").declaration;
        assert_eq!(decl.name(), "Greet");
        assert_eq!(decl.signature(), "(s:string = \"it's\")");
        assert_eq!(decl.body(), "(s:string = \"it's\") { print s }");

        let decl = parse_ok("let Q = (s:string = 'say \"hi')\n{ s }\n").declaration;
        assert_eq!(decl.signature(), "(s:string = 'say \"hi')");
        assert_eq!(decl.body(), "(s:string = 'say \"hi')\n{ s }\n");
    }

    #[test]
    fn test_identifier_characters() {
        assert_eq!(parse_ok("let Été_٣ = (a){b}").declaration.name(), "Été_٣");

        let err = parse_err("let x² = (a){b}");
        assert_eq!(err.to_string(), "[1,6] unexpected character '²'");
        let err = parse_err("let xⅧ = (a){b}");
        assert_eq!(err.to_string(), "[1,6] unexpected character 'Ⅷ'");
    }

    #[test]
    fn test_table_signature_is_verbatim() {
        let decl = parse_ok("let T = datatable(\n  Name:string,\n  ['Col )']:int\n) []")
            .declaration;
        assert_eq!(decl.signature(), "(\n  Name:string,\n  ['Col )']:int\n)");
        assert_eq!(decl.body(), "");
    }

    #[test]
    fn test_doc_uses_trailing_comment_run() {
        let decl = parse_ok("//c1\n\n//c2\nlet x=(a){b}").declaration;
        assert_eq!(decl.doc(), "c2");

        let decl = parse_ok("//c1\nnot a comment\n//c2\n//c3\nlet x=(a){b}").declaration;
        assert_eq!(decl.doc(), "c2 c3");

        let decl = parse_ok("//c1\n//c2\n\nlet x=(a){b}").declaration;
        assert_eq!(decl.doc(), "");
    }

    #[test]
    fn test_doc_is_trimmed_and_escaped() {
        let decl = parse_ok("//   padded   \n// say \"hi\"\nlet x=(a){b}").declaration;
        assert_eq!(decl.doc(), "padded say \\\"hi\\\"");
    }

    #[test]
    fn test_crlf_line_endings() {
        let decl = parse_ok("// c1\r\nlet x = (a) { b }\r\n").declaration;
        assert_eq!(decl.doc(), "c1");
        assert_eq!(decl.body(), "(a) { b }\r\n");
    }

    #[test]
    fn test_table_rows_warn() {
        let parsed = parse_ok("let x = datatable(any) [ ok ]");
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].ignored, "ok");
        assert_eq!(parsed.warnings[0].location, Location { row: 1, col: 26 });

        let parsed = parse_ok("let x = datatable(a:string, b:int)\n[\n  'a', 1,\n  'b', 2\n]");
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].ignored, "'a', 1,\n  'b', 2");
        assert_eq!(parsed.warnings[0].location.row, 3);
    }

    #[test]
    fn test_empty_table_rows_do_not_warn() {
        let parsed = parse_ok("let x=datatable(a:string)[ \n ]");
        assert!(parsed.warnings.is_empty());
        assert!(parse_ok("let x = datatable(any) []").warnings.is_empty());
    }

    #[test]
    fn test_parse_reader() {
        let parsed = parse("//doc\nlet x=(a){b}".as_bytes()).unwrap();
        assert_eq!(parsed.declaration.doc(), "doc");
    }
}
