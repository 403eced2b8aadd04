//! Rendering of declarations as Kusto management commands.
//!
//! ```text
//! .create-or-alter function with (folder="<folder>",docstring="<doc>") <name> <body>
//! .create-merge table <name><signature> (folder="<folder>",docstring="<doc>")
//! ```
//!
//! The output is executed verbatim by the service, so the exact quoting
//! and spacing are covered by golden tests.

use std::fmt;
use std::io::{self, Write};

use crate::syntax::{Declaration, DeclarationKind};

/// A declaration paired with the folder it is stored under.
pub struct Command<'a> {
    declaration: &'a Declaration,
    folder: String,
}

impl<'a> Command<'a> {
    pub fn new(declaration: &'a Declaration, folder: &str) -> Self {
        Self {
            declaration,
            folder: normalize_folder(folder),
        }
    }
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decl = self.declaration;
        match decl.kind() {
            DeclarationKind::Function { body, .. } => write!(
                f,
                ".create-or-alter function with (folder=\"{}\",docstring=\"{}\") {} {}",
                self.folder,
                decl.doc(),
                decl.name(),
                body
            ),
            DeclarationKind::Table { signature } => writeln!(
                f,
                ".create-merge table {}{} (folder=\"{}\",docstring=\"{}\")",
                decl.name(),
                signature,
                self.folder,
                decl.doc()
            ),
        }
    }
}

/// Folder paths use forward slashes regardless of platform.
pub fn normalize_folder(folder: &str) -> String {
    folder.replace('\\', "/")
}

/// Write the command for `declaration` to `writer`.
pub fn write<W: Write + ?Sized>(
    writer: &mut W,
    declaration: &Declaration,
    folder: &str,
) -> io::Result<()> {
    write!(writer, "{}", Command::new(declaration, folder))
}

pub fn render(declaration: &Declaration, folder: &str) -> String {
    Command::new(declaration, folder).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_str;

    fn build(input: &str, folder: &str) -> String {
        let parsed = parse_str(input).unwrap();
        render(&parsed.declaration, folder)
    }

    #[test]
    fn test_golden_commands() {
        let cases = [
            (
                "let x=(any){ok}",
                "",
                ".create-or-alter function with (folder=\"\",docstring=\"\") x (any){ok}",
            ),
            (
                "let x = datatable(any) [ ok ]",
                "",
                ".create-merge table x(any) (folder=\"\",docstring=\"\")\n",
            ),
            (
                "//c1\n//c2\nlet x=(any){ok}",
                "",
                ".create-or-alter function with (folder=\"\",docstring=\"c1 c2\") x (any){ok}",
            ),
            (
                "// Lookup of regions.\nlet Regions = datatable (Name:string, Code:int) []",
                "reference",
                ".create-merge table Regions(Name:string, Code:int) (folder=\"reference\",docstring=\"Lookup of regions.\")\n",
            ),
            (
                "// Says \"hi\".\nlet Hello = (name:string) {\n    print strcat(\"hi \", name)\n}\n",
                "greetings/en",
                ".create-or-alter function with (folder=\"greetings/en\",docstring=\"Says \\\"hi\\\".\") Hello (name:string) {\n    print strcat(\"hi \", name)\n}\n",
            ),
            (
                "let Greet = (s:string = \"it's\") { print s }",
                "",
                ".create-or-alter function with (folder=\"\",docstring=\"\") Greet (s:string = \"it's\") { print s }",
            ),
        ];

        for (input, folder, expected) in cases {
            assert_eq!(build(input, folder), expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_folder_separators_are_normalized() {
        let out = build("let x=(a){b}", "sales\\daily");
        assert!(out.contains("folder=\"sales/daily\""));
    }

    #[test]
    fn test_write_matches_render() {
        let parsed = parse_str("let t = datatable(a:int)[]").unwrap();
        let mut out = Vec::new();
        write(&mut out, &parsed.declaration, "f").unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            render(&parsed.declaration, "f")
        );
    }
}
