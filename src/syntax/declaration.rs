//! The parsed form of one source file.

/// A function or table declaration.
///
/// Built by the parser and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    name: String,
    doc: String,
    kind: DeclarationKind,
}

/// The two declaration shapes. Each variant owns exactly the text it
/// needs for emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationKind {
    /// `let name = (signature) { body }`
    Function {
        /// The parenthesized parameter list, verbatim.
        signature: String,
        /// Everything from the opening `(` to the end of the file, verbatim.
        body: String,
    },
    /// `let name = datatable (signature) [rows]`
    Table {
        /// The parenthesized column list, verbatim.
        signature: String,
    },
}

impl DeclarationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationKind::Function { .. } => "function",
            DeclarationKind::Table { .. } => "table",
        }
    }
}

impl std::fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Declaration {
    pub(crate) fn new(name: String, doc: String, kind: DeclarationKind) -> Self {
        Self { name, doc, kind }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Documentation from the leading comment block, with `"` escaped.
    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn kind(&self) -> &DeclarationKind {
        &self.kind
    }

    pub fn signature(&self) -> &str {
        match &self.kind {
            DeclarationKind::Function { signature, .. } => signature,
            DeclarationKind::Table { signature } => signature,
        }
    }

    /// The function body, or the empty string for tables.
    pub fn body(&self) -> &str {
        match &self.kind {
            DeclarationKind::Function { body, .. } => body,
            DeclarationKind::Table { .. } => "",
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, DeclarationKind::Function { .. })
    }

    pub fn is_table(&self) -> bool {
        matches!(self.kind, DeclarationKind::Table { .. })
    }
}
