//! Kusto declarative source syntax.
//!
//! A source file holds exactly one declaration, optionally preceded by
//! `//` comments that become its documentation:
//!
//! ```text
//! // Daily totals per region.
//! let DailyTotals = (region:string) { Sales | where Region == region }
//!
//! let Regions = datatable (Name:string, Code:int) []
//! ```
//!
//! - `lexer`: [`Cursor`], the span-returning read primitives
//! - `declaration`: the parsed [`Declaration`] record
//! - `parser`: the state machine that drives the cursor

mod declaration;
mod lexer;
mod parser;

pub use declaration::{Declaration, DeclarationKind};
pub use lexer::{Cursor, LexFault, Scan, Span};
pub use parser::{parse, parse_str, Parsed};

use serde::Serialize;
use thiserror::Error;

/// A position in a source file. Both fields are 1-based; `col` counts
/// characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    pub row: usize,
    pub col: usize,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.row, self.col)
    }
}

/// Errors that abort parsing of a single file.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("[{row},{col}] {message}")]
    Syntax {
        row: usize,
        col: usize,
        message: String,
    },
    #[error("reading source: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    pub(crate) fn syntax(location: Location, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            row: location.row,
            col: location.col,
            message: message.into(),
        }
    }

    /// Where the fault was detected, for syntax errors.
    pub fn location(&self) -> Option<Location> {
        match self {
            ParseError::Syntax { row, col, .. } => Some(Location {
                row: *row,
                col: *col,
            }),
            ParseError::Io(_) => None,
        }
    }
}

/// A non-fatal condition found while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    pub location: Location,
    pub message: String,
    /// Source text that was skipped.
    pub ignored: String,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.location, self.message)
    }
}
