//! Cursor over a single source file.
//!
//! The cursor owns the whole source text and a byte offset into it. Each
//! primitive advances the offset and hands back the [`Span`] it consumed,
//! so callers compose tokens from spans instead of sharing a token buffer.
//! Row and column are derived from the offset on demand, which keeps them
//! exact across [`Cursor::seek`].

use std::io::Read;

use super::{Location, ParseError};

/// A byte range into the cursor's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn empty(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// The smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Result of a cursor primitive.
///
/// `more` is false when the input ran out before the primitive found what
/// it was looking for; `span` still covers whatever was consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scan {
    pub span: Span,
    pub more: bool,
}

impl Scan {
    fn found(span: Span) -> Self {
        Self { span, more: true }
    }

    fn exhausted(span: Span) -> Self {
        Self { span, more: false }
    }
}

/// Faults raised by the cursor itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexFault {
    /// A non-whitespace character other than the expected delimiter.
    Unexpected { ch: char, offset: usize },
}

pub struct Cursor {
    source: String,
    offset: usize,
}

impl Cursor {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            offset: 0,
        }
    }

    /// Read the full stream into a cursor.
    ///
    /// Read failures and invalid UTF-8 are reported here, before any
    /// primitive runs.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, ParseError> {
        let mut source = String::new();
        reader.read_to_string(&mut source)?;
        Ok(Self::new(source))
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.source.len()
    }

    /// Move the cursor to an absolute byte offset.
    ///
    /// Offsets past the end clamp to the end. `offset` must fall on a
    /// character boundary, which holds for any offset taken from a span.
    pub fn seek(&mut self, offset: usize) {
        debug_assert!(self.source.is_char_boundary(offset.min(self.source.len())));
        self.offset = offset.min(self.source.len());
    }

    pub fn text(&self, span: Span) -> &str {
        &self.source[span.start..span.end]
    }

    pub fn location(&self) -> Location {
        self.location_at(self.offset)
    }

    pub fn location_at(&self, offset: usize) -> Location {
        let before = &self.source[..offset.min(self.source.len())];
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        Location {
            row: before.matches('\n').count() + 1,
            col: before[line_start..].chars().count() + 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.offset..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        Some(c)
    }

    /// Advance past the next line terminator, spanning the whole line
    /// including the `\n`. The last line may lack a terminator.
    ///
    /// Returns `None` once the input is exhausted.
    pub fn read_line(&mut self) -> Option<Span> {
        if self.is_exhausted() {
            return None;
        }
        let start = self.offset;
        let rest = &self.source[start..];
        self.offset += rest.find('\n').map_or(rest.len(), |i| i + 1);
        Some(Span::new(start, self.offset))
    }

    /// Advance past a run of whitespace.
    ///
    /// The returned span covers the first non-whitespace character, which
    /// is left unconsumed.
    pub fn skip_space(&mut self) -> Scan {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                return Scan::found(Span::new(self.offset, self.offset + c.len_utf8()));
            }
            self.offset += c.len_utf8();
        }
        Scan::exhausted(Span::empty(self.offset))
    }

    /// Advance up to, not including, the next whitespace character.
    pub fn read_token(&mut self) -> Scan {
        let start = self.offset;
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                return Scan::found(Span::new(start, self.offset));
            }
            self.offset += c.len_utf8();
        }
        Scan::exhausted(Span::new(start, self.offset))
    }

    /// Advance through the first unescaped `delim`, inclusive.
    ///
    /// Every `'` or `"` toggles whether the cursor is inside a quoted
    /// string; a delimiter inside a string does not count.
    pub fn consume_till(&mut self, delim: char) -> Scan {
        let start = self.offset;
        let mut in_string = false;
        while let Some(c) = self.bump() {
            if c == '\'' || c == '"' {
                in_string = !in_string;
            }
            if !in_string && c == delim {
                return Scan::found(Span::new(start, self.offset));
            }
        }
        Scan::exhausted(Span::new(start, self.offset))
    }

    /// Advance through the first `delim`, inclusive, without regard to
    /// quotes.
    pub fn consume_through(&mut self, delim: char) -> Scan {
        let start = self.offset;
        let rest = &self.source[start..];
        match rest.find(delim) {
            Some(i) => {
                self.offset += i + delim.len_utf8();
                Scan::found(Span::new(start, self.offset))
            }
            None => {
                self.offset = self.source.len();
                Scan::exhausted(Span::new(start, self.offset))
            }
        }
    }

    /// Skip whitespace, then consume one character accepted by `accept`.
    ///
    /// Any other character is a [`LexFault::Unexpected`] and is left in
    /// place.
    pub fn read_spaced_with<F>(&mut self, accept: F) -> Result<Scan, LexFault>
    where
        F: Fn(char) -> bool,
    {
        let space = self.skip_space();
        match self.peek() {
            Some(ch) if accept(ch) => {
                self.offset += ch.len_utf8();
                Ok(Scan::found(space.span))
            }
            Some(ch) => Err(LexFault::Unexpected {
                ch,
                offset: self.offset,
            }),
            None => Ok(space),
        }
    }

    pub fn read_spaced(&mut self, delim: char) -> Result<Scan, LexFault> {
        self.read_spaced_with(|c| c == delim)
    }
}
