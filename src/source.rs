//! Source buffer: holds the full text of a compilation unit and resolves
//! byte offsets to line/column for diagnostics. Tokens and AST nodes keep
//! offsets rather than copying slices, per the engine's zero-copy spans.

use std::rc::Rc;

use crate::error::Position;

/// The text of one source unit plus its (optional) filename, shared via
/// `Rc` so tokens and diagnostics can cheaply reference it.
#[derive(Debug, Clone)]
pub struct SourceBuffer {
    text: Rc<str>,
    filename: Option<Rc<str>>,
    /// Byte offset of the start of each line, used for O(log n) offset to
    /// line/column resolution.
    line_starts: Rc<[u32]>,
}

impl SourceBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_filename(text, None::<String>)
    }

    pub fn with_filename(text: impl Into<String>, filename: Option<impl Into<String>>) -> Self {
        let text: Rc<str> = text.into().into();
        let mut starts = vec![0u32];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i as u32 + 1);
            }
        }
        SourceBuffer {
            text,
            filename: filename.map(|f| f.into().into()),
            line_starts: starts.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Resolve a byte offset into a 1-based line and column.
    pub fn position_at(&self, offset: u32) -> Position {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.line_starts[line_idx];
        let column = offset.saturating_sub(line_start) + 1;
        Position { line: line_idx as u32 + 1, column, offset }
    }

    /// Re-slice a span of the source text. Panics only on out-of-range
    /// offsets, which never occur for spans produced by this crate's own
    /// lexer.
    pub fn slice(&self, start: u32, end: u32) -> &str {
        &self.text[start as usize..end as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_line_and_column() {
        let buf = SourceBuffer::new("abc\ndef\nghi");
        assert_eq!(buf.position_at(0), Position { line: 1, column: 1, offset: 0 });
        assert_eq!(buf.position_at(4), Position { line: 2, column: 1, offset: 4 });
        assert_eq!(buf.position_at(9), Position { line: 3, column: 2, offset: 9 });
    }

    #[test]
    fn slices_round_trip() {
        let buf = SourceBuffer::new("const a = 1;");
        assert_eq!(buf.slice(0, 5), "const");
    }
}
