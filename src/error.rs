//! Error kinds surfaced across the lexer, parser and evaluator.
//!
//! Mirrors the closed taxonomy from the host-facing error model: lexer and
//! parser failures abort compilation outright (no partial tree is ever
//! returned), while evaluator failures are also representable as ordinary
//! JS `Error` values so script `try`/`catch` can observe them.

use std::fmt;

use thiserror::Error;

/// A source position captured for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The closed set of error kinds the engine can raise, matching the names
/// scripts see on `Error.prototype.name` / `err.name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SyntaxError,
    TypeError,
    ReferenceError,
    RangeError,
    Error,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::Error => "Error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A compile-time (lexer/parser) failure. Compilation aborts at the first
/// one raised — there is no partial tree.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{kind}: {message} at {position}")]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub position: Position,
}

impl CompileError {
    pub fn syntax(message: impl Into<String>, position: Position) -> Self {
        CompileError { kind: ErrorKind::SyntaxError, message: message.into(), position }
    }
}

/// A host-facing failure from [`crate::JsEngine::eval`]: either a compile
/// error or a thrown runtime value re-raised as a single exception carrying
/// a synthesized stack of source positions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("{message}\n{}", stack.iter().map(|p| format!("    at {p}")).collect::<Vec<_>>().join("\n"))]
    Thrown { message: String, stack: Vec<Position> },
}
