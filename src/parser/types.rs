//! Parser Types and Constants
//!
//! Shared error type, options and limits used across parser modules.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Parser limits to prevent hangs and resource exhaustion
pub const MAX_INPUT_SIZE: usize = 1_000_000; // characters
pub const MAX_PARSER_DEPTH: usize = 200; // nested sub-parsers and compound commands

/// Broad category of a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Malformed input: unterminated construct, missing closer, bad redirect target.
    Syntax,
    /// Input ended while a balanced region was still open.
    UnexpectedEof,
    /// A configured limit (input size, nesting depth) was exceeded.
    LimitExceeded,
}

pub type ParseResult<T> = Result<T, ParseException>;

#[derive(Debug, Clone, Error)]
#[error("Parse error at {line}:{column}: {message}")]
pub struct ParseException {
    pub message: String,
    /// Character offset into the source.
    pub position: usize,
    pub line: usize,
    pub column: usize,
    pub kind: ErrorKind,
}

impl ParseException {
    /// A syntax error at a character offset. Line and column are filled in by
    /// [`ParseException::locate`] once the source is known.
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
            line: 0,
            column: 0,
            kind: ErrorKind::Syntax,
        }
    }

    pub fn unexpected_eof(message: impl Into<String>, position: usize) -> Self {
        Self {
            kind: ErrorKind::UnexpectedEof,
            ..Self::new(message, position)
        }
    }

    pub fn limit(message: impl Into<String>, position: usize) -> Self {
        Self {
            kind: ErrorKind::LimitExceeded,
            ..Self::new(message, position)
        }
    }

    /// Resolve `line`/`column` (both 1-based) from `position` against `source`.
    pub fn locate(mut self, source: &[char]) -> Self {
        let end = self.position.min(source.len());
        let mut line = 1;
        let mut column = 1;
        for &c in &source[..end] {
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        self.line = line;
        self.column = column;
        self
    }

    pub fn is_unexpected_eof(&self) -> bool {
        self.kind == ErrorKind::UnexpectedEof
    }
}

/// Parser configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Recognize `@()`, `?()`, `*()`, `+()`, `!()` pattern groups.
    pub extglob: bool,
    pub max_input_size: usize,
    pub max_depth: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            extglob: false,
            max_input_size: MAX_INPUT_SIZE,
            max_depth: MAX_PARSER_DEPTH,
        }
    }
}

impl ParserOptions {
    pub fn with_extglob(extglob: bool) -> Self {
        Self {
            extglob,
            ..Self::default()
        }
    }

    /// Load options from a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
