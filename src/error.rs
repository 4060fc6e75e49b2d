//! Error module: source locations and the error taxonomy of the filter engine.
//!
//! Every compile-time failure is a [`CompileError`] carrying a human readable
//! message and the [`Location`] of the offending text. Evaluation has no error
//! channel; [`ContextError`] only covers populating a [`crate::FilterContext`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A span of the original filter text, in byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub col_start: isize,
    pub col_len: usize,
}

impl Location {
    /// Sentinel meaning "no specific span".
    pub const EMPTY: Location = Location { col_start: -1, col_len: 0 };

    pub fn new(col_start: usize, col_len: usize) -> Self {
        Self {
            col_start: col_start as isize,
            col_len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.col_start < 0
    }

    /// Exclusive end offset of the span.
    pub fn end(&self) -> isize {
        self.col_start + self.col_len as isize
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(self, other: Location) -> Location {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        let start = self.col_start.min(other.col_start);
        let end = self.end().max(other.end());
        Location {
            col_start: start,
            col_len: (end - start) as usize,
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Location::EMPTY
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}..{}", self.col_start, self.end())
        }
    }
}

/// A filter failed to compile. Compilation is all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("lexical error at {location}: {message}")]
    Lexical { message: String, location: Location },
    #[error("syntax error at {location}: {message}")]
    Syntax { message: String, location: Location },
    #[error("unknown field at {location}: {message}")]
    UnknownField { message: String, location: Location },
    #[error("type mismatch at {location}: {message}")]
    TypeMismatch { message: String, location: Location },
    #[error("invalid range at {location}: {message}")]
    Range { message: String, location: Location },
    #[error("invalid function call at {location}: {message}")]
    Arity { message: String, location: Location },
}

impl CompileError {
    pub fn lexical(message: impl Into<String>, location: Location) -> Self {
        CompileError::Lexical { message: message.into(), location }
    }

    pub fn syntax(message: impl Into<String>, location: Location) -> Self {
        CompileError::Syntax { message: message.into(), location }
    }

    pub fn unknown_field(name: &str, location: Location) -> Self {
        CompileError::UnknownField {
            message: format!("\"{name}\" is not a valid protocol or protocol field"),
            location,
        }
    }

    pub fn type_mismatch(message: impl Into<String>, location: Location) -> Self {
        CompileError::TypeMismatch { message: message.into(), location }
    }

    pub fn range(message: impl Into<String>, location: Location) -> Self {
        CompileError::Range { message: message.into(), location }
    }

    pub fn arity(message: impl Into<String>, location: Location) -> Self {
        CompileError::Arity { message: message.into(), location }
    }

    pub fn message(&self) -> &str {
        match self {
            CompileError::Lexical { message, .. }
            | CompileError::Syntax { message, .. }
            | CompileError::UnknownField { message, .. }
            | CompileError::TypeMismatch { message, .. }
            | CompileError::Range { message, .. }
            | CompileError::Arity { message, .. } => message,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            CompileError::Lexical { location, .. }
            | CompileError::Syntax { location, .. }
            | CompileError::UnknownField { location, .. }
            | CompileError::TypeMismatch { location, .. }
            | CompileError::Range { location, .. }
            | CompileError::Arity { location, .. } => *location,
        }
    }

    /// Renders the message followed by the source text with the offending
    /// span underlined.
    pub fn render(&self, source: &str) -> String {
        let location = self.location();
        if location.is_empty() || location.col_start as usize > source.len() {
            return self.message().to_string();
        }
        let start = location.col_start as usize;
        let end = (location.end() as usize).min(source.len());
        let lead = source.get(..start).map_or(start, |s| s.chars().count());
        let width = source.get(start..end).map_or(1, |s| s.chars().count()).max(1);
        format!(
            "{}\n{}\n{}^{}",
            self.message(),
            source,
            " ".repeat(lead),
            "~".repeat(width - 1)
        )
    }
}

/// A value pushed into a [`crate::FilterContext`] disagrees with the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("field '{0}' is not registered")]
    UnknownField(String),
    #[error("type mismatch for field '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },
}
