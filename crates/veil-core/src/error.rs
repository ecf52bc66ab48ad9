use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    #[error("Overlapping edits at {first} and {second}")]
    Overlap { first: Span, second: Span },

    #[error("Edit {span} falls outside the source buffer (len {len})")]
    OutOfBounds { span: Span, len: usize },

    #[error("Edit {span} does not start and end on character boundaries")]
    CharBoundary { span: Span },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// Input or output text failed to parse. Always fatal.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Two computed edits collide. Always fatal.
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    /// Recursive inlining was requested. The call site is skipped.
    #[error("Inline cycle through `{function}` at {span}")]
    InlineCycle { function: String, span: Span },

    /// The pass found nothing to rewrite.
    #[error("No eligible target for pass `{pass}`")]
    IneligibleTarget { pass: &'static str },

    /// A construct the pass does not model. The enclosing construct is skipped.
    #[error("Unsupported construct `{construct}` at {span}")]
    UnsupportedConstruct { construct: String, span: Span },
}

impl TransformError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransformError::Parse(_) | TransformError::Rewrite(_))
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            TransformError::InlineCycle { span, .. }
            | TransformError::UnsupportedConstruct { span, .. } => Some(*span),
            TransformError::Rewrite(RewriteError::Overlap { first, .. }) => Some(*first),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
}

/// A recoverable condition recorded by a pass, located in the pass's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub pass: String,
    pub severity: Severity,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}:{}: {}",
            self.pass, self.line, self.column, self.message
        )
    }
}

pub type Result<T> = std::result::Result<T, TransformError>;
