//! Error types and the diagnostic reporter capability.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt::{self, Display};
use thiserror::Error;

/// Position of a statement or plan node in the original SQL text,
/// carried through the plan so that diagnostics can point back at it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

impl SourcePosition {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

/// Where non-fatal diagnostics go.
///
/// Injected into the compiler rather than reached through a global so
/// that embedders decide what "reporting" means. Fatal conditions do
/// not pass through here; they abort the statement as
/// [`CompileError`]s.
pub trait ErrorReporter {
    fn report(&self, position: SourcePosition, severity: Severity, title: &str, message: &str);
}

/// A single reported diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub position: SourcePosition,
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

/// An [`ErrorReporter`] that accumulates diagnostics in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.borrow().is_empty()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, position: SourcePosition, severity: Severity, title: &str, message: &str) {
        self.diagnostics.borrow_mut().push(Diagnostic {
            position,
            severity,
            title: title.to_owned(),
            message: message.to_owned(),
        });
    }
}

/// Fatal compilation failures. These abort the enclosing statement;
/// no recovery is attempted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    /// A plan or scalar construct outside the supported subset.
    #[error("unsupported construct at {position}: {construct}")]
    Unimplemented {
        construct: String,
        position: SourcePosition,
    },

    /// The plan is well-formed but violates a compiler invariant.
    #[error("translation error at {position}: {message}")]
    Translation {
        message: String,
        position: SourcePosition,
    },

    /// No common type exists for a binary operation.
    #[error("no common type for {left} and {right}")]
    UnsupportedPromotion { left: String, right: String },

    /// A declared output type disagrees with the computed type.
    #[error("type mismatch at {position}: expected {expected}, found {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
        position: SourcePosition,
    },
}

impl CompileError {
    pub fn unimplemented(construct: impl Display, position: SourcePosition) -> Self {
        Self::Unimplemented {
            construct: construct.to_string(),
            position,
        }
    }

    pub fn translation(message: impl Display, position: SourcePosition) -> Self {
        Self::Translation {
            message: message.to_string(),
            position,
        }
    }

    pub fn promotion(left: impl Display, right: impl Display) -> Self {
        Self::UnsupportedPromotion {
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    pub fn type_mismatch(
        expected: impl Display,
        actual: impl Display,
        position: SourcePosition,
    ) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
            position,
        }
    }
}
