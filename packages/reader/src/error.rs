use promodel_common::DiagnosticKind;
use promodel_parser::ParseError;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type ReadResult<T> = Result<T, ReadError>;

/// Why an evaluation stopped early
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("syntax error in {}: {error}", path.display())]
    Syntax { path: PathBuf, error: ParseError },

    #[error("recursive include of {}", path.display())]
    IncludeCycle { path: PathBuf },

    #[error("cannot decide condition `{condition}` in {}", path.display())]
    UnresolvedCondition { path: PathBuf, condition: String },

    #[error("{}: {message}", path.display())]
    ProjectAbort { path: PathBuf, message: String },

    #[error("evaluation aborted")]
    Aborted,
}

impl ReadError {
    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }

    pub fn syntax(path: impl Into<PathBuf>, error: ParseError) -> Self {
        Self::Syntax {
            path: path.into(),
            error,
        }
    }

    pub fn include_cycle(path: impl Into<PathBuf>) -> Self {
        Self::IncludeCycle { path: path.into() }
    }

    pub fn unresolved(path: impl Into<PathBuf>, condition: impl Into<String>) -> Self {
        Self::UnresolvedCondition {
            path: path.into(),
            condition: condition.into(),
        }
    }

    pub fn project_abort(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ProjectAbort {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Diagnostic category this error reports as. Abortion is not an
    /// error condition and maps to nothing.
    pub fn diagnostic_kind(&self) -> Option<DiagnosticKind> {
        match self {
            Self::Unreadable { .. } => Some(DiagnosticKind::Unreadable),
            Self::Syntax { .. } | Self::IncludeCycle { .. } => Some(DiagnosticKind::SyntaxOrCycle),
            Self::UnresolvedCondition { .. } => Some(DiagnosticKind::UnresolvedConditional),
            Self::ProjectAbort { .. } => Some(DiagnosticKind::ProjectMessage),
            Self::Aborted => None,
        }
    }

    /// File the error is anchored to, when it has one
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Unreadable { path, .. }
            | Self::Syntax { path, .. }
            | Self::IncludeCycle { path }
            | Self::UnresolvedCondition { path, .. }
            | Self::ProjectAbort { path, .. } => Some(path),
            Self::Aborted => None,
        }
    }
}
