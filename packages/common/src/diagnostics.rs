use serde::Serialize;
use std::path::PathBuf;

/// Category of a problem found while reading a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticKind {
    /// A project file could not be opened or decoded
    Unreadable,
    /// A syntax error or a recursive include chain
    SyntaxOrCycle,
    /// A conditional that cannot be decided from the current configuration
    UnresolvedConditional,
    /// The compilers named by the project differ from the configured ones
    ToolchainMismatch,
    /// Output of a message() or warning() call in a project file
    ProjectMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single problem report attached to an evaluation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    /// File the problem was found in, when known
    pub file: Option<PathBuf>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            file: None,
            message: message.into(),
        }
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            file: None,
            message: message.into(),
        }
    }

    pub fn info(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Info,
            file: None,
            message: message.into(),
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}: {}", file.display(), self.message),
            None => write!(f, "{}", self.message),
        }
    }
}
