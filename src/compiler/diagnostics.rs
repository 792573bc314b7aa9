//! Compile-time diagnostics.
//!
//! Data-quality problems never abort a build. They are collected here and
//! handed back with the compiled registry, and each one is also logged.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// An operation was left out of the registry.
    SkippedOperation,
    /// A `$ref` pointed outside the document or at nothing.
    UnresolvedReference,
    /// A path item, parameter or request body could not be read.
    MalformedEntry,
    /// More than one server was declared; the first one is used.
    MultipleServers,
    /// A security scheme the dispatcher cannot apply.
    UnsupportedSecurityScheme,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Where in the document the problem was found, e.g. `GET /pets/{id}`.
    pub location: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Sink passed through the compiler call chain.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(
        &mut self,
        kind: DiagnosticKind,
        location: impl Into<String>,
        message: impl Into<String>,
    ) {
        let diagnostic = Diagnostic {
            kind,
            location: location.into(),
            message: message.into(),
        };
        log::warn!("{diagnostic}");
        self.entries.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
