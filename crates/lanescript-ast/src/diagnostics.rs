//! Compile-time diagnostics.
//!
//! Every stage reports failures through a [`Diagnostics`] collector instead
//! of aborting: a node-local failure is recorded and the stage carries on
//! with the rest of the tree. The collector mirrors each entry to `tracing`
//! so the host decides where messages end up by installing a subscriber.
//!
//! # Error Codes
//!
//! Codes are grouped by the taxonomy of the pipeline:
//!
//! - `1xx` structural AST errors
//! - `2xx` resolution errors
//! - `3xx` fold errors from the sequence optimizer
//! - `4xx` IR consistency and emission

use std::fmt;

use serde::Serialize;

use crate::node::NodeId;

/// Numeric diagnostic code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u16)]
pub enum ErrorCode {
    // Structural
    MalformedSwitch = 100,
    MalformedFor = 101,
    MalformedInline = 102,
    MalformedIndexer = 103,
    MissingParent = 104,
    TreeInvariant = 105,

    // Resolution
    UnknownInlineFunction = 200,
    UnresolvedFunction = 201,
    InlineRecursion = 202,

    // Folding
    ParameterMismatch = 300,
    OperatorMismatch = 301,
    UnsupportedFold = 302,

    // IR
    LabelOrphanAvoided = 400,
    NotLowered = 401,
    TooManyVariables = 402,
}

impl ErrorCode {
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:03}", self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

/// One reported problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorCode,
    /// Node the problem is scoped to, when there is one.
    pub node: Option<NodeId>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match self.node {
            Some(node) => write!(f, "{level}[{}] at {node}: {}", self.code, self.message),
            None => write!(f, "{level}[{}]: {}", self.code, self.message),
        }
    }
}

/// Ordered diagnostic collector for one compilation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_error(&mut self, node: Option<NodeId>, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(%code, node = ?node, "{message}");
        self.entries.push(Diagnostic {
            severity: Severity::Error,
            code,
            node,
            message,
        });
    }

    pub fn log_warning(&mut self, node: Option<NodeId>, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%code, node = ?node, "{message}");
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            code,
            node,
            message,
        });
    }

    /// Append entries produced elsewhere (e.g. by an IR pass) without
    /// logging them a second time.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = Diagnostic>) {
        self.entries.extend(entries);
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_count_ignores_warnings() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.log_warning(None, ErrorCode::LabelOrphanAvoided, "kept as nop");
        assert!(!diagnostics.has_errors());
        diagnostics.log_error(Some(NodeId::new(3)), ErrorCode::MalformedFor, "3 children");
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_display_includes_code_and_node() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.log_error(Some(NodeId::new(7)), ErrorCode::MalformedSwitch, "no cases");
        let rendered = diagnostics.iter().next().unwrap().to_string();
        assert_eq!(rendered, "error[E100] at #7: no cases");
    }
}
