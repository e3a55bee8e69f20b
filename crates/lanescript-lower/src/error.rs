//! Error types for the lowering stages.

use lanescript_ast::{AstError, NodeId};
use thiserror::Error;

/// Result alias for lowering stages.
pub type Result<T> = std::result::Result<T, LowerError>;

/// Stage-level failure.
///
/// Node-local problems are recorded as diagnostics while a stage runs; the
/// stage returns one of these once it has finished with the whole tree.
#[derive(Debug, Error)]
pub enum LowerError {
    /// One or more nodes failed; details are in the diagnostics.
    #[error("{stage} failed on {errors} node(s)")]
    StageFailed {
        /// Stage name (`transform`, `optimize`).
        stage: &'static str,
        /// Number of node-scoped errors recorded.
        errors: usize,
    },

    /// An option value is out of range.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Tree surgery failed outside any node-local rewrite.
    #[error(transparent)]
    Ast(#[from] AstError),
}

/// Errors raised by the reference evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// A node kind that lowering should have removed.
    #[error("node {node} ({kind}) is not lowered")]
    NotLowered {
        /// Offending node.
        node: NodeId,
        /// Its kind name.
        kind: &'static str,
    },

    /// A parameter or assignment names no variable.
    #[error("node {0} refers to an unknown variable")]
    UnknownVariable(NodeId),

    /// A jump names a label no enclosing statement list defines.
    #[error("jump to unknown label `{0}`")]
    UnresolvedLabel(String),

    /// An expression sequence is not `[unary?] operand (op operand)*`.
    #[error("node {0} holds a malformed expression sequence")]
    MalformedSequence(NodeId),

    /// Execution exceeded the step budget.
    #[error("evaluation exceeded {0} steps")]
    StepLimit(usize),
}
