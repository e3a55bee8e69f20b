//! Error types for instruction lists and emission.

use lanescript_ast::{ErrorCode, NodeId};
use thiserror::Error;

/// Instruction list consistency errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("index {index} out of range for {len} instruction(s)")]
    IndexOutOfRange { index: usize, len: usize },

    /// An operation that needs one flat sequence found unreduced segments.
    #[error("{0} segment(s) pending; reduce before this pass")]
    PendingSegments(usize),

    #[error("segment slot {0} was reserved but never filled")]
    UnfilledSegment(usize),

    #[error("segment slot {0} is already filled")]
    SegmentFilled(usize),

    #[error("segment slot {slot} does not exist ({len} reserved)")]
    NoSuchSegment { slot: usize, len: usize },
}

/// Errors raised while emitting a lowered tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmitError {
    /// A node kind the transform stage should have removed.
    #[error("{kind} at {node} is not lowered")]
    NotLowered { node: NodeId, kind: &'static str },

    #[error("{count} variables exceed the {max} addressable slots")]
    TooManyVariables { count: usize, max: usize },

    #[error("`{name}` at {node} is not in the variable table")]
    UnknownVariable { node: NodeId, name: String },

    #[error("malformed {kind} at {node}: {message}")]
    Malformed {
        node: NodeId,
        kind: &'static str,
        message: String,
    },

    #[error(transparent)]
    Ir(#[from] IrError),
}

impl EmitError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EmitError::NotLowered { .. } => ErrorCode::NotLowered,
            EmitError::TooManyVariables { .. } => ErrorCode::TooManyVariables,
            EmitError::UnknownVariable { .. } | EmitError::Malformed { .. } | EmitError::Ir(_) => {
                ErrorCode::TreeInvariant
            }
        }
    }

    /// Node the error is scoped to.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            EmitError::NotLowered { node, .. }
            | EmitError::UnknownVariable { node, .. }
            | EmitError::Malformed { node, .. } => Some(*node),
            EmitError::TooManyVariables { .. } | EmitError::Ir(_) => None,
        }
    }
}
