//! Tree surgery errors.
//!
//! These are invariant violations, not user errors: a transform that hits
//! one has a logic bug. Stages surface them as node-scoped diagnostics.

use thiserror::Error;

use crate::node::NodeId;

/// Result alias for arena operations.
pub type AstResult<T> = std::result::Result<T, AstError>;

/// Errors raised by [`Ast`](crate::Ast) surgery methods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AstError {
    /// The node already has a parent and must be detached first.
    #[error("node {0} is already attached")]
    NotDetached(NodeId),

    /// The operation needs a parent but the node has none.
    #[error("node {0} has no parent")]
    NotAttached(NodeId),

    /// The root node cannot be placed under another node.
    #[error("the root node cannot be attached")]
    RootAttach,

    /// Attaching `child` under `parent` would make a node its own ancestor.
    #[error("attaching {child} under {parent} creates a cycle")]
    Cycle {
        /// Intended parent.
        parent: NodeId,
        /// Node being attached.
        child: NodeId,
    },

    /// Insertion or removal index past the end of a node list.
    #[error("index {index} out of range for node {node} with {len} entries")]
    IndexOutOfRange {
        /// Owner of the list.
        node: NodeId,
        /// Requested index.
        index: usize,
        /// Current list length.
        len: usize,
    },

    /// A child's parent link does not point at the node that owns it.
    #[error("node {node} has a stale parent link")]
    StaleParent {
        /// The child with the inconsistent link.
        node: NodeId,
    },
}
