//! Expression node types.
//!
//! Every node of a script lives in the [`Ast`](crate::Ast) arena and is
//! addressed by a [`NodeId`]. The node kind is a closed sum type: each stage
//! of the pipeline matches it exhaustively, so adding a kind is a
//! compile-time obligation everywhere a tree is walked.
//!
//! # Expression Sequences
//!
//! Expressions are stored flat, as the children of an assignment, condition,
//! compound or return node:
//!
//! ```text
//! [unary-op?] operand (operator operand)*
//! ```
//!
//! and evaluate strictly left to right. Grouping is expressed with
//! [`NodeKind::Compound`] operands.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::functions::Builtin;
use crate::variables::VariableId;

/// Stable index of a node inside an [`Ast`](crate::Ast) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Operator tokens appearing inside flat expression sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equals,
    NotEquals,
    Greater,
    GreaterEquals,
    Smaller,
    SmallerEquals,
    And,
    Or,
    Xor,
    Not,
}

impl Operator {
    /// Symbol used when rendering trees.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Equals => "==",
            Operator::NotEquals => "!=",
            Operator::Greater => ">",
            Operator::GreaterEquals => ">=",
            Operator::Smaller => "<",
            Operator::SmallerEquals => "<=",
            Operator::And => "&",
            Operator::Or => "|",
            Operator::Xor => "^",
            Operator::Not => "!",
        }
    }

    /// Whether the operator may lead a sequence as a unary prefix.
    pub fn is_unary_prefix(self) -> bool {
        matches!(self, Operator::Subtract | Operator::Not)
    }
}

/// Leaf operand carried by a [`NodeKind::Parameter`] node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// Reference into the script's variable table.
    Variable(VariableId),
    /// Literal scalar, broadcast to the node's vector width.
    Constant(f32),
    /// Identifier not bound yet (formal parameters inside inline bodies).
    Unbound,
}

/// Target of a [`NodeKind::Call`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Callee {
    /// Function resolved through the host's function registry.
    Builtin(Builtin),
    /// Inline function, looked up by the node identifier.
    Inline,
}

/// Single vector component addressed by a swizzle accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    X,
    Y,
    Z,
    W,
}

impl Component {
    /// Classify a single-component accessor (`x/y/z/w` or `r/g/b/a`).
    pub fn from_accessor(accessor: &str) -> Option<Self> {
        match accessor {
            "x" | "r" => Some(Component::X),
            "y" | "g" => Some(Component::Y),
            "z" | "b" => Some(Component::Z),
            "w" | "a" => Some(Component::W),
            _ => None,
        }
    }

    /// Zero-based component offset.
    pub fn offset(self) -> usize {
        match self {
            Component::X => 0,
            Component::Y => 1,
            Component::Z => 2,
            Component::W => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Component::X => "x",
            Component::Y => "y",
            Component::Z => "z",
            Component::W => "w",
        }
    }
}

/// Node kind. Closed on purpose: every stage matches it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Script root; children are top-level statements.
    Root,
    /// Statement list (`{ ... }`), used for loop bodies.
    Block,
    /// Parenthesized expression sequence.
    Compound,
    /// `identifier = <children>`.
    Assignment,
    /// Operator token inside an expression sequence.
    Operation(Operator),
    /// Leaf operand; `identifier` names the variable or formal parameter.
    Parameter(Operand),
    /// Function call; children are the arguments.
    Call(Callee),
    /// Inline function template: `[Block(parameters), statements...]`.
    InlineFunction,
    /// `return <children>` inside an inline function body.
    Return,
    /// `[Condition, Then, Else?]`.
    IfThenElse,
    /// Condition expression sequence.
    Condition,
    /// Statements executed when the condition holds.
    Then,
    /// Statements executed otherwise.
    Else,
    /// `[Condition, Block]`.
    While,
    /// `[initializer, Condition, iterator, Block]`.
    For,
    /// `[Condition, Case*, Default?]`.
    Switch,
    /// `[Condition(value), statements...]`.
    Case,
    /// Statements executed when no case matched.
    Default,
    /// Unclassified accessor; `identifier` holds the accessor text.
    Index,
    /// Classified single-component write accessor.
    IndexWrite(Component),
    /// Jump target; `identifier` holds the label name.
    Label,
    /// Unconditional jump to the label named by `identifier`.
    Jump,
}

impl NodeKind {
    /// Whether the node's children are statements rather than an expression.
    pub fn is_statement_list(self) -> bool {
        matches!(
            self,
            NodeKind::Root
                | NodeKind::Block
                | NodeKind::Then
                | NodeKind::Else
                | NodeKind::Case
                | NodeKind::Default
                | NodeKind::InlineFunction
        )
    }

    /// Whether the node can stand as an operand inside an expression sequence.
    pub fn is_operand(self) -> bool {
        matches!(
            self,
            NodeKind::Parameter(_) | NodeKind::Compound | NodeKind::Call(_)
        )
    }

    /// Short lowercase name used in diagnostics and tree dumps.
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Block => "block",
            NodeKind::Compound => "compound",
            NodeKind::Assignment => "assignment",
            NodeKind::Operation(_) => "operation",
            NodeKind::Parameter(_) => "parameter",
            NodeKind::Call(_) => "call",
            NodeKind::InlineFunction => "inline_function",
            NodeKind::Return => "return",
            NodeKind::IfThenElse => "if_then_else",
            NodeKind::Condition => "condition",
            NodeKind::Then => "then",
            NodeKind::Else => "else",
            NodeKind::While => "while",
            NodeKind::For => "for",
            NodeKind::Switch => "switch",
            NodeKind::Case => "case",
            NodeKind::Default => "default",
            NodeKind::Index => "index",
            NodeKind::IndexWrite(_) => "index_write",
            NodeKind::Label => "label",
            NodeKind::Jump => "jump",
        }
    }
}

/// Which list of its parent a node is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Child,
    Indexer,
    Dependency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ParentLink {
    pub(crate) parent: NodeId,
    pub(crate) slot: Slot,
}

/// A node of the expression tree.
///
/// Payload fields are public. The structural lists and the parent link are
/// only reachable through [`Ast`](crate::Ast) surgery methods, which keep
/// both directions consistent.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub identifier: String,
    pub vector_size: u8,
    pub is_vector: bool,
    pub(crate) children: Vec<NodeId>,
    pub(crate) indexers: Vec<NodeId>,
    pub(crate) depends_on: Vec<NodeId>,
    pub(crate) parent: Option<ParentLink>,
}

impl Node {
    /// Create a detached scalar node.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            identifier: String::new(),
            vector_size: 1,
            is_vector: false,
            children: Vec::new(),
            indexers: Vec::new(),
            depends_on: Vec::new(),
            parent: None,
        }
    }

    /// Builder-style identifier setter.
    pub fn named(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Builder-style vector width setter.
    pub fn with_vector_size(mut self, vector_size: u8) -> Self {
        self.vector_size = vector_size.max(1);
        self.is_vector = vector_size > 1;
        self
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn indexers(&self) -> &[NodeId] {
        &self.indexers
    }

    pub fn depends_on(&self) -> &[NodeId] {
        &self.depends_on
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent.map(|link| link.parent)
    }

    /// The list of the parent this node is stored in.
    pub fn slot(&self) -> Option<Slot> {
        self.parent.map(|link| link.slot)
    }

    /// Whether this is a scalar operand or expression (width 1, not vector).
    pub fn is_scalar(&self) -> bool {
        self.vector_size <= 1 && !self.is_vector
    }

    /// Operator token, when this is an operation node.
    pub fn operator(&self) -> Option<Operator> {
        match self.kind {
            NodeKind::Operation(op) => Some(op),
            _ => None,
        }
    }
}
