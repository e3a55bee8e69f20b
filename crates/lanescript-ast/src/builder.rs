//! Declarative script description.
//!
//! Parsing is not part of this workspace. Hosts and tests describe a script
//! tree as data ([`ScriptSpec`], usually loaded from JSON) and the builder
//! turns it into an arena tree plus its variable and inline-function
//! tables.
//!
//! ```json
//! {
//!   "variables": [{ "name": "v", "vector_size": 4 }],
//!   "statements": [
//!     { "kind": "assignment", "identifier": "a", "children": [
//!         { "kind": "variable", "identifier": "b" },
//!         { "kind": "operation", "op": "add" },
//!         { "kind": "constant", "value": 2.0 }
//!     ]}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::arena::Ast;
use crate::error::AstError;
use crate::functions::Builtin;
use crate::node::{Callee, Node, NodeId, NodeKind, Operand, Operator};
use crate::variables::Variables;

/// Errors turning a description into a tree.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The text is not a valid script description.
    #[error("invalid script description: {0}")]
    Json(#[from] serde_json::Error),

    /// A node kind is missing a field it cannot do without.
    #[error("{kind} node requires `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    /// Tree surgery rejected the description.
    #[error(transparent)]
    Ast(#[from] AstError),
}

/// Node kinds as written in a description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecKind {
    Block,
    Compound,
    Assignment,
    Operation,
    Variable,
    Constant,
    Call,
    InlineCall,
    Return,
    If,
    Condition,
    Then,
    Else,
    While,
    For,
    Switch,
    Case,
    Default,
    Label,
    Jump,
}

impl SpecKind {
    fn name(self) -> &'static str {
        match self {
            SpecKind::Block => "block",
            SpecKind::Compound => "compound",
            SpecKind::Assignment => "assignment",
            SpecKind::Operation => "operation",
            SpecKind::Variable => "variable",
            SpecKind::Constant => "constant",
            SpecKind::Call => "call",
            SpecKind::InlineCall => "inline_call",
            SpecKind::Return => "return",
            SpecKind::If => "if",
            SpecKind::Condition => "condition",
            SpecKind::Then => "then",
            SpecKind::Else => "else",
            SpecKind::While => "while",
            SpecKind::For => "for",
            SpecKind::Switch => "switch",
            SpecKind::Case => "case",
            SpecKind::Default => "default",
            SpecKind::Label => "label",
            SpecKind::Jump => "jump",
        }
    }
}

/// One node of a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub kind: SpecKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<Operator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builtin: Option<Builtin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_size: Option<u8>,
    /// Accessor text per indexer, e.g. `["x"]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<NodeSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    #[serde(default = "default_vector_size")]
    pub vector_size: u8,
}

fn default_vector_size() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineFunctionSpec {
    pub identifier: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub body: Vec<NodeSpec>,
}

/// A whole script: declared variables, inline definitions, top-level
/// statements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptSpec {
    #[serde(default)]
    pub variables: Vec<VariableSpec>,
    #[serde(default)]
    pub inline_functions: Vec<InlineFunctionSpec>,
    #[serde(default)]
    pub statements: Vec<NodeSpec>,
}

/// Builds detached subtrees from [`NodeSpec`]s.
///
/// Variables are declared on first use. Inside an inline function body the
/// names in `formals` stay unbound so inlining can map them to arguments.
pub struct TreeBuilder<'a> {
    ast: &'a mut Ast,
    variables: &'a mut Variables,
    formals: &'a [String],
}

impl<'a> TreeBuilder<'a> {
    pub fn new(ast: &'a mut Ast, variables: &'a mut Variables) -> Self {
        Self {
            ast,
            variables,
            formals: &[],
        }
    }

    pub fn with_formals(mut self, formals: &'a [String]) -> Self {
        self.formals = formals;
        self
    }

    /// Build `spec` into a detached subtree.
    pub fn build(&mut self, spec: &NodeSpec) -> Result<NodeId, BuildError> {
        let node = self.node_for(spec)?;
        let id = self.ast.alloc(node);

        for dependency in &spec.depends_on {
            let dep = self.build(dependency)?;
            self.ast.push_dependency(id, dep)?;
        }
        for child in &spec.children {
            let child = self.build(child)?;
            self.ast.push_child(id, child)?;
        }
        for accessor in &spec.indexers {
            let index = self.ast.alloc(Node::new(NodeKind::Index).named(accessor.as_str()));
            self.ast.push_indexer(id, index)?;
        }

        // Grouping nodes take the widest operand they contain.
        if spec.vector_size.is_none() && matches!(spec.kind, SpecKind::Compound | SpecKind::Call) {
            let is_index_read = spec.builtin.is_some_and(|b| b.component().is_some());
            if !is_index_read {
                let width = self
                    .ast
                    .children(id)
                    .iter()
                    .filter(|&&c| self.ast.kind(c).is_operand())
                    .map(|&c| self.ast.node(c).vector_size)
                    .max()
                    .unwrap_or(1);
                let node = self.ast.node_mut(id);
                node.vector_size = width;
                node.is_vector = width > 1;
            }
        }
        Ok(id)
    }

    fn node_for(&mut self, spec: &NodeSpec) -> Result<Node, BuildError> {
        let missing = |field| BuildError::MissingField {
            kind: spec.kind.name(),
            field,
        };
        let named = |kind: NodeKind| Node::new(kind).named(spec.identifier.as_str());

        let node = match spec.kind {
            SpecKind::Block => named(NodeKind::Block),
            SpecKind::Compound => named(NodeKind::Compound),
            SpecKind::Assignment | SpecKind::Variable => {
                if spec.identifier.is_empty() {
                    return Err(missing("identifier"));
                }
                let (operand, width) = self.bind(spec);
                let kind = match spec.kind {
                    SpecKind::Assignment => NodeKind::Assignment,
                    _ => NodeKind::Parameter(operand),
                };
                named(kind).with_vector_size(width)
            }
            SpecKind::Operation => named(NodeKind::Operation(spec.op.ok_or_else(|| missing("op"))?)),
            SpecKind::Constant => {
                let value = spec.value.ok_or_else(|| missing("value"))?;
                Node::new(NodeKind::Parameter(Operand::Constant(value)))
                    .with_vector_size(spec.vector_size.unwrap_or(1))
            }
            SpecKind::Call => {
                let builtin = spec.builtin.ok_or_else(|| missing("builtin"))?;
                named(NodeKind::Call(Callee::Builtin(builtin)))
                    .with_vector_size(spec.vector_size.unwrap_or(1))
            }
            SpecKind::InlineCall => {
                if spec.identifier.is_empty() {
                    return Err(missing("identifier"));
                }
                named(NodeKind::Call(Callee::Inline)).with_vector_size(spec.vector_size.unwrap_or(1))
            }
            SpecKind::Return => named(NodeKind::Return),
            SpecKind::If => named(NodeKind::IfThenElse),
            SpecKind::Condition => named(NodeKind::Condition),
            SpecKind::Then => named(NodeKind::Then),
            SpecKind::Else => named(NodeKind::Else),
            SpecKind::While => named(NodeKind::While),
            SpecKind::For => named(NodeKind::For),
            SpecKind::Switch => named(NodeKind::Switch),
            SpecKind::Case => named(NodeKind::Case),
            SpecKind::Default => named(NodeKind::Default),
            SpecKind::Label | SpecKind::Jump => {
                if spec.identifier.is_empty() {
                    return Err(missing("identifier"));
                }
                named(if spec.kind == SpecKind::Label {
                    NodeKind::Label
                } else {
                    NodeKind::Jump
                })
            }
        };
        Ok(node)
    }

    /// Resolve a variable name to an operand and its width.
    fn bind(&mut self, spec: &NodeSpec) -> (Operand, u8) {
        if self.formals.iter().any(|f| *f == spec.identifier) {
            return (Operand::Unbound, spec.vector_size.unwrap_or(1));
        }
        let id = self
            .variables
            .declare(&spec.identifier, spec.vector_size.unwrap_or(1));
        let width = self
            .variables
            .get(id)
            .map(|v| v.vector_size)
            .unwrap_or(1);
        (Operand::Variable(id), spec.vector_size.unwrap_or(width))
    }
}
