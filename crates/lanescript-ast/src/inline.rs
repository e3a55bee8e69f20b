//! Inline function definitions.
//!
//! An inline function is a template subtree: an [`NodeKind::InlineFunction`]
//! node whose first child is a block of formal [`NodeKind::Parameter`]s and
//! whose remaining children are the body statements. Templates are stored
//! in the same arena as the script so inlining is a plain
//! [`Ast::deep_clone`].

use indexmap::IndexMap;

use crate::arena::Ast;
use crate::error::AstResult;
use crate::node::{Node, NodeId, NodeKind, Operand};

/// A registered inline function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineFunction {
    pub identifier: String,
    /// Formal parameter names, matched positionally to call arguments.
    pub parameters: Vec<String>,
    /// The [`NodeKind::InlineFunction`] template node.
    pub node: NodeId,
}

impl InlineFunction {
    /// Body statements of the template (everything after the parameter block).
    pub fn body<'a>(&self, ast: &'a Ast) -> &'a [NodeId] {
        let children = ast.children(self.node);
        match children.first() {
            Some(&first) if ast.kind(first) == NodeKind::Block => &children[1..],
            _ => children,
        }
    }

    /// Read an [`NodeKind::InlineFunction`] node back into a definition.
    pub fn from_node(ast: &Ast, node: NodeId) -> Option<Self> {
        let template = ast.node(node);
        if template.kind != NodeKind::InlineFunction {
            return None;
        }
        let parameters = match template.children().first() {
            Some(&block) if ast.kind(block) == NodeKind::Block => ast
                .children(block)
                .iter()
                .map(|&p| ast.node(p).identifier.clone())
                .collect(),
            _ => Vec::new(),
        };
        Some(Self {
            identifier: template.identifier.clone(),
            parameters,
            node,
        })
    }
}

/// Inline definitions keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct InlineFunctions {
    definitions: IndexMap<String, InlineFunction>,
}

impl InlineFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a detached template in `ast` and register it.
    ///
    /// `body` must be detached statement nodes; they become the template's
    /// body in order.
    pub fn define(
        &mut self,
        ast: &mut Ast,
        identifier: &str,
        parameters: &[&str],
        body: &[NodeId],
    ) -> AstResult<NodeId> {
        let template = ast.alloc(Node::new(NodeKind::InlineFunction).named(identifier));
        let block = ast.add(template, Node::new(NodeKind::Block))?;
        for &name in parameters {
            ast.add(block, Node::new(NodeKind::Parameter(Operand::Unbound)).named(name))?;
        }
        ast.insert_children(template, 1, body)?;
        self.register(InlineFunction {
            identifier: identifier.to_string(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            node: template,
        });
        Ok(template)
    }

    /// Register an existing definition, replacing one with the same name.
    pub fn register(&mut self, function: InlineFunction) {
        self.definitions
            .insert(function.identifier.clone(), function);
    }

    /// Register every [`NodeKind::InlineFunction`] node found under `root`.
    pub fn collect_from(&mut self, ast: &Ast, root: NodeId) -> usize {
        let mut found = 0;
        for id in ast.descendants(root) {
            if let Some(function) = InlineFunction::from_node(ast, id) {
                self.register(function);
                found += 1;
            }
        }
        found
    }

    pub fn get(&self, identifier: &str) -> Option<&InlineFunction> {
        self.definitions.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
