//! S-expression dump of a subtree, used in tests and trace output.
//!
//! Operands render bare (`a`, `2`, `?p` for an unbound formal), operators
//! as their symbol, indexers as a suffix (`[xy]` unclassified, `.x`
//! classified write). Every other node renders as
//! `(kind identifier ^(dependencies) children...)`.

use std::fmt::Write;

use crate::arena::Ast;
use crate::node::{Callee, NodeId, NodeKind, Operand};

impl Ast {
    pub fn render(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.render_into(id, &mut out);
        out
    }

    fn render_into(&self, id: NodeId, out: &mut String) {
        let node = self.node(id);
        match node.kind {
            NodeKind::Parameter(operand) => {
                match operand {
                    Operand::Variable(_) => out.push_str(&node.identifier),
                    Operand::Constant(value) => {
                        let _ = write!(out, "{value}");
                    }
                    Operand::Unbound => {
                        let _ = write!(out, "?{}", node.identifier);
                    }
                }
                self.render_indexers(id, out);
                return;
            }
            NodeKind::Operation(op) => {
                out.push_str(op.symbol());
                return;
            }
            NodeKind::Index => {
                let _ = write!(out, "[{}]", node.identifier);
                return;
            }
            NodeKind::IndexWrite(component) => {
                let _ = write!(out, ".{}", component.name());
                return;
            }
            _ => {}
        }

        out.push('(');
        match node.kind {
            NodeKind::Call(Callee::Builtin(builtin)) => {
                let _ = write!(out, "call {}", builtin.name());
            }
            NodeKind::Call(Callee::Inline) => {
                let _ = write!(out, "inline {}", node.identifier);
            }
            kind => {
                out.push_str(kind.name());
                if !node.identifier.is_empty() {
                    out.push(' ');
                    out.push_str(&node.identifier);
                }
            }
        }
        self.render_indexers(id, out);

        if !node.depends_on().is_empty() {
            out.push_str(" ^(");
            for (i, &dep) in node.depends_on().iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                self.render_into(dep, out);
            }
            out.push(')');
        }
        for &child in node.children() {
            out.push(' ');
            self.render_into(child, out);
        }
        out.push(')');
    }

    fn render_indexers(&self, id: NodeId, out: &mut String) {
        for &indexer in self.node(id).indexers() {
            self.render_into(indexer, out);
        }
    }
}
