//! Swizzle indexer classification.
//!
//! Only single-component accessors are supported. A write target keeps a
//! single [`NodeKind::IndexWrite`] indexer; a read target is wrapped in a
//! call to the matching index-read builtin.

use lanescript_ast::{Builtin, Callee, Component, ErrorCode, Node, NodeId, NodeKind};

use super::{Failure, Lowering, Rewrite, RewriteResult};

pub(super) fn classify(cx: &mut Lowering<'_>, id: NodeId) -> RewriteResult {
    let indexers = cx.ast.node(id).indexers().to_vec();
    let [accessor] = indexers.as_slice() else {
        return Err(Failure::new(
            ErrorCode::MalformedIndexer,
            format!("chained accessors are not supported ({} found)", indexers.len()),
        ));
    };
    let text = cx.ast.node(*accessor).identifier.clone();
    let component = Component::from_accessor(&text).ok_or_else(|| {
        Failure::new(
            ErrorCode::MalformedIndexer,
            format!("unsupported accessor `{text}`"),
        )
    })?;

    let kind = cx.ast.kind(id);
    match kind {
        NodeKind::Assignment => {
            cx.ast.take_indexers(id);
            let write = cx.ast.alloc(Node::new(NodeKind::IndexWrite(component)));
            cx.ast.push_indexer(id, write)?;
            Ok(Rewrite::Descend)
        }
        kind if kind.is_operand() => {
            let builtin = Builtin::index_read(component);
            let info = cx.resolver.resolve(builtin).ok_or_else(|| {
                Failure::new(
                    ErrorCode::UnresolvedFunction,
                    format!("index read for `{}` is not registered", component.name()),
                )
            })?;
            let call = Node::new(NodeKind::Call(Callee::Builtin(builtin)))
                .named(info.name.as_str())
                .with_vector_size(info.return_vector_size);
            let call = cx.ast.alloc(call);

            cx.ast.take_indexers(id);
            cx.ast.replace(id, call)?;
            cx.ast.push_child(call, id)?;
            match kind {
                NodeKind::Parameter(_) => Ok(Rewrite::Skip),
                _ => Ok(Rewrite::Revisit(vec![id])),
            }
        }
        other => Err(Failure::new(
            ErrorCode::MalformedIndexer,
            format!("accessor on a {} node", other.name()),
        )),
    }
}
