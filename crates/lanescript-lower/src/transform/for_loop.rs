//! For-loop lowering.
//!
//! `for (init; cond; iter) body` is rewritten in place into
//! `while (cond) { body; iter }` with `init` as a dependency of the while,
//! so it runs once before the loop.

use lanescript_ast::{ErrorCode, Node, NodeId, NodeKind};

use super::{Failure, Lowering, Rewrite, RewriteResult};

pub(super) fn lower(cx: &mut Lowering<'_>, node: NodeId) -> RewriteResult {
    let count = cx.ast.children(node).len();
    if count != 4 {
        return Err(Failure::new(
            ErrorCode::MalformedFor,
            format!("for needs 4 children (init, condition, iterator, body), found {count}"),
        ));
    }

    let children = cx.ast.take_children(node);
    let (init, condition, iterator, body) = (children[0], children[1], children[2], children[3]);

    let condition = if cx.ast.kind(condition) == NodeKind::Condition {
        condition
    } else {
        let wrapper = cx.ast.alloc(Node::new(NodeKind::Condition));
        cx.ast.push_child(wrapper, condition)?;
        wrapper
    };
    let body = if cx.ast.kind(body) == NodeKind::Block {
        body
    } else {
        let block = cx.ast.alloc(Node::new(NodeKind::Block));
        cx.ast.push_child(block, body)?;
        block
    };
    cx.ast.push_child(body, iterator)?;

    cx.ast.node_mut(node).kind = NodeKind::While;
    cx.ast.push_dependency(node, init)?;
    cx.ast.insert_children(node, 0, &[condition, body])?;
    Ok(Rewrite::Descend)
}
