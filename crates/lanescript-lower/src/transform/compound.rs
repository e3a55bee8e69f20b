//! Compound merging: `((expr))` → `(expr)`.

use lanescript_ast::{NodeId, NodeKind};

use super::{Lowering, Rewrite, RewriteResult};

/// Replace a compound whose only child is a compound by that child.
///
/// The outer node's dependencies run first, so they are prepended to the
/// inner node's list. The inner node is revisited, which repeats the merge
/// for deeper nesting.
pub(super) fn merge(cx: &mut Lowering<'_>, outer: NodeId) -> RewriteResult {
    let inner = match cx.ast.children(outer) {
        [only] if cx.ast.kind(*only) == NodeKind::Compound => *only,
        _ => return Ok(Rewrite::Descend),
    };

    let dependencies = cx.ast.take_dependencies(outer);
    let indexers = cx.ast.take_indexers(outer);
    cx.ast.take_children(outer);
    cx.ast.prepend_dependencies(inner, &dependencies)?;
    for indexer in indexers {
        cx.ast.push_indexer(inner, indexer)?;
    }
    cx.ast.replace(outer, inner)?;
    Ok(Rewrite::Revisit(vec![inner]))
}
