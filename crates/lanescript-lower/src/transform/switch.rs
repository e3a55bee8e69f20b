//! Switch lowering.
//!
//! ```text
//! switch (c) { case 1: A; case 2: B; default: D; }
//! ```
//!
//! becomes, at the switch's position:
//!
//! ```text
//! if (c == 1) { A; jump end; }
//! if (c == 2) { B; jump end; }
//! D;
//! end:
//! ```
//!
//! The final case skips its jump when there is no default, since the end
//! label follows it directly.

use lanescript_ast::{ErrorCode, Node, NodeId, NodeKind, Operator};

use super::{Failure, Lowering, Rewrite, RewriteResult};

pub(super) fn lower(cx: &mut Lowering<'_>, switch: NodeId) -> RewriteResult {
    cx.statement_parent(switch)?;

    let children = cx.ast.children(switch).to_vec();
    let condition = match children.first() {
        Some(&first) if cx.ast.kind(first) == NodeKind::Condition => first,
        _ => {
            return Err(Failure::new(
                ErrorCode::MalformedSwitch,
                "switch has no condition",
            ))
        }
    };
    if cx.ast.children(condition).is_empty() {
        return Err(Failure::new(
            ErrorCode::MalformedSwitch,
            "switch condition is empty",
        ));
    }

    let mut cases = Vec::new();
    let mut default = None;
    for &child in &children[1..] {
        match cx.ast.kind(child) {
            NodeKind::Case => {
                match cx.ast.children(child).first() {
                    Some(&value) if cx.ast.kind(value) == NodeKind::Condition => {}
                    _ => {
                        return Err(Failure::new(
                            ErrorCode::MalformedSwitch,
                            format!("case {child} has no value"),
                        ))
                    }
                }
                cases.push(child);
            }
            NodeKind::Default if default.is_none() => default = Some(child),
            NodeKind::Default => {
                return Err(Failure::new(
                    ErrorCode::MalformedSwitch,
                    "switch has more than one default",
                ))
            }
            other => {
                return Err(Failure::new(
                    ErrorCode::MalformedSwitch,
                    format!("unexpected {} inside switch", other.name()),
                ))
            }
        }
    }
    if cases.is_empty() && default.is_none() {
        return Err(Failure::new(
            ErrorCode::MalformedSwitch,
            "switch has neither a case nor a default",
        ));
    }

    let end_label = format!("switch_{}_end", switch.index());
    let mut lowered = cx.ast.take_dependencies(switch);

    for (i, &case) in cases.iter().enumerate() {
        let is_last = i + 1 == cases.len();
        let mut body = cx.ast.take_children(case);
        let value = body.remove(0);

        let branch = cx.ast.alloc(Node::new(NodeKind::IfThenElse));
        let test = cx.ast.add(branch, Node::new(NodeKind::Condition))?;
        let lhs = operand_of(cx, condition, true)?;
        let equals = cx
            .ast
            .alloc(Node::new(NodeKind::Operation(Operator::Equals)));
        let rhs = operand_of(cx, value, false)?;
        cx.ast.insert_children(test, 0, &[lhs, equals, rhs])?;

        let then = cx.ast.add(branch, Node::new(NodeKind::Then))?;
        cx.ast.insert_children(then, 0, &body)?;
        if !(is_last && default.is_none()) {
            cx.ast
                .add(then, Node::new(NodeKind::Jump).named(end_label.as_str()))?;
        }
        lowered.push(branch);
    }

    if let Some(default) = default {
        lowered.extend(cx.ast.take_children(default));
    }
    lowered.push(cx.ast.alloc(Node::new(NodeKind::Label).named(end_label)));

    tracing::trace!(node = %switch, cases = cases.len(), "lowered switch");
    cx.ast.replace_with_many(switch, &lowered)?;
    Ok(Rewrite::Revisit(lowered))
}

/// One operand node for the expression held by `sequence`.
///
/// A single operand is used as is; anything longer is wrapped in a
/// compound. The switch condition is cloned since every branch compares
/// against it, case values are moved.
fn operand_of(
    cx: &mut Lowering<'_>,
    sequence: NodeId,
    clone: bool,
) -> std::result::Result<NodeId, Failure> {
    let items = cx.ast.children(sequence).to_vec();
    let items: Vec<NodeId> = if clone {
        items.iter().map(|&item| cx.ast.deep_clone(item)).collect()
    } else {
        cx.ast.take_children(sequence)
    };
    match items.as_slice() {
        [] => Err(Failure::new(ErrorCode::MalformedSwitch, "case value is empty")),
        [single] if cx.ast.kind(*single).is_operand() => Ok(*single),
        _ => {
            let width = items
                .iter()
                .map(|&item| cx.ast.node(item).vector_size)
                .max()
                .unwrap_or(1);
            let compound = cx
                .ast
                .alloc(Node::new(NodeKind::Compound).with_vector_size(width));
            cx.ast.insert_children(compound, 0, &items)?;
            Ok(compound)
        }
    }
}
