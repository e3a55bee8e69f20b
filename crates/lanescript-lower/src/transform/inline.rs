//! Inline function expansion.
//!
//! A call `f(a, b)` to an inline function is replaced by a copy of `f`'s
//! body with formals bound to the arguments:
//!
//! - The first `return` found in pre-order yields the call's value. Later
//!   statements of every scope containing it are dropped.
//! - Statements before the return (the prelude) are spliced in front of
//!   the statement that contains the call.
//! - A call used as a statement may have no return; its body is spliced
//!   in place of the call.
//!
//! Formal parameters resolve through the argument list. Literal and plain
//! variable arguments are copied into the formal's node (variables gain a
//! reference); any other argument is cloned in place. Assigning to a formal
//! retargets the assignment to the argument variable.

use lanescript_ast::{ErrorCode, Node, NodeId, NodeKind, Operand, Slot};
use tracing::debug;

use super::{Failure, Lowering, Rewrite, RewriteResult};

pub(super) fn expand(cx: &mut Lowering<'_>, call: NodeId) -> RewriteResult {
    cx.expansions += 1;
    if cx.expansions > cx.options.max_inline_expansions {
        return Err(Failure::new(
            ErrorCode::InlineRecursion,
            format!(
                "more than {} inline expansions; `{}` is probably recursive",
                cx.options.max_inline_expansions,
                cx.ast.node(call).identifier
            ),
        ));
    }

    let name = cx.ast.node(call).identifier.clone();
    let function = cx.inline_functions.get(&name).cloned().ok_or_else(|| {
        Failure::new(
            ErrorCode::UnknownInlineFunction,
            format!("inline function `{name}` not found"),
        )
    })?;
    let arguments = cx.ast.children(call).to_vec();
    if arguments.len() != function.parameters.len() {
        return Err(Failure::new(
            ErrorCode::ParameterMismatch,
            format!(
                "`{name}` takes {} argument(s), {} given",
                function.parameters.len(),
                arguments.len()
            ),
        ));
    }

    let is_statement = cx
        .ast
        .parent(call)
        .is_some_and(|p| cx.ast.kind(p).is_statement_list());
    let statement = cx.enclosing_statement(call).ok_or_else(|| {
        Failure::new(
            ErrorCode::MissingParent,
            format!("call to `{name}` is not inside a statement"),
        )
    })?;

    let template = function.body(cx.ast).to_vec();
    let mut body: Vec<NodeId> = template.iter().map(|&s| cx.ast.deep_clone(s)).collect();
    let returned = first_return(cx, &body);

    let (prelude, value) = match returned {
        Some((index, ret)) => {
            truncate_after(cx, body[index], ret)?;
            body.truncate(index + 1);
            if body[index] == ret {
                body.pop();
            }
            (body, Some(take_value(cx, ret)?))
        }
        None if is_statement => (body, None),
        None => {
            return Err(Failure::new(
                ErrorCode::MalformedInline,
                format!("`{name}` has no return but its call is used as a value"),
            ))
        }
    };

    let mut roots = prelude.clone();
    roots.extend(value);
    bind_formals(cx, &mut roots, &function.parameters, &arguments)?;
    // The returned value may itself have been a formal.
    let value = value.and(roots.last().copied());

    let mut dependencies = cx.ast.take_dependencies(call);
    dependencies.extend(prelude);
    let prelude = dependencies;

    if !prelude.is_empty() && !is_statement && in_loop_condition(cx, call, statement) {
        return Err(Failure::new(
            ErrorCode::MalformedInline,
            format!("`{name}` needs statements and cannot be expanded inside a loop condition"),
        ));
    }

    let revisit = if is_statement {
        // A statement call discards its value.
        cx.ast.replace_with_many(call, &prelude)?;
        prelude
    } else {
        let value = value.ok_or_else(|| {
            Failure::new(ErrorCode::MalformedInline, format!("`{name}` returns nothing"))
        })?;
        for indexer in cx.ast.take_indexers(call) {
            cx.ast.push_indexer(value, indexer)?;
        }
        cx.ast.replace(call, value)?;

        let parent = cx.ast.parent(statement).ok_or_else(|| {
            Failure::new(ErrorCode::MissingParent, "enclosing statement lost its parent")
        })?;
        let position = cx.ast.position(statement).unwrap_or(0);
        cx.ast.insert_children(parent, position, &prelude)?;
        let mut revisit = prelude;
        revisit.push(statement);
        revisit
    };

    debug!(function = %name, node = %call, spliced = revisit.len(), "inlined");
    Ok(Rewrite::Revisit(revisit))
}

/// First `return` in pre-order across the cloned body, with the index of
/// the top-level statement containing it.
fn first_return(cx: &Lowering<'_>, body: &[NodeId]) -> Option<(usize, NodeId)> {
    body.iter().enumerate().find_map(|(index, &statement)| {
        cx.ast
            .descendants(statement)
            .into_iter()
            .find(|&n| cx.ast.kind(n) == NodeKind::Return)
            .map(|ret| (index, ret))
    })
}

/// Drop everything after `ret` in every statement list between `ret` and
/// `top`, then detach `ret` itself.
fn truncate_after(cx: &mut Lowering<'_>, top: NodeId, ret: NodeId) -> Result<(), Failure> {
    if top == ret {
        return Ok(());
    }
    let mut cursor = ret;
    while cursor != top {
        let Some(parent) = cx.ast.parent(cursor) else {
            break;
        };
        if cx.ast.kind(parent).is_statement_list() && cx.ast.node(cursor).slot() == Some(Slot::Child) {
            let position = cx.ast.position(cursor).unwrap_or(0);
            let len = cx.ast.children(parent).len();
            cx.ast.replace_range(parent, position + 1..len, &[])?;
        }
        cursor = parent;
    }
    cx.ast.detach(ret)?;
    Ok(())
}

/// The return's expression as one operand node.
fn take_value(cx: &mut Lowering<'_>, ret: NodeId) -> Result<NodeId, Failure> {
    let items = cx.ast.take_children(ret);
    match items.as_slice() {
        [] => Err(Failure::new(ErrorCode::MalformedInline, "return without a value")),
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

/// Resolve formal parameters under `roots` to the call's arguments.
///
/// A root that is itself a formal is replaced in `roots` by its binding.
fn bind_formals(
    cx: &mut Lowering<'_>,
    roots: &mut [NodeId],
    formals: &[String],
    arguments: &[NodeId],
) -> Result<(), Failure> {
    let nodes: Vec<NodeId> = roots
        .iter()
        .flat_map(|&root| cx.ast.descendants(root))
        .collect();

    for node in nodes {
        let kind = cx.ast.kind(node);
        if !matches!(kind, NodeKind::Parameter(Operand::Unbound) | NodeKind::Assignment) {
            continue;
        }
        let identifier = &cx.ast.node(node).identifier;
        let Some(slot) = formals.iter().position(|f| f == identifier) else {
            if kind == NodeKind::Assignment {
                continue;
            }
            return Err(Failure::new(
                ErrorCode::MalformedInline,
                format!("unbound identifier `{identifier}`"),
            ));
        };
        let argument = arguments[slot];

        if kind == NodeKind::Assignment {
            retarget(cx, node, argument)?;
        } else {
            let bound = bind_operand(cx, node, argument)?;
            if let Some(root) = roots.iter_mut().find(|root| **root == node) {
                *root = bound;
            }
        }
    }
    Ok(())
}

/// Bind one formal, returning the node that now stands in for it.
fn bind_operand(cx: &mut Lowering<'_>, formal: NodeId, argument: NodeId) -> Result<NodeId, Failure> {
    let source = cx.ast.node(argument).clone();
    let plain = source.indexers().is_empty() && source.depends_on().is_empty();

    match source.kind {
        NodeKind::Parameter(operand @ Operand::Constant(_)) if plain => {
            let node = cx.ast.node_mut(formal);
            node.kind = NodeKind::Parameter(operand);
            node.vector_size = source.vector_size;
            node.is_vector = source.is_vector;
        }
        NodeKind::Parameter(operand @ Operand::Variable(id)) if plain => {
            let node = cx.ast.node_mut(formal);
            node.kind = NodeKind::Parameter(operand);
            node.identifier = source.identifier.clone();
            node.vector_size = source.vector_size;
            node.is_vector = source.is_vector;
            cx.variables.add_reference(id);
        }
        _ => {
            let copy = cx.ast.deep_clone(argument);
            for indexer in cx.ast.take_indexers(formal) {
                cx.ast.push_indexer(copy, indexer)?;
            }
            // A detached formal is the returned value; the caller splices it.
            if cx.ast.parent(formal).is_some() {
                cx.ast.replace(formal, copy)?;
            }
            return Ok(copy);
        }
    }
    Ok(formal)
}

fn retarget(cx: &mut Lowering<'_>, assignment: NodeId, argument: NodeId) -> Result<(), Failure> {
    let source = cx.ast.node(argument);
    match source.kind {
        NodeKind::Parameter(Operand::Variable(id)) if source.indexers().is_empty() => {
            let identifier = source.identifier.clone();
            let (vector_size, is_vector) = (source.vector_size, source.is_vector);
            let node = cx.ast.node_mut(assignment);
            node.identifier = identifier;
            node.vector_size = vector_size;
            node.is_vector = is_vector;
            cx.variables.add_reference(id);
            Ok(())
        }
        NodeKind::Parameter(Operand::Constant(_)) => Err(Failure::new(
            ErrorCode::MalformedInline,
            format!(
                "cannot assign to `{}`: argument is a constant",
                cx.ast.node(assignment).identifier
            ),
        )),
        _ => Err(Failure::new(
            ErrorCode::MalformedInline,
            format!(
                "cannot assign to `{}`: argument is not a variable",
                cx.ast.node(assignment).identifier
            ),
        )),
    }
}

/// Whether `call` sits in the condition of a while loop at `statement`.
fn in_loop_condition(cx: &Lowering<'_>, call: NodeId, statement: NodeId) -> bool {
    if cx.ast.kind(statement) != NodeKind::While {
        return false;
    }
    let mut cursor = call;
    while let Some(parent) = cx.ast.parent(cursor) {
        if parent == statement {
            return cx.ast.kind(cursor) == NodeKind::Condition;
        }
        cursor = parent;
    }
    false
}
