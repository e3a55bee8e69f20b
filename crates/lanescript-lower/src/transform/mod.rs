//! AST transform stage.
//!
//! Lowers control-flow and indexing sugar into the primitive forms the
//! emitter understands:
//!
//! - `switch` → chained `if`/`then` blocks, jumps and an end label
//! - `for` → `while` with the initializer as a dependency
//! - nested single-child compounds → one compound
//! - inline calls → spliced function bodies
//! - swizzle indexers → index-write nodes or index-read calls
//!
//! # Traversal
//!
//! The stage is a worklist walk. Each popped node is rewritten before its
//! children are visited; a rewrite tells the walker whether to descend,
//! stop, or revisit the nodes it produced. Nodes detached by an earlier
//! rewrite are skipped when popped, so no rewrite ever iterates a list it
//! is mutating. Inline function templates are never entered.
//!
//! # Failures
//!
//! A failing rewrite records a node-scoped diagnostic and abandons that
//! subtree. The walk continues with the rest of the tree and the stage
//! fails at the end if anything was recorded.

mod compound;
mod for_loop;
mod indexer;
mod inline;
mod switch;

#[cfg(test)]
mod tests;

use lanescript_ast::{
    Ast, AstError, Builtin, Callee, Diagnostics, ErrorCode, FunctionResolver, InlineFunctions,
    NodeId, NodeKind, Script, Variables,
};
use tracing::{debug, instrument, trace};

use crate::error::{LowerError, Result};
use crate::options::TransformOptions;

/// What the walker does after a rewrite.
#[derive(Debug)]
pub(crate) enum Rewrite {
    /// Visit the node's dependencies and children.
    Descend,
    /// Nothing below the node needs visiting.
    Skip,
    /// Visit these nodes (in order) instead of the original.
    Revisit(Vec<NodeId>),
}

/// A node-local rewrite failure.
#[derive(Debug)]
pub(crate) struct Failure {
    code: ErrorCode,
    message: String,
}

impl Failure {
    pub(crate) fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<AstError> for Failure {
    fn from(err: AstError) -> Self {
        Failure::new(ErrorCode::TreeInvariant, err.to_string())
    }
}

pub(crate) type RewriteResult = std::result::Result<Rewrite, Failure>;

/// Shared state for one transform run.
pub(crate) struct Lowering<'a> {
    pub(crate) ast: &'a mut Ast,
    pub(crate) variables: &'a mut Variables,
    pub(crate) inline_functions: &'a InlineFunctions,
    pub(crate) resolver: &'a dyn FunctionResolver,
    pub(crate) options: &'a TransformOptions,
    pub(crate) expansions: usize,
}

/// Statistics from one transform run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    /// Nodes popped from the worklist.
    pub visited: usize,
    /// Inline calls expanded.
    pub inlined: usize,
    /// Nodes whose rewrite failed.
    pub failures: usize,
}

/// Lower every sugared construct reachable from the script root.
#[instrument(skip_all, name = "transform")]
pub fn transform(
    script: &mut Script,
    resolver: &dyn FunctionResolver,
    options: &TransformOptions,
    diagnostics: &mut Diagnostics,
) -> Result<TransformStats> {
    options.validate()?;
    let root = script.ast.root();
    let mut lowering = Lowering {
        ast: &mut script.ast,
        variables: &mut script.variables,
        inline_functions: &script.inline_functions,
        resolver,
        options,
        expansions: 0,
    };
    let stats = lowering.run(root, diagnostics);
    debug!(
        visited = stats.visited,
        inlined = stats.inlined,
        failures = stats.failures,
        "transform finished"
    );
    if stats.failures > 0 {
        return Err(LowerError::StageFailed {
            stage: "transform",
            errors: stats.failures,
        });
    }
    Ok(stats)
}

impl Lowering<'_> {
    fn run(&mut self, start: NodeId, diagnostics: &mut Diagnostics) -> TransformStats {
        let mut stats = TransformStats::default();
        let mut worklist = vec![start];

        while let Some(id) = worklist.pop() {
            if !self.ast.is_attached(id) || self.ast.kind(id) == NodeKind::InlineFunction {
                continue;
            }
            stats.visited += 1;
            trace!(node = %id, kind = self.ast.kind(id).name(), "visit");

            match self.rewrite(id) {
                Ok(Rewrite::Descend) => {
                    let node = self.ast.node(id);
                    worklist.extend(node.children().iter().rev());
                    worklist.extend(node.depends_on().iter().rev());
                }
                Ok(Rewrite::Skip) => {}
                Ok(Rewrite::Revisit(ids)) => worklist.extend(ids.into_iter().rev()),
                Err(failure) => {
                    stats.failures += 1;
                    diagnostics.log_error(Some(id), failure.code, failure.message);
                }
            }
        }
        stats.inlined = self.expansions;
        stats
    }

    fn rewrite(&mut self, id: NodeId) -> RewriteResult {
        let kind = self.ast.kind(id);
        if kind == NodeKind::Call(Callee::Inline) {
            return inline::expand(self, id);
        }
        if self.has_pending_indexers(id) {
            return indexer::classify(self, id);
        }
        match kind {
            NodeKind::Switch => switch::lower(self, id),
            NodeKind::For => for_loop::lower(self, id),
            NodeKind::Compound => compound::merge(self, id),
            NodeKind::Call(Callee::Builtin(builtin)) => self.check_arity(id, builtin),
            NodeKind::Index | NodeKind::IndexWrite(_) => Ok(Rewrite::Skip),
            _ => Ok(Rewrite::Descend),
        }
    }

    /// A builtin call must resolve and take its argument count.
    fn check_arity(&self, id: NodeId, builtin: Builtin) -> RewriteResult {
        let info = self.resolver.resolve(builtin).ok_or_else(|| {
            Failure::new(
                ErrorCode::UnresolvedFunction,
                format!("builtin `{}` is not registered", builtin.name()),
            )
        })?;
        let count = self.ast.children(id).len();
        if !info.accepts(count) {
            return Err(Failure::new(
                ErrorCode::ParameterMismatch,
                format!(
                    "`{}` takes {} to {} argument(s), {count} given",
                    info.name, info.min_parameters, info.max_parameters
                ),
            ));
        }
        Ok(Rewrite::Descend)
    }

    fn has_pending_indexers(&self, id: NodeId) -> bool {
        self.ast
            .node(id)
            .indexers()
            .iter()
            .any(|&i| self.ast.kind(i) == NodeKind::Index)
    }

    /// The statement containing `id`: the first node, starting at `id`,
    /// whose parent is a statement list.
    pub(crate) fn enclosing_statement(&self, id: NodeId) -> Option<NodeId> {
        let mut cursor = id;
        loop {
            let parent = self.ast.parent(cursor)?;
            if self.ast.kind(parent).is_statement_list() {
                return Some(cursor);
            }
            cursor = parent;
        }
    }

    /// Require `id` to sit directly in a statement list.
    pub(crate) fn statement_parent(&self, id: NodeId) -> std::result::Result<NodeId, Failure> {
        match self.ast.parent(id) {
            Some(parent) if self.ast.kind(parent).is_statement_list() => Ok(parent),
            Some(parent) => Err(Failure::new(
                ErrorCode::MissingParent,
                format!(
                    "{} must be a statement, found inside {}",
                    self.ast.kind(id).name(),
                    self.ast.kind(parent).name()
                ),
            )),
            None => Err(Failure::new(
                ErrorCode::MissingParent,
                format!("{} has no parent", self.ast.kind(id).name()),
            )),
        }
    }
}
