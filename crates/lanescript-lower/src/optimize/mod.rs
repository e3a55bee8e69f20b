//! Sequence optimizer.
//!
//! Folds runs of one arithmetic operator in scalar expression sequences
//! into a single fused n-ary call:
//!
//! ```text
//! a + b + c + d          → adda(a, b, c, d)
//! - a - b - c            → suba(0, a, b, c)
//! - a * b * c            → - mula(a, b, c)
//! x == a * b * c + d     → x == a * mula(b, c) ... (partial runs)
//! ```
//!
//! Sequences are evaluated left to right, so a run at the head of a list
//! can absorb the first operand, while a run further in keeps its leading
//! operator in front of the call. A subtraction run further in turns into
//! `+ suba(0, ...)`. Division runs further in would need a different
//! identity and are reported as unsupported.
//!
//! Only scalar assignments (and scalar compounds inside them) longer than
//! `2 * min_run_length` children are considered.

#[cfg(test)]
mod tests;

use std::ops::Range;

use lanescript_ast::{
    Ast, AstError, Builtin, Callee, Diagnostics, ErrorCode, FunctionResolver, Node, NodeId,
    NodeKind, Operand, Operator,
};
use thiserror::Error;
use tracing::{debug, instrument, trace};

use crate::error::{LowerError, Result};
use crate::options::SequenceOptions;

/// Errors raised while folding one sequence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FoldError {
    /// The selected range holds no operand.
    #[error("no operands in the folded range")]
    ParameterMismatch,

    /// An operator inside the range differs from the run's operator.
    #[error("expected `{}` inside the run, found `{}`", .expected.symbol(), .found.symbol())]
    OperatorMismatch { expected: Operator, found: Operator },

    /// The operator has no fused form.
    #[error("`{}` cannot be fused", .0.symbol())]
    NotFoldable(Operator),

    /// The fused builtin is not registered with the resolver.
    #[error("fused builtin `{}` is not registered", .0.name())]
    Unresolved(Builtin),

    /// The run has more operands than the fused builtin accepts.
    #[error("{count} operands exceed what `{}` accepts", .builtin.name())]
    Arity { builtin: Builtin, count: usize },

    #[error(transparent)]
    Ast(#[from] AstError),
}

impl FoldError {
    pub fn code(&self) -> ErrorCode {
        match self {
            FoldError::ParameterMismatch | FoldError::Arity { .. } => ErrorCode::ParameterMismatch,
            FoldError::OperatorMismatch { .. } | FoldError::NotFoldable(_) => {
                ErrorCode::OperatorMismatch
            }
            FoldError::Unresolved(_) => ErrorCode::UnresolvedFunction,
            FoldError::Ast(_) => ErrorCode::TreeInvariant,
        }
    }
}

/// Statistics from one optimizer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    /// Sequences long enough to be considered.
    pub sequences: usize,
    /// Fused calls introduced.
    pub folds: usize,
    /// Runs left alone because their placement is unsupported.
    pub unsupported: usize,
    /// Sequences whose folding failed.
    pub failures: usize,
}

/// Fold arithmetic runs in every scalar assignment under the root.
#[instrument(skip_all, name = "optimize")]
pub fn optimize(
    ast: &mut Ast,
    resolver: &dyn FunctionResolver,
    options: &SequenceOptions,
    diagnostics: &mut Diagnostics,
) -> Result<OptimizeStats> {
    options.validate()?;
    let mut stats = OptimizeStats::default();
    if !options.enabled {
        return Ok(stats);
    }

    let assignments: Vec<NodeId> = ast
        .descendants(ast.root())
        .into_iter()
        .filter(|&id| ast.kind(id) == NodeKind::Assignment && ast.node(id).is_scalar())
        .filter(|&id| {
            ast.ancestor_where(id, |n| n.kind == NodeKind::InlineFunction)
                .is_none()
        })
        .collect();

    let mut optimizer = SequenceOptimizer {
        ast,
        resolver,
        options,
        diagnostics,
        stats: &mut stats,
    };
    for assignment in assignments {
        // Innermost compounds first so outer runs see their fused calls.
        let mut targets: Vec<NodeId> = optimizer
            .ast
            .children(assignment)
            .iter()
            .flat_map(|&c| optimizer.ast.descendants(c))
            .filter(|&id| {
                optimizer.ast.kind(id) == NodeKind::Compound && optimizer.ast.node(id).is_scalar()
            })
            .collect();
        targets.reverse();
        targets.push(assignment);
        for target in targets {
            optimizer.optimize_sequence(target);
        }
    }

    debug!(
        sequences = stats.sequences,
        folds = stats.folds,
        unsupported = stats.unsupported,
        failures = stats.failures,
        "optimize finished"
    );
    if stats.failures > 0 {
        return Err(LowerError::StageFailed {
            stage: "optimize",
            errors: stats.failures,
        });
    }
    Ok(stats)
}

struct SequenceOptimizer<'a> {
    ast: &'a mut Ast,
    resolver: &'a dyn FunctionResolver,
    options: &'a SequenceOptions,
    diagnostics: &'a mut Diagnostics,
    stats: &'a mut OptimizeStats,
}

impl SequenceOptimizer<'_> {
    fn optimize_sequence(&mut self, node: NodeId) {
        if self.ast.children(node).len() <= 2 * self.options.min_run_length {
            return;
        }
        let Some(sequence) = Sequence::parse(self.ast, node) else {
            return;
        };
        if !sequence.is_scalar(self.ast) {
            return;
        }
        self.stats.sequences += 1;

        if let Err(err) = self.fold(node, sequence) {
            self.stats.failures += 1;
            self.diagnostics
                .log_error(Some(node), err.code(), err.to_string());
        }
    }

    fn fold(&mut self, node: NodeId, sequence: Sequence) -> std::result::Result<(), FoldError> {
        if let Some(op) = sequence.uniform_operator() {
            let len = self.ast.children(node).len();
            let folded = match sequence.unary {
                None => Some(0..len),
                Some(Operator::Subtract) if op == Operator::Subtract => Some(0..len),
                Some(Operator::Subtract) if matches!(op, Operator::Multiply | Operator::Divide) => {
                    Some(1..len)
                }
                _ => None,
            };
            if let Some(range) = folded {
                let leading_zero = sequence.unary.is_some() && op == Operator::Subtract;
                fuse_range(self.ast, self.resolver, node, range, op, leading_zero)?;
                self.stats.folds += 1;
                trace!(node = %node, op = op.symbol(), "folded whole sequence");
                return Ok(());
            }
        }
        self.fold_partial_runs(node)
    }

    fn fold_partial_runs(&mut self, node: NodeId) -> std::result::Result<(), FoldError> {
        let min_run = self.options.min_run_length;
        let mut from = 0;

        for _ in 0..self.options.max_iterations {
            let Some(sequence) = Sequence::parse(self.ast, node) else {
                break;
            };
            let Some(run) = sequence.longest_run(from, min_run) else {
                break;
            };
            let op = sequence.operators[run.start];
            let base = usize::from(sequence.unary.is_some());
            let operand_at = |j: usize| base + 2 * j;
            let capture = run.start == 0
                && match sequence.unary {
                    None => true,
                    Some(Operator::Subtract) => op != Operator::Add,
                    Some(_) => false,
                };

            if capture {
                let end = operand_at(run.end + 1) + 1;
                let (range, leading_zero) = match sequence.unary {
                    Some(_) if op == Operator::Subtract => (0..end, true),
                    _ => (base..end, false),
                };
                fuse_range(self.ast, self.resolver, node, range, op, leading_zero)?;
                self.stats.folds += 1;
                from = 0;
                continue;
            }

            let length = run.end - run.start + 1;
            if op == Operator::Divide || length < 2 {
                self.stats.unsupported += 1;
                self.diagnostics.log_warning(
                    Some(node),
                    ErrorCode::UnsupportedFold,
                    format!(
                        "run of {length} `{}` after the first operand is left unfused",
                        op.symbol()
                    ),
                );
                from = run.end + 1;
                continue;
            }

            // Operator `run.start` stays in front of the call.
            let range = operand_at(run.start + 1)..operand_at(run.end + 1) + 1;
            if op == Operator::Subtract {
                fuse_range(self.ast, self.resolver, node, range, op, true)?;
                let leading = self.ast.children(node)[operand_at(run.start) + 1];
                self.ast.node_mut(leading).kind = NodeKind::Operation(Operator::Add);
            } else {
                fuse_range(self.ast, self.resolver, node, range, op, false)?;
            }
            self.stats.folds += 1;
            from = run.start + 1;
        }
        Ok(())
    }
}

/// Replace children `range` of `node` with one fused call.
///
/// Operands in the range become the call's arguments, in order; every
/// operator in the range must be `op`. With `leading_zero` a literal `0`
/// is passed first, which turns `- a - b` into `suba(0, a, b)`.
pub fn fuse_range(
    ast: &mut Ast,
    resolver: &dyn FunctionResolver,
    node: NodeId,
    range: Range<usize>,
    op: Operator,
    leading_zero: bool,
) -> std::result::Result<NodeId, FoldError> {
    let builtin = Builtin::fused(op).ok_or(FoldError::NotFoldable(op))?;
    let children = ast.children(node);
    let selected = children.get(range.clone()).ok_or(AstError::IndexOutOfRange {
        node,
        index: range.end,
        len: children.len(),
    })?;

    let mut operands = Vec::with_capacity(selected.len() / 2 + 2);
    for &child in selected {
        match ast.node(child).operator() {
            Some(found) if found == op => {}
            Some(found) => return Err(FoldError::OperatorMismatch { expected: op, found }),
            None => operands.push(child),
        }
    }
    if operands.is_empty() {
        return Err(FoldError::ParameterMismatch);
    }

    let info = resolver
        .resolve(builtin)
        .ok_or(FoldError::Unresolved(builtin))?;
    let count = operands.len() + usize::from(leading_zero);
    if !info.accepts(count) {
        return Err(FoldError::Arity { builtin, count });
    }
    let name = info.name.clone();

    let call = ast.alloc(Node::new(NodeKind::Call(Callee::Builtin(builtin))).named(name));
    ast.replace_range(node, range, &[call])?;
    if leading_zero {
        let zero = ast.alloc(Node::new(NodeKind::Parameter(Operand::Constant(0.0))));
        ast.push_child(call, zero)?;
    }
    ast.insert_children(call, usize::from(leading_zero), &operands)?;
    Ok(call)
}

/// Parsed `[unary?] operand (operator operand)*` sequence.
#[derive(Debug)]
struct Sequence {
    unary: Option<Operator>,
    operands: Vec<NodeId>,
    /// `operators[i]` sits between `operands[i]` and `operands[i + 1]`.
    operators: Vec<Operator>,
}

/// Inclusive range of operator indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    start: usize,
    end: usize,
}

impl Sequence {
    fn parse(ast: &Ast, node: NodeId) -> Option<Self> {
        let mut children = ast.children(node);
        let mut unary = None;
        if let Some(op) = children.first().and_then(|&c| ast.node(c).operator()) {
            if !op.is_unary_prefix() {
                return None;
            }
            unary = Some(op);
            children = &children[1..];
        }
        if children.len() % 2 == 0 {
            return None;
        }

        let mut operands = Vec::with_capacity(children.len() / 2 + 1);
        let mut operators = Vec::with_capacity(children.len() / 2);
        for (i, &child) in children.iter().enumerate() {
            match (i % 2, ast.node(child).operator()) {
                (0, None) if ast.kind(child).is_operand() => operands.push(child),
                (1, Some(op)) => operators.push(op),
                _ => return None,
            }
        }
        Some(Self {
            unary,
            operands,
            operators,
        })
    }

    fn is_scalar(&self, ast: &Ast) -> bool {
        self.operands.iter().all(|&o| ast.node(o).is_scalar())
    }

    /// The single foldable operator used throughout, if any.
    fn uniform_operator(&self) -> Option<Operator> {
        let first = *self.operators.first()?;
        Builtin::fused(first)?;
        self.operators
            .iter()
            .all(|&op| op == first)
            .then_some(first)
    }

    /// Longest run of one foldable operator starting at or after `from`,
    /// at least `min_len` long. Ties go to the earliest run.
    fn longest_run(&self, from: usize, min_len: usize) -> Option<Run> {
        let mut best: Option<Run> = None;
        let mut i = from;
        while i < self.operators.len() {
            let op = self.operators[i];
            let mut end = i;
            while end + 1 < self.operators.len() && self.operators[end + 1] == op {
                end += 1;
            }
            let len = end - i + 1;
            let longer = best.map_or(true, |b| len > b.end - b.start + 1);
            if Builtin::fused(op).is_some() && len >= min_len && longer {
                best = Some(Run { start: i, end });
            }
            i = end + 1;
        }
        best
    }
}
