use lanescript_ast::{FunctionRegistry, Script, Severity};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use super::*;
use crate::reference::{Evaluator, Memory};

fn var(name: &str) -> Value {
    json!({ "kind": "variable", "identifier": name })
}

fn constant(value: f32) -> Value {
    json!({ "kind": "constant", "value": value })
}

fn op(name: &str) -> Value {
    json!({ "kind": "operation", "op": name })
}

/// Script with `a = <items>` over scalar variables `b..f`.
fn sequence_script(items: Vec<Value>) -> Script {
    Script::from_value(json!({
        "variables": [
            { "name": "a" }, { "name": "b" }, { "name": "c" },
            { "name": "d" }, { "name": "e" }, { "name": "f" }
        ],
        "statements": [{ "kind": "assignment", "identifier": "a", "children": items }]
    }))
    .unwrap()
}

fn run_optimizer(script: &mut Script, options: &SequenceOptions) -> (Result<OptimizeStats>, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let result = optimize(
        &mut script.ast,
        &FunctionRegistry::with_builtins(),
        options,
        &mut diagnostics,
    );
    (result, diagnostics)
}

fn optimized(items: Vec<Value>) -> (String, OptimizeStats, Diagnostics) {
    let mut script = sequence_script(items);
    let (result, diagnostics) = run_optimizer(&mut script, &SequenceOptions::default());
    let stats = result.unwrap();
    assert!(script.ast.validate().is_ok());
    (script.ast.render(script.ast.root()), stats, diagnostics)
}

fn first_statement(script: &Script) -> NodeId {
    script.ast.children(script.ast.root())[0]
}

#[test]
fn test_uniform_addition_folds_whole_list() {
    let (rendered, stats, _) = optimized(vec![
        var("b"), op("add"), var("c"), op("add"), var("d"),
    ]);
    assert_eq!(rendered, "(root (assignment a (call adda b c d)))");
    assert_eq!(stats.folds, 1);
}

#[test]
fn test_negated_subtraction_gets_leading_zero() {
    let (rendered, _, _) = optimized(vec![
        op("subtract"), var("b"), op("subtract"), var("c"), op("subtract"), var("d"),
    ]);
    assert_eq!(rendered, "(root (assignment a (call suba 0 b c d)))");
}

#[test]
fn test_negated_product_keeps_unary() {
    let (rendered, _, _) = optimized(vec![
        op("subtract"), var("b"), op("multiply"), var("c"), op("multiply"), var("d"),
    ]);
    assert_eq!(rendered, "(root (assignment a - (call mula b c d)))");
}

#[test]
fn test_negated_sum_folds_after_first_operand() {
    let (rendered, _, _) = optimized(vec![
        op("subtract"), var("b"), op("add"), var("c"), op("add"), var("d"),
    ]);
    assert_eq!(rendered, "(root (assignment a - b + (call adda c d)))");
}

#[test]
fn test_head_run_absorbs_first_operand() {
    let (rendered, stats, _) = optimized(vec![
        var("b"), op("multiply"), var("c"), op("multiply"), var("d"), op("add"), var("e"),
    ]);
    assert_eq!(rendered, "(root (assignment a (call mula b c d) + e))");
    assert_eq!(stats.folds, 1);
}

#[test]
fn test_subtraction_run_further_in_becomes_addition() {
    let (rendered, _, _) = optimized(vec![
        var("b"), op("add"), var("c"), op("subtract"), var("d"), op("subtract"), var("e"),
    ]);
    assert_eq!(rendered, "(root (assignment a b + c + (call suba 0 d e)))");
}

#[test]
fn test_product_run_further_in_keeps_operator() {
    let (rendered, _, _) = optimized(vec![
        var("b"), op("add"), var("c"), op("multiply"), var("d"), op("multiply"), var("e"),
    ]);
    assert_eq!(rendered, "(root (assignment a b + c * (call mula d e)))");
}

#[test]
fn test_division_run_further_in_is_reported() {
    let items = vec![
        var("b"), op("add"), var("c"), op("divide"), var("d"), op("divide"), var("e"),
    ];
    let (rendered, stats, diagnostics) = optimized(items);
    assert_eq!(rendered, "(root (assignment a b + c / d / e))");
    assert_eq!(stats.unsupported, 1);
    assert_eq!(diagnostics.error_count(), 0);
    let warning = diagnostics.iter().next().unwrap();
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.code, ErrorCode::UnsupportedFold);
}

#[test]
fn test_short_sequences_are_left_alone() {
    let (rendered, stats, _) = optimized(vec![var("b"), op("add"), var("c")]);
    assert_eq!(rendered, "(root (assignment a b + c))");
    assert_eq!(stats.sequences, 0);
}

#[test]
fn test_vector_assignment_is_left_alone() {
    let mut script = Script::from_value(json!({
        "variables": [{ "name": "v", "vector_size": 4 }, { "name": "b" }],
        "statements": [{ "kind": "assignment", "identifier": "v", "children": [
            var("b"), op("add"), var("b"), op("add"), var("b")
        ]}]
    }))
    .unwrap();
    let (result, _) = run_optimizer(&mut script, &SequenceOptions::default());
    assert_eq!(result.unwrap().folds, 0);
    assert_eq!(
        script.ast.render(script.ast.root()),
        "(root (assignment v b + b + b))"
    );
}

#[test]
fn test_inner_compound_is_folded() {
    let (rendered, _, _) = optimized(vec![
        var("f"),
        op("multiply"),
        json!({ "kind": "compound", "children": [
            var("b"), op("add"), var("c"), op("add"), var("d")
        ]}),
    ]);
    assert_eq!(rendered, "(root (assignment a f * (compound (call adda b c d))))");
}

#[test]
fn test_disabled_optimizer_changes_nothing() {
    let mut script = sequence_script(vec![
        var("b"), op("add"), var("c"), op("add"), var("d"),
    ]);
    let options = SequenceOptions {
        enabled: false,
        ..SequenceOptions::default()
    };
    let (result, _) = run_optimizer(&mut script, &options);
    assert_eq!(result.unwrap(), OptimizeStats::default());
    assert_eq!(
        script.ast.render(script.ast.root()),
        "(root (assignment a b + c + d))"
    );
}

#[test]
fn test_missing_fused_builtin_fails_the_stage() {
    let mut registry = FunctionRegistry::with_builtins();
    registry.unregister(Builtin::AddAll);
    let mut script = sequence_script(vec![
        var("b"), op("add"), var("c"), op("add"), var("d"),
    ]);
    let mut diagnostics = Diagnostics::new();
    let result = optimize(
        &mut script.ast,
        &registry,
        &SequenceOptions::default(),
        &mut diagnostics,
    );
    assert!(matches!(
        result,
        Err(LowerError::StageFailed {
            stage: "optimize",
            errors: 1
        })
    ));
    let codes: Vec<ErrorCode> = diagnostics.errors().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::UnresolvedFunction]);
}

#[test]
fn test_fuse_range_rejects_mixed_operators() {
    let mut script = sequence_script(vec![
        var("b"), op("add"), var("c"), op("multiply"), var("d"),
    ]);
    let node = first_statement(&script);
    let registry = FunctionRegistry::with_builtins();

    let err = fuse_range(&mut script.ast, &registry, node, 0..5, Operator::Add, false).unwrap_err();
    assert_eq!(
        err,
        FoldError::OperatorMismatch {
            expected: Operator::Add,
            found: Operator::Multiply
        }
    );
    assert_eq!(err.code(), ErrorCode::OperatorMismatch);
}

#[test]
fn test_fuse_range_without_operands() {
    let mut script = sequence_script(vec![var("b"), op("add"), var("c")]);
    let node = first_statement(&script);
    let registry = FunctionRegistry::with_builtins();

    let err = fuse_range(&mut script.ast, &registry, node, 1..2, Operator::Add, false).unwrap_err();
    assert_eq!(err, FoldError::ParameterMismatch);
    assert_eq!(err.code(), ErrorCode::ParameterMismatch);

    let err = fuse_range(&mut script.ast, &registry, node, 0..3, Operator::Equals, false).unwrap_err();
    assert_eq!(err, FoldError::NotFoldable(Operator::Equals));

    let err = fuse_range(&mut script.ast, &registry, node, 0..9, Operator::Add, false).unwrap_err();
    assert!(matches!(err, FoldError::Ast(_)));
}

#[test]
fn test_fuse_range_builds_named_call() {
    let mut script = sequence_script(vec![
        var("b"), op("subtract"), var("c"), op("subtract"), var("d"),
    ]);
    let node = first_statement(&script);
    let registry = FunctionRegistry::with_builtins();

    let call = fuse_range(&mut script.ast, &registry, node, 2..5, Operator::Subtract, true).unwrap();
    assert_eq!(script.ast.node(call).identifier, "suba");
    assert_eq!(script.ast.children(call).len(), 3);
    assert_eq!(script.ast.render(node), "(assignment a b - (call suba 0 c d))");
}

/// Random `[-]? x (op x)*` sequences over small integers evaluate to the
/// same value before and after folding.
#[test]
fn test_folding_preserves_values() {
    let mut rng = StdRng::seed_from_u64(42);
    let names = ["b", "c", "d", "e", "f"];
    let ops = ["add", "subtract", "multiply"];

    for _ in 0..200 {
        let mut items = Vec::new();
        if rng.gen_bool(0.3) {
            items.push(op("subtract"));
        }
        let count = rng.gen_range(3..=8);
        for i in 0..count {
            if i > 0 {
                // Bias toward runs so folds actually happen.
                let pick = if rng.gen_bool(0.6) { 0 } else { rng.gen_range(0..ops.len()) };
                items.push(op(ops[pick]));
            }
            if rng.gen_bool(0.8) {
                items.push(var(names[rng.gen_range(0..names.len())]));
            } else {
                items.push(constant(rng.gen_range(-3..=3) as f32));
            }
        }
        let inputs: Vec<f32> = names.iter().map(|_| rng.gen_range(-3..=3) as f32).collect();

        let evaluate = |script: &Script| {
            let mut memory = Memory::new(&script.variables);
            for (name, &value) in names.iter().zip(&inputs) {
                memory.set(script.variables.by_name(name).unwrap().id, [value; 4]);
            }
            Evaluator::new(&script.ast, &script.variables)
                .run(&mut memory)
                .unwrap();
            memory.scalar(script.variables.by_name("a").unwrap().id)
        };

        let reference = sequence_script(items.clone());
        let mut folded = sequence_script(items.clone());
        let (result, _) = run_optimizer(&mut folded, &SequenceOptions::default());
        assert!(result.is_ok());
        assert_eq!(
            evaluate(&reference),
            evaluate(&folded),
            "{}",
            folded.ast.render(folded.ast.root())
        );
    }
}
