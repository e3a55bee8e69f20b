//! Tests for the transform stage.

use lanescript_ast::{Builtin, Diagnostics, ErrorCode, FunctionRegistry, NodeKind, Script};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use super::*;
use crate::reference::{Evaluator, Memory};

// ============================================================================
// Helpers
// ============================================================================

fn var(name: &str) -> Value {
    json!({ "kind": "variable", "identifier": name })
}

fn constant(value: f32) -> Value {
    json!({ "kind": "constant", "value": value })
}

fn op(name: &str) -> Value {
    json!({ "kind": "operation", "op": name })
}

fn assign(name: &str, children: Vec<Value>) -> Value {
    json!({ "kind": "assignment", "identifier": name, "children": children })
}

fn condition(children: Vec<Value>) -> Value {
    json!({ "kind": "condition", "children": children })
}

fn lower_with(script: &mut Script, registry: &FunctionRegistry) -> (Result<TransformStats>, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let result = transform(script, registry, &TransformOptions::default(), &mut diagnostics);
    (result, diagnostics)
}

fn lowered(value: Value) -> Script {
    let mut script = Script::from_value(value).unwrap();
    let (result, diagnostics) = lower_with(&mut script, &FunctionRegistry::with_builtins());
    assert!(result.is_ok(), "transform failed: {:?}", diagnostics.into_vec());
    assert!(script.ast.validate().is_ok());
    script
}

fn failed(value: Value) -> Vec<ErrorCode> {
    let mut script = Script::from_value(value).unwrap();
    let (result, diagnostics) = lower_with(&mut script, &FunctionRegistry::with_builtins());
    assert!(matches!(
        result,
        Err(LowerError::StageFailed {
            stage: "transform",
            ..
        })
    ));
    diagnostics.errors().map(|d| d.code).collect()
}

fn render(script: &Script) -> String {
    script.ast.render(script.ast.root())
}

fn run(script: &Script, inputs: &[(&str, f32)]) -> Memory {
    let mut memory = Memory::new(&script.variables);
    for &(name, value) in inputs {
        let id = script.variables.by_name(name).unwrap().id;
        memory.set(id, [value; 4]);
    }
    Evaluator::new(&script.ast, &script.variables)
        .run(&mut memory)
        .unwrap();
    memory
}

fn read(script: &Script, memory: &Memory, name: &str) -> f32 {
    memory.scalar(script.variables.by_name(name).unwrap().id)
}

// ============================================================================
// For loops
// ============================================================================

fn for_script(limit: f32, body: Vec<Value>) -> Value {
    json!({
        "variables": [{ "name": "i" }, { "name": "s" }],
        "statements": [{ "kind": "for", "children": [
            assign("i", vec![constant(0.0)]),
            condition(vec![var("i"), op("smaller"), constant(limit)]),
            assign("i", vec![var("i"), op("add"), constant(1.0)]),
            { "kind": "block", "children": body }
        ]}]
    })
}

fn while_script(limit: f32, body: Vec<Value>) -> Value {
    let mut body = body;
    body.push(assign("i", vec![var("i"), op("add"), constant(1.0)]));
    json!({
        "variables": [{ "name": "i" }, { "name": "s" }],
        "statements": [
            assign("i", vec![constant(0.0)]),
            { "kind": "while", "children": [
                condition(vec![var("i"), op("smaller"), constant(limit)]),
                { "kind": "block", "children": body }
            ]}
        ]
    })
}

#[test]
fn test_for_becomes_while_with_initializer_dependency() {
    let body = vec![assign("s", vec![var("s"), op("add"), var("i")])];
    let script = lowered(for_script(5.0, body));
    assert_eq!(
        render(&script),
        "(root (while ^((assignment i 0)) (condition i < 5) \
         (block (assignment s s + i) (assignment i i + 1))))"
    );
}

#[test]
fn test_for_matches_hand_written_while() {
    let bodies = [
        vec![],
        vec![assign("s", vec![var("s"), op("add"), var("i")])],
        vec![
            assign("s", vec![var("s"), op("multiply"), constant(2.0)]),
            assign("s", vec![var("s"), op("add"), constant(1.0)]),
        ],
    ];
    for body in bodies {
        for limit in [0.0, 1.0, 4.0, 9.0] {
            let lowered_for = lowered(for_script(limit, body.clone()));
            let expected = lowered(while_script(limit, body.clone()));
            let got = run(&lowered_for, &[]);
            let want = run(&expected, &[]);
            assert_eq!(got, want, "limit {limit}, body {body:?}");
            assert_eq!(read(&lowered_for, &got, "i"), limit);
        }
    }
}

#[test]
fn test_for_without_block_body_is_wrapped() {
    let script = lowered(json!({
        "statements": [{ "kind": "for", "children": [
            assign("i", vec![constant(0.0)]),
            condition(vec![var("i"), op("smaller"), constant(3.0)]),
            assign("i", vec![var("i"), op("add"), constant(1.0)]),
            assign("s", vec![var("s"), op("add"), constant(2.0)])
        ]}]
    }));
    let memory = run(&script, &[]);
    assert_eq!(read(&script, &memory, "s"), 6.0);
}

#[test]
fn test_for_with_three_children_fails() {
    let codes = failed(json!({
        "statements": [{ "kind": "for", "children": [
            assign("i", vec![constant(0.0)]),
            condition(vec![var("i"), op("smaller"), constant(3.0)]),
            assign("i", vec![var("i"), op("add"), constant(1.0)])
        ]}]
    }));
    assert_eq!(codes, vec![ErrorCode::MalformedFor]);
}

// ============================================================================
// Switch
// ============================================================================

fn case(value: f32, body: Vec<Value>) -> Value {
    let mut children = vec![condition(vec![constant(value)])];
    children.extend(body);
    json!({ "kind": "case", "children": children })
}

fn default(body: Vec<Value>) -> Value {
    json!({ "kind": "default", "children": body })
}

fn switch(selector: Value, arms: Vec<Value>) -> Value {
    let mut children = vec![condition(vec![selector])];
    children.extend(arms);
    json!({ "kind": "switch", "children": children })
}

#[test]
fn test_switch_lowering_shape() {
    let script = lowered(json!({
        "statements": [switch(var("x"), vec![
            case(1.0, vec![assign("a", vec![constant(1.0)])]),
            default(vec![assign("a", vec![constant(2.0)])]),
        ])]
    }));
    assert_eq!(
        render(&script),
        "(root (if_then_else (condition x == 1) \
         (then (assignment a 1) (jump switch_1_end))) \
         (assignment a 2) (label switch_1_end))"
    );
}

#[test]
fn test_last_case_without_default_has_no_jump() {
    let script = lowered(json!({
        "statements": [switch(var("x"), vec![
            case(1.0, vec![assign("a", vec![constant(1.0)])]),
            case(2.0, vec![assign("a", vec![constant(2.0)])]),
        ])]
    }));
    assert_eq!(
        render(&script),
        "(root (if_then_else (condition x == 1) \
         (then (assignment a 1) (jump switch_1_end))) \
         (if_then_else (condition x == 2) (then (assignment a 2))) \
         (label switch_1_end))"
    );
}

#[test]
fn test_switch_matches_naive_evaluation() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..64 {
        let case_count = rng.gen_range(0..=4);
        let has_default = case_count == 0 || rng.gen_bool(0.5);
        let mut values: Vec<f32> = (0..8).map(|v| v as f32).collect();
        values.shuffle(&mut rng);
        values.truncate(case_count);

        let mut arms: Vec<Value> = values
            .iter()
            .map(|&v| {
                case(
                    v,
                    vec![
                        assign("r", vec![constant(v * 10.0)]),
                        assign("hits", vec![var("hits"), op("add"), constant(1.0)]),
                    ],
                )
            })
            .collect();
        if has_default {
            arms.push(default(vec![
                assign("r", vec![constant(99.0)]),
                assign("hits", vec![var("hits"), op("add"), constant(1.0)]),
            ]));
        }
        let script = lowered(json!({
            "variables": [{ "name": "x" }, { "name": "r" }, { "name": "hits" }],
            "statements": [switch(var("x"), arms)]
        }));

        let branches = script
            .ast
            .children(script.ast.root())
            .iter()
            .filter(|&&n| script.ast.kind(n) == NodeKind::IfThenElse)
            .count();
        assert_eq!(branches, case_count);

        for selector in 0..9 {
            let x = selector as f32;
            let memory = run(&script, &[("x", x)]);

            let (want_r, want_hits) = if values.contains(&x) {
                (x * 10.0, 1.0)
            } else if has_default {
                (99.0, 1.0)
            } else {
                (0.0, 0.0)
            };
            assert_eq!(read(&script, &memory, "r"), want_r, "cases {values:?} x={x}");
            assert_eq!(read(&script, &memory, "hits"), want_hits);
        }
    }
}

#[test]
fn test_switch_with_compound_selector() {
    let script = lowered(json!({
        "statements": [switch(
            json!({ "kind": "compound", "children": [var("x"), op("add"), constant(1.0)] }),
            vec![
                case(3.0, vec![assign("a", vec![constant(7.0)])]),
                default(vec![assign("a", vec![constant(8.0)])]),
            ],
        )]
    }));
    assert_eq!(read(&script, &run(&script, &[("x", 2.0)]), "a"), 7.0);
    assert_eq!(read(&script, &run(&script, &[("x", 3.0)]), "a"), 8.0);
}

#[test]
fn test_empty_switch_fails() {
    let codes = failed(json!({ "statements": [switch(var("x"), vec![])] }));
    assert_eq!(codes, vec![ErrorCode::MalformedSwitch]);
}

#[test]
fn test_switch_with_two_defaults_fails() {
    let codes = failed(json!({
        "statements": [switch(var("x"), vec![default(vec![]), default(vec![])])]
    }));
    assert_eq!(codes, vec![ErrorCode::MalformedSwitch]);
}

#[test]
fn test_switch_without_condition_fails() {
    let codes = failed(json!({
        "statements": [{ "kind": "switch", "children": [default(vec![])] }]
    }));
    assert_eq!(codes, vec![ErrorCode::MalformedSwitch]);
}

#[test]
fn test_failure_is_local_to_its_subtree() {
    let mut script = Script::from_value(json!({
        "statements": [
            { "kind": "for", "children": [] },
            switch(var("x"), vec![default(vec![assign("a", vec![constant(1.0)])])]),
        ]
    }))
    .unwrap();
    let (result, diagnostics) = lower_with(&mut script, &FunctionRegistry::with_builtins());
    assert!(matches!(
        result,
        Err(LowerError::StageFailed { errors: 1, .. })
    ));
    assert_eq!(diagnostics.error_count(), 1);
    // The switch after the broken for still lowered.
    assert!(render(&script).contains("(label switch_2_end)"));
}

// ============================================================================
// Compounds
// ============================================================================

#[test]
fn test_nested_compounds_merge() {
    let script = lowered(json!({
        "statements": [assign("a", vec![json!({ "kind": "compound", "children": [
            { "kind": "compound", "children": [
                { "kind": "compound", "children": [var("b"), op("add"), var("c")] }
            ]}
        ]})])]
    }));
    assert_eq!(render(&script), "(root (assignment a (compound b + c)))");
}

#[test]
fn test_merge_prepends_outer_dependencies() {
    let script = lowered(json!({
        "statements": [assign("a", vec![json!({
            "kind": "compound",
            "depends_on": [assign("t", vec![constant(1.0)])],
            "children": [{
                "kind": "compound",
                "depends_on": [assign("u", vec![constant(2.0)])],
                "children": [var("t"), op("add"), var("u")]
            }]
        })])]
    }));
    assert_eq!(
        render(&script),
        "(root (assignment a (compound ^((assignment t 1) (assignment u 2)) t + u)))"
    );
    let memory = run(&script, &[]);
    assert_eq!(read(&script, &memory, "a"), 3.0);
}

// ============================================================================
// Inline functions
// ============================================================================

fn inline(identifier: &str, parameters: &[&str], body: Vec<Value>) -> Value {
    json!({ "identifier": identifier, "parameters": parameters, "body": body })
}

fn call(identifier: &str, arguments: Vec<Value>) -> Value {
    json!({ "kind": "inline_call", "identifier": identifier, "children": arguments })
}

fn ret(children: Vec<Value>) -> Value {
    json!({ "kind": "return", "children": children })
}

fn square() -> Value {
    inline("sq", &["p"], vec![ret(vec![var("p"), op("multiply"), var("p")])])
}

#[test]
fn test_inline_value_replaces_call() {
    let script = lowered(json!({
        "inline_functions": [square()],
        "statements": [assign("a", vec![call("sq", vec![var("b")]), op("add"), constant(1.0)])]
    }));
    assert_eq!(render(&script), "(root (assignment a (compound b * b) + 1))");
    let b = script.variables.by_name("b").unwrap();
    assert_eq!(b.reference_count, 2);
    assert_eq!(read(&script, &run(&script, &[("b", 3.0)]), "a"), 10.0);
}

#[test]
fn test_inline_prelude_is_spliced_before_statement() {
    let script = lowered(json!({
        "inline_functions": [inline("f", &["p"], vec![
            assign("t", vec![var("p"), op("add"), constant(1.0)]),
            ret(vec![var("t"), op("multiply"), constant(2.0)]),
            assign("never", vec![constant(1.0)]),
        ])],
        "statements": [assign("a", vec![call("f", vec![constant(3.0)])])]
    }));
    assert_eq!(
        render(&script),
        "(root (assignment t 3 + 1) (assignment a (compound t * 2)))"
    );
    assert_eq!(read(&script, &run(&script, &[]), "a"), 8.0);
}

#[test]
fn test_inline_nested_return_truncates_scope() {
    let script = lowered(json!({
        "inline_functions": [inline("h", &["p"], vec![
            json!({ "kind": "if", "children": [
                condition(vec![var("p")]),
                { "kind": "then", "children": [
                    assign("t", vec![constant(1.0)]),
                    ret(vec![var("t")]),
                    assign("z", vec![constant(5.0)])
                ]}
            ]}),
            ret(vec![constant(0.0)])
        ])],
        "statements": [assign("a", vec![call("h", vec![var("b")])])]
    }));
    assert_eq!(
        render(&script),
        "(root (if_then_else (condition b) (then (assignment t 1))) (assignment a t))"
    );
}

#[test]
fn test_inline_statement_call_retargets_assignment() {
    let script = lowered(json!({
        "inline_functions": [inline("inc", &["p"], vec![
            assign("p", vec![var("p"), op("add"), constant(1.0)])
        ])],
        "statements": [call("inc", vec![var("a")])]
    }));
    assert_eq!(render(&script), "(root (assignment a a + 1))");
    assert_eq!(read(&script, &run(&script, &[("a", 4.0)]), "a"), 5.0);
}

#[test]
fn test_inline_assignment_to_constant_argument_fails() {
    let codes = failed(json!({
        "inline_functions": [inline("inc", &["p"], vec![
            assign("p", vec![var("p"), op("add"), constant(1.0)])
        ])],
        "statements": [call("inc", vec![constant(2.0)])]
    }));
    assert_eq!(codes, vec![ErrorCode::MalformedInline]);
}

#[test]
fn test_inline_calls_expand_recursively() {
    let script = lowered(json!({
        "inline_functions": [
            square(),
            inline("g", &["q"], vec![ret(vec![call("sq", vec![var("q")]), op("add"), constant(1.0)])]),
        ],
        "statements": [assign("a", vec![call("g", vec![var("b")])])]
    }));
    assert_eq!(
        render(&script),
        "(root (assignment a (compound (compound b * b) + 1)))"
    );
}

#[test]
fn test_inline_complex_argument_is_cloned() {
    let script = lowered(json!({
        "inline_functions": [square()],
        "statements": [assign("a", vec![call("sq", vec![
            json!({ "kind": "compound", "children": [var("b"), op("add"), constant(1.0)] })
        ])])]
    }));
    assert_eq!(
        render(&script),
        "(root (assignment a (compound (compound b + 1) * (compound b + 1))))"
    );
    assert_eq!(read(&script, &run(&script, &[("b", 2.0)]), "a"), 9.0);
}

#[test]
fn test_inline_returned_formal_takes_cloned_argument() {
    let identity = inline("id", &["p"], vec![ret(vec![var("p")])]);

    let script = lowered(json!({
        "inline_functions": [identity.clone()],
        "statements": [assign("a", vec![call("id", vec![
            json!({ "kind": "compound", "children": [var("b"), op("add"), constant(1.0)] })
        ])])]
    }));
    assert_eq!(render(&script), "(root (assignment a (compound b + 1)))");
    assert_eq!(read(&script, &run(&script, &[("b", 2.0)]), "a"), 3.0);

    let script = lowered(json!({
        "inline_functions": [identity, square()],
        "statements": [assign("a", vec![call("id", vec![call("sq", vec![var("b")])])])]
    }));
    assert_eq!(render(&script), "(root (assignment a (compound b * b)))");
    assert_eq!(read(&script, &run(&script, &[("b", 3.0)]), "a"), 9.0);
}

#[test]
fn test_inline_transform_is_idempotent() {
    let mut script = lowered(json!({
        "inline_functions": [square()],
        "statements": [
            assign("a", vec![call("sq", vec![var("b")])]),
            assign("c", vec![call("sq", vec![constant(2.0)]), op("subtract"), var("a")]),
        ]
    }));
    let once = render(&script);
    let (result, _) = lower_with(&mut script, &FunctionRegistry::with_builtins());
    assert!(result.is_ok());
    assert_eq!(render(&script), once);
}

#[test]
fn test_unknown_inline_function_fails() {
    let codes = failed(json!({
        "statements": [assign("a", vec![call("missing", vec![])])]
    }));
    assert_eq!(codes, vec![ErrorCode::UnknownInlineFunction]);
}

#[test]
fn test_inline_argument_count_must_match() {
    let codes = failed(json!({
        "inline_functions": [square()],
        "statements": [assign("a", vec![call("sq", vec![var("b"), var("c")])])]
    }));
    assert_eq!(codes, vec![ErrorCode::ParameterMismatch]);
}

#[test]
fn test_recursive_inline_function_is_rejected() {
    let codes = failed(json!({
        "inline_functions": [inline("r", &["p"], vec![ret(vec![call("r", vec![var("p")])])])],
        "statements": [assign("a", vec![call("r", vec![var("b")])])]
    }));
    assert_eq!(codes, vec![ErrorCode::InlineRecursion]);
}

#[test]
fn test_value_call_without_return_fails() {
    let codes = failed(json!({
        "inline_functions": [inline("noop", &[], vec![assign("t", vec![constant(1.0)])])],
        "statements": [assign("a", vec![call("noop", vec![])])]
    }));
    assert_eq!(codes, vec![ErrorCode::MalformedInline]);
}

// ============================================================================
// Indexers
// ============================================================================

fn indexed(name: &str, accessors: &[&str]) -> Value {
    json!({ "kind": "variable", "identifier": name, "indexers": accessors })
}

#[test]
fn test_write_indexer_becomes_index_write() {
    let script = lowered(json!({
        "variables": [{ "name": "v", "vector_size": 4 }],
        "statements": [{
            "kind": "assignment", "identifier": "v", "indexers": ["y"],
            "children": [constant(5.0)]
        }]
    }));
    assert_eq!(render(&script), "(root (assignment v.y 5))");
}

#[test]
fn test_read_indexer_becomes_index_call() {
    let script = lowered(json!({
        "variables": [{ "name": "v", "vector_size": 4 }],
        "statements": [
            { "kind": "assignment", "identifier": "v", "indexers": ["g"], "children": [constant(5.0)] },
            assign("a", vec![indexed("v", &["g"]), op("add"), constant(1.0)])
        ]
    }));
    assert_eq!(
        render(&script),
        "(root (assignment v.y 5) (assignment a (call index_y v) + 1))"
    );
    assert_eq!(read(&script, &run(&script, &[]), "a"), 6.0);
}

#[test]
fn test_chained_indexers_are_rejected() {
    let codes = failed(json!({
        "variables": [{ "name": "v", "vector_size": 4 }],
        "statements": [assign("a", vec![indexed("v", &["x", "y"])])]
    }));
    assert_eq!(codes, vec![ErrorCode::MalformedIndexer]);
}

#[test]
fn test_multi_component_accessor_is_rejected() {
    let codes = failed(json!({
        "variables": [{ "name": "v", "vector_size": 4 }],
        "statements": [assign("a", vec![indexed("v", &["xy"])])]
    }));
    assert_eq!(codes, vec![ErrorCode::MalformedIndexer]);
}

#[test]
fn test_unregistered_index_read_fails() {
    let mut registry = FunctionRegistry::with_builtins();
    registry.unregister(Builtin::IndexZ);
    let mut script = Script::from_value(json!({
        "variables": [{ "name": "v", "vector_size": 4 }],
        "statements": [assign("a", vec![indexed("v", &["z"])])]
    }))
    .unwrap();
    let (result, diagnostics) = lower_with(&mut script, &registry);
    assert!(result.is_err());
    let codes: Vec<ErrorCode> = diagnostics.errors().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::UnresolvedFunction]);
}

#[test]
fn test_inline_call_indexer_moves_to_value() {
    let script = lowered(json!({
        "variables": [{ "name": "v", "vector_size": 4 }],
        "inline_functions": [inline("id", &["p"], vec![ret(vec![var("p")])])],
        "statements": [assign("a", vec![json!({
            "kind": "inline_call", "identifier": "id", "indexers": ["w"],
            "children": [var("v")]
        })])]
    }));
    assert_eq!(render(&script), "(root (assignment a (call index_w v)))");
}

// ============================================================================
// Builtin calls
// ============================================================================

fn builtin_call(builtin: &str, arguments: Vec<Value>) -> Value {
    json!({ "kind": "call", "builtin": builtin, "children": arguments })
}

#[test]
fn test_builtin_call_within_arity_is_kept() {
    let script = lowered(json!({
        "statements": [assign("a", vec![builtin_call("add_all", vec![var("b"), var("c"), constant(1.0)])])]
    }));
    assert_eq!(render(&script), "(root (assignment a (call adda b c 1)))");
    assert_eq!(read(&script, &run(&script, &[("b", 2.0), ("c", 3.0)]), "a"), 6.0);
}

#[test]
fn test_builtin_call_arity_is_checked() {
    let codes = failed(json!({
        "statements": [
            assign("a", vec![builtin_call("add_all", vec![])]),
            assign("b", vec![builtin_call("multiply_all", vec![var("c")])]),
            assign("d", vec![builtin_call("index_x", vec![var("c"), var("e")])]),
        ]
    }));
    assert_eq!(codes, vec![ErrorCode::ParameterMismatch; 3]);
}

#[test]
fn test_unregistered_builtin_call_fails() {
    let mut registry = FunctionRegistry::with_builtins();
    registry.unregister(Builtin::DivideAll);
    let mut script = Script::from_value(json!({
        "statements": [assign("a", vec![builtin_call("divide_all", vec![var("b"), var("c")])])]
    }))
    .unwrap();
    let (result, diagnostics) = lower_with(&mut script, &registry);
    assert!(result.is_err());
    let codes: Vec<ErrorCode> = diagnostics.errors().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::UnresolvedFunction]);
}
