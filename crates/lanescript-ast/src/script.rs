//! A script under compilation: tree plus symbol tables.

use tracing::debug;

use crate::arena::Ast;
use crate::builder::{BuildError, ScriptSpec, TreeBuilder};
use crate::inline::InlineFunctions;
use crate::variables::Variables;

/// Everything the lowering stages mutate for one script.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub ast: Ast,
    pub variables: Variables,
    pub inline_functions: InlineFunctions,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a script from its description.
    ///
    /// Declared variables are registered first so their widths win over
    /// first use. Inline definitions become detached templates in the same
    /// arena.
    pub fn from_spec(spec: &ScriptSpec) -> Result<Self, BuildError> {
        let mut script = Script::new();
        for variable in &spec.variables {
            script.variables.declare(&variable.name, variable.vector_size);
        }

        for function in &spec.inline_functions {
            let mut body = Vec::with_capacity(function.body.len());
            {
                let mut builder = TreeBuilder::new(&mut script.ast, &mut script.variables)
                    .with_formals(&function.parameters);
                for statement in &function.body {
                    body.push(builder.build(statement)?);
                }
            }
            let parameters: Vec<&str> = function.parameters.iter().map(String::as_str).collect();
            script.inline_functions.define(
                &mut script.ast,
                &function.identifier,
                &parameters,
                &body,
            )?;
        }

        let root = script.ast.root();
        let mut builder = TreeBuilder::new(&mut script.ast, &mut script.variables);
        let mut statements = Vec::with_capacity(spec.statements.len());
        for statement in &spec.statements {
            statements.push(builder.build(statement)?);
        }
        script.ast.insert_children(root, 0, &statements)?;

        debug!(
            nodes = script.ast.len(),
            variables = script.variables.len(),
            inline_functions = script.inline_functions.len(),
            "built script"
        );
        Ok(script)
    }

    pub fn from_json(text: &str) -> Result<Self, BuildError> {
        let spec: ScriptSpec = serde_json::from_str(text)?;
        Self::from_spec(&spec)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, BuildError> {
        let spec: ScriptSpec = serde_json::from_value(value)?;
        Self::from_spec(&spec)
    }
}
