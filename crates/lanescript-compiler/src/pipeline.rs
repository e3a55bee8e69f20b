//! Stage orchestration.

use lanescript_ast::{Diagnostics, FunctionResolver, Script, Variables};
use lanescript_bytecode::{emit, InstructionList, LabelRecord};
use lanescript_lower::{optimize, transform, OptimizeStats, TransformStats};
use tracing::{info, instrument, trace};

use crate::error::{CompileError, CompileFailure};
use crate::options::CompilerOptions;

/// Per-stage counters for one compilation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileStats {
    pub transform: TransformStats,
    pub optimize: OptimizeStats,
    /// Nops removed after emission.
    pub nops_stripped: usize,
}

/// Output of a successful compilation.
#[derive(Debug)]
pub struct CompiledScript {
    /// Serialized opcode bytes, ending in `halt`.
    pub code: Vec<u8>,
    /// Label positions for the address resolver.
    pub labels: Vec<LabelRecord>,
    /// The flat instruction list the bytes came from.
    pub instructions: InstructionList,
    /// Lowered tree and final variable layout, constant slots included.
    pub script: Script,
    /// Warnings recorded along the way.
    pub diagnostics: Diagnostics,
    pub stats: CompileStats,
}

impl CompiledScript {
    /// Data-segment layout: slot `i` is encoded as `VARIABLE_BASE + i`.
    pub fn variables(&self) -> &Variables {
        &self.script.variables
    }

    pub fn disassemble(&self) -> String {
        self.instructions.disassemble()
    }
}

/// Run transform and optimize in place.
///
/// Both stages always run to the end of the tree; the first one that
/// recorded an error stops the pipeline.
pub fn lower(
    script: &mut Script,
    resolver: &dyn FunctionResolver,
    options: &CompilerOptions,
    diagnostics: &mut Diagnostics,
) -> Result<CompileStats, CompileError> {
    options.validate()?;
    let transform = transform(script, resolver, &options.transform, diagnostics)?;
    let optimize = optimize(&mut script.ast, resolver, &options.sequence, diagnostics)?;
    Ok(CompileStats {
        transform,
        optimize,
        nops_stripped: 0,
    })
}

/// Compile a built script to bytecode.
#[instrument(skip_all, name = "compile")]
pub fn compile(
    mut script: Script,
    resolver: &dyn FunctionResolver,
    options: &CompilerOptions,
) -> Result<CompiledScript, CompileFailure> {
    let mut diagnostics = Diagnostics::new();

    let mut stats = match lower(&mut script, resolver, options, &mut diagnostics) {
        Ok(stats) => stats,
        Err(err) => return Err(CompileFailure::new(err, diagnostics)),
    };
    trace!(tree = %script.ast.render(script.ast.root()), "lowered");

    let mut instructions = match emit(&mut script, &options.emit) {
        Ok(list) => list,
        Err(err) => {
            diagnostics.log_error(err.node(), err.code(), err.to_string());
            return Err(CompileFailure::new(err, diagnostics));
        }
    };

    if options.strip_nops {
        stats.nops_stripped = match instructions.strip_nops(&mut diagnostics) {
            Ok(count) => count,
            Err(err) => return Err(CompileFailure::new(err, diagnostics)),
        };
    }

    let serialized = instructions
        .serialize()
        .and_then(|code| Ok((code, instructions.label_table()?)));
    let (code, labels) = match serialized {
        Ok(parts) => parts,
        Err(err) => return Err(CompileFailure::new(err, diagnostics)),
    };

    info!(
        bytes = code.len(),
        labels = labels.len(),
        variables = script.variables.len(),
        folds = stats.optimize.folds,
        warnings = diagnostics.len(),
        "compiled script"
    );

    Ok(CompiledScript {
        code,
        labels,
        instructions,
        script,
        diagnostics,
        stats,
    })
}

/// Build a script from its JSON description and compile it.
pub fn compile_json(
    text: &str,
    resolver: &dyn FunctionResolver,
    options: &CompilerOptions,
) -> Result<CompiledScript, CompileFailure> {
    let script = Script::from_json(text).map_err(|err| CompileFailure::new(err, Diagnostics::new()))?;
    compile(script, resolver, options)
}
