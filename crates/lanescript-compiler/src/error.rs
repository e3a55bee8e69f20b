//! Compilation errors.

use lanescript_ast::{BuildError, Diagnostics};
use lanescript_bytecode::{EmitError, IrError};
use lanescript_lower::LowerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    /// The script description could not be turned into a tree.
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Lower(#[from] LowerError),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error(transparent)]
    Ir(#[from] IrError),

    /// An options file could not be read.
    #[error("invalid compiler options: {0}")]
    Options(#[from] serde_json::Error),
}

/// A failed compilation with everything reported along the way.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct CompileFailure {
    #[source]
    pub error: CompileError,
    pub diagnostics: Diagnostics,
}

impl CompileFailure {
    pub fn new(error: impl Into<CompileError>, diagnostics: Diagnostics) -> Self {
        Self {
            error: error.into(),
            diagnostics,
        }
    }
}
