//! Compiler configuration.

use lanescript_bytecode::EmitOptions;
use lanescript_lower::{LowerError, SequenceOptions, TransformOptions};
use serde::{Deserialize, Serialize};

use crate::error::CompileError;

/// Settings for every compile stage, loadable from JSON.
///
/// Missing sections fall back to their defaults:
///
/// ```
/// use lanescript_compiler::CompilerOptions;
///
/// let options = CompilerOptions::from_json(r#"{ "emit": { "parallel": false } }"#).unwrap();
/// assert!(!options.emit.parallel);
/// assert!(options.sequence.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    pub transform: TransformOptions,
    pub sequence: SequenceOptions,
    pub emit: EmitOptions,
    /// Drop nops left behind by label placement before serializing.
    pub strip_nops: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            transform: TransformOptions::default(),
            sequence: SequenceOptions::default(),
            emit: EmitOptions::default(),
            strip_nops: true,
        }
    }
}

impl CompilerOptions {
    pub fn from_json(text: &str) -> Result<Self, CompileError> {
        let options: Self = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), LowerError> {
        self.transform.validate()?;
        self.sequence.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(
            CompilerOptions::from_json("{}").unwrap(),
            CompilerOptions::default()
        );
    }

    #[test]
    fn test_invalid_section_rejected() {
        let err = CompilerOptions::from_json(r#"{ "sequence": { "min_run_length": 0 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::Lower(LowerError::InvalidOptions(_))
        ));
        assert!(matches!(
            CompilerOptions::from_json("[1]"),
            Err(CompileError::Options(_))
        ));
    }
}
