//! Lowering configuration.

use serde::{Deserialize, Serialize};

use crate::error::LowerError;

/// AST transform settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    /// Inline expansions allowed per script. Exceeding it means a
    /// definition (directly or indirectly) calls itself.
    pub max_inline_expansions: usize,
}

impl TransformOptions {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), LowerError> {
        if self.max_inline_expansions == 0 {
            return Err(LowerError::InvalidOptions(
                "max_inline_expansions must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            max_inline_expansions: 256,
        }
    }
}

/// Sequence optimizer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceOptions {
    /// Run the optimizer at all.
    pub enabled: bool,
    /// Shortest run of identical operators worth fusing.
    pub min_run_length: usize,
    /// Partial-run folds attempted per sequence.
    pub max_iterations: usize,
}

impl SequenceOptions {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), LowerError> {
        if self.min_run_length == 0 {
            return Err(LowerError::InvalidOptions(
                "min_run_length must be > 0".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(LowerError::InvalidOptions(
                "max_iterations must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            min_run_length: 2,
            max_iterations: 10,
        }
    }
}
