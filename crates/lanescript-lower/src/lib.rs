//! LaneScript lowering stages.
//!
//! Compile-time passes that run over a [`Script`](lanescript_ast::Script)
//! before code generation:
//!
//! ```text
//! Build → Transform → Optimize → Emit
//!         ^^^^^^^^^   ^^^^^^^^
//! ```
//!
//! - [`transform`]: lowers switch, for, inline calls, nested compounds and
//!   swizzle indexers into primitive nodes
//! - [`optimize`]: folds same-operator arithmetic runs into fused calls
//! - [`reference`]: single-lane tree evaluator for lowered trees
//!
//! Both stages record node-scoped diagnostics and keep going; the stage
//! result is an error if any node failed.

pub mod error;
pub mod optimize;
pub mod options;
pub mod reference;
pub mod transform;

pub use error::{EvalError, LowerError, Result};
pub use optimize::{fuse_range, optimize, FoldError, OptimizeStats};
pub use options::{SequenceOptions, TransformOptions};
pub use reference::{evaluate, EvalResult, Evaluator, Memory, Value};
pub use transform::{transform, TransformStats};
