//! LaneScript compiler.
//!
//! Unified entry point for the compile-time pipeline:
//!
//! ```text
//! JSON description → Script → transform → optimize → emit → strip nops
//!                                                          → bytes + labels
//! ```
//!
//! Every stage records node-scoped diagnostics into one collector. A
//! compilation that fails returns those diagnostics and no bytecode.

pub mod error;
pub mod options;
pub mod pipeline;

pub use error::{CompileError, CompileFailure};
pub use options::CompilerOptions;
pub use pipeline::{compile, compile_json, lower, CompileStats, CompiledScript};
