//! LaneScript AST model.
//!
//! Shared data structures for every compile-time stage:
//!
//! - [`Ast`]: arena-backed expression tree with index-based parent links
//! - [`Variables`]: ordered variable table, also the data-segment layout
//! - [`InlineFunctions`]: inline templates keyed by identifier
//! - [`FunctionResolver`]: host-supplied builtin metadata
//! - [`Diagnostics`]: node-scoped error and warning collector
//! - [`Script`]: the three tables above plus the tree, built from a
//!   [`ScriptSpec`] description
//!
//! # Example
//!
//! ```
//! use lanescript_ast::Script;
//!
//! let script = Script::from_json(r#"{
//!     "statements": [
//!         { "kind": "assignment", "identifier": "a", "children": [
//!             { "kind": "constant", "value": 1.0 }
//!         ]}
//!     ]
//! }"#).unwrap();
//! let root = script.ast.root();
//! assert_eq!(script.ast.render(root), "(root (assignment a 1))");
//! ```

pub mod arena;
pub mod builder;
pub mod diagnostics;
mod display;
pub mod error;
pub mod functions;
pub mod inline;
pub mod node;
pub mod script;
pub mod variables;

pub use arena::Ast;
pub use builder::{BuildError, NodeSpec, ScriptSpec, SpecKind, TreeBuilder};
pub use diagnostics::{Diagnostic, Diagnostics, ErrorCode, Severity};
pub use error::{AstError, AstResult};
pub use functions::{Builtin, FunctionInfo, FunctionRegistry, FunctionResolver, MAX_FUSED_OPERANDS};
pub use inline::{InlineFunction, InlineFunctions};
pub use node::{Callee, Component, Node, NodeId, NodeKind, Operand, Operator, Slot};
pub use script::Script;
pub use variables::{Variable, VariableId, Variables};
