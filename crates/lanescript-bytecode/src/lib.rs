//! LaneScript bytecode.
//!
//! - [`opcode`]: one-byte instruction encoding and variable addressing
//! - [`label`]: symbolic jump labels and the label table
//! - [`list`]: instruction lists with segments, label-preserving removal
//!   and nop stripping
//! - [`emitter`]: lowered AST → instruction list, serial or parallel
//!
//! Address resolution and the dispatch loop live outside this crate; they
//! consume [`InstructionList::serialize`] and
//! [`InstructionList::label_table`].

pub mod emitter;
pub mod error;
pub mod label;
pub mod list;
pub mod opcode;

pub use emitter::{emit, intern_constants, EmitOptions, Emitter};
pub use error::{EmitError, IrError};
pub use label::{JumpLabel, LabelKind, LabelRecord};
pub use list::{Instruction, InstructionList, Removal};
pub use opcode::{variable_byte, Opcode, MAX_VARIABLES, VARIABLE_BASE};
