//! Per-lane kernels for LaneScript.
//!
//! A host owns one record per lane in a [`LaneStorage`] and describes a
//! field of those records with a [`DataRec`]. Kernels apply one operation
//! across a batch of lanes, reading from records, dense [`TempBuffer`]s or
//! constants and writing to records or temps.
//!
//! ```text
//! aligned:  base + lane * stride + k
//! indexed:  table[lane] + offset + k
//! ```
//!
//! Loops are unrolled per the [`KernelConfig`] chosen when a
//! [`LaneKernels`] instance is built.

mod addr;
pub mod datarec;
pub mod error;
pub mod kernels;
pub mod operand;
pub mod storage;
pub mod strategy;
pub mod temp;

pub use datarec::{DataRec, DataType};
pub use error::{KernelError, Result};
pub use kernels::{BinaryOp, LaneKernels};
pub use operand::{Constant, Dest, Operand};
pub use storage::{LaneStorage, RECORD_ALIGNMENT};
pub use strategy::{KernelConfig, LoopStrategy};
pub use temp::TempBuffer;
