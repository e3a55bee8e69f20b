//! Kernel argument errors.
//!
//! Numeric outcomes (NaN, infinities) are never errors; these cover only
//! arguments rejected before a kernel loop starts.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KernelError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    /// The batch is larger than an operand.
    #[error("batch of {needed} lane(s) exceeds the {available} an operand holds")]
    LaneCount { needed: usize, available: usize },

    #[error("vector width {0} is outside 1..=4")]
    Width(usize),

    /// A field does not fit inside the lane record.
    #[error("field {offset}..{end} does not fit a record of {record_len} float(s)")]
    FieldOutOfRecord {
        offset: usize,
        end: usize,
        record_len: usize,
    },

    #[error("component {0} is outside x..w")]
    Component(usize),

    #[error("lane {lane} has no element {index}")]
    OutOfRange { lane: usize, index: usize },

    #[error("a fold needs at least one operand")]
    NoOperands,

    #[error("invalid kernel config: {0}")]
    InvalidConfig(String),
}
