//! Opcode byte assignments.
//!
//! Every instruction is one byte. Fixed opcodes occupy `0x00..0x80`; a byte
//! at or above [`VARIABLE_BASE`] names variable slot `byte - VARIABLE_BASE`.
//! Fused calls are followed by one raw argument-count byte.
//!
//! # Statement encoding
//!
//! ```text
//! assign  <var> [write_c] <expr...> end_expr
//! branch  offset <expr...> end_expr        ; jump when the condition is false
//! jump    offset
//! nop                                      ; carries target labels
//! ```
//!
//! Expressions are written in source order: operands, operator tokens,
//! `open`/`close` around compounds and `<call> <argc> <args...>` for calls.

use lanescript_ast::{Builtin, Component, Operator};
use serde::{Deserialize, Serialize};

/// First byte used for variable references.
pub const VARIABLE_BASE: u8 = 0x80;

/// Number of variable slots addressable by one byte.
pub const MAX_VARIABLES: usize = (u8::MAX - VARIABLE_BASE) as usize + 1;

/// Fixed instruction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Opcode {
    // === Structure ===
    /// Does nothing. Holds labels whose target has no instruction yet.
    Nop = 0x00,
    /// Terminates an expression.
    EndExpr = 0x01,
    /// Starts an assignment; the next byte is the target variable.
    Assign = 0x02,
    /// Restricts the enclosing assignment to component x.
    WriteX = 0x03,
    WriteY = 0x04,
    WriteZ = 0x05,
    WriteW = 0x06,
    /// Opens a parenthesized sub-expression.
    Open = 0x07,
    /// Closes a parenthesized sub-expression.
    Close = 0x08,
    /// End of program.
    Halt = 0x09,

    // === Operators ===
    Add = 0x10,
    Subtract = 0x11,
    Multiply = 0x12,
    Divide = 0x13,
    Equals = 0x14,
    NotEquals = 0x15,
    Greater = 0x16,
    GreaterEquals = 0x17,
    Smaller = 0x18,
    SmallerEquals = 0x19,
    And = 0x1a,
    Or = 0x1b,
    Xor = 0x1c,
    Not = 0x1d,

    // === Common constants ===
    ConstZero = 0x20,
    ConstOne = 0x21,
    ConstTwo = 0x22,
    ConstMinusOne = 0x23,
    ConstHalf = 0x24,

    // === Builtin calls ===
    IndexX = 0x30,
    IndexY = 0x31,
    IndexZ = 0x32,
    IndexW = 0x33,
    /// Fused addition; followed by an argument count.
    AddAll = 0x34,
    SubtractAll = 0x35,
    MultiplyAll = 0x36,
    DivideAll = 0x37,

    // === Control ===
    /// Conditional jump taken when the following condition is false.
    Branch = 0x40,
    /// Unconditional jump.
    Jump = 0x41,
    /// Placeholder for a jump address, patched by the address resolver.
    Offset = 0x42,
}

impl Opcode {
    pub const ALL: [Opcode; 40] = [
        Opcode::Nop,
        Opcode::EndExpr,
        Opcode::Assign,
        Opcode::WriteX,
        Opcode::WriteY,
        Opcode::WriteZ,
        Opcode::WriteW,
        Opcode::Open,
        Opcode::Close,
        Opcode::Halt,
        Opcode::Add,
        Opcode::Subtract,
        Opcode::Multiply,
        Opcode::Divide,
        Opcode::Equals,
        Opcode::NotEquals,
        Opcode::Greater,
        Opcode::GreaterEquals,
        Opcode::Smaller,
        Opcode::SmallerEquals,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Not,
        Opcode::ConstZero,
        Opcode::ConstOne,
        Opcode::ConstTwo,
        Opcode::ConstMinusOne,
        Opcode::ConstHalf,
        Opcode::IndexX,
        Opcode::IndexY,
        Opcode::IndexZ,
        Opcode::IndexW,
        Opcode::AddAll,
        Opcode::SubtractAll,
        Opcode::MultiplyAll,
        Opcode::DivideAll,
        Opcode::Branch,
        Opcode::Jump,
        Opcode::Offset,
    ];

    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Decode a fixed opcode. Variable bytes and unassigned values yield `None`.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.byte() == byte)
    }

    pub fn from_operator(op: Operator) -> Self {
        match op {
            Operator::Add => Opcode::Add,
            Operator::Subtract => Opcode::Subtract,
            Operator::Multiply => Opcode::Multiply,
            Operator::Divide => Opcode::Divide,
            Operator::Equals => Opcode::Equals,
            Operator::NotEquals => Opcode::NotEquals,
            Operator::Greater => Opcode::Greater,
            Operator::GreaterEquals => Opcode::GreaterEquals,
            Operator::Smaller => Opcode::Smaller,
            Operator::SmallerEquals => Opcode::SmallerEquals,
            Operator::And => Opcode::And,
            Operator::Or => Opcode::Or,
            Operator::Xor => Opcode::Xor,
            Operator::Not => Opcode::Not,
        }
    }

    pub fn from_builtin(builtin: Builtin) -> Self {
        match builtin {
            Builtin::IndexX => Opcode::IndexX,
            Builtin::IndexY => Opcode::IndexY,
            Builtin::IndexZ => Opcode::IndexZ,
            Builtin::IndexW => Opcode::IndexW,
            Builtin::AddAll => Opcode::AddAll,
            Builtin::SubtractAll => Opcode::SubtractAll,
            Builtin::MultiplyAll => Opcode::MultiplyAll,
            Builtin::DivideAll => Opcode::DivideAll,
        }
    }

    pub fn write(component: Component) -> Self {
        match component {
            Component::X => Opcode::WriteX,
            Component::Y => Opcode::WriteY,
            Component::Z => Opcode::WriteZ,
            Component::W => Opcode::WriteW,
        }
    }

    /// Dedicated opcode for a frequent literal.
    ///
    /// Matches on the bit pattern, so `-0.0` is not a common constant.
    pub fn common_constant(value: f32) -> Option<Self> {
        const TABLE: [(f32, Opcode); 5] = [
            (0.0, Opcode::ConstZero),
            (1.0, Opcode::ConstOne),
            (2.0, Opcode::ConstTwo),
            (-1.0, Opcode::ConstMinusOne),
            (0.5, Opcode::ConstHalf),
        ];
        TABLE
            .iter()
            .find(|(constant, _)| constant.to_bits() == value.to_bits())
            .map(|&(_, op)| op)
    }

    /// Whether a raw argument-count byte follows this opcode.
    pub fn takes_argument_count(self) -> bool {
        matches!(
            self,
            Opcode::AddAll | Opcode::SubtractAll | Opcode::MultiplyAll | Opcode::DivideAll
        )
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::EndExpr => "end_expr",
            Opcode::Assign => "assign",
            Opcode::WriteX => "write_x",
            Opcode::WriteY => "write_y",
            Opcode::WriteZ => "write_z",
            Opcode::WriteW => "write_w",
            Opcode::Open => "open",
            Opcode::Close => "close",
            Opcode::Halt => "halt",
            Opcode::Add => "add",
            Opcode::Subtract => "sub",
            Opcode::Multiply => "mul",
            Opcode::Divide => "div",
            Opcode::Equals => "eq",
            Opcode::NotEquals => "ne",
            Opcode::Greater => "gt",
            Opcode::GreaterEquals => "ge",
            Opcode::Smaller => "lt",
            Opcode::SmallerEquals => "le",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Not => "not",
            Opcode::ConstZero => "const_0",
            Opcode::ConstOne => "const_1",
            Opcode::ConstTwo => "const_2",
            Opcode::ConstMinusOne => "const_m1",
            Opcode::ConstHalf => "const_half",
            Opcode::IndexX => "index_x",
            Opcode::IndexY => "index_y",
            Opcode::IndexZ => "index_z",
            Opcode::IndexW => "index_w",
            Opcode::AddAll => "adda",
            Opcode::SubtractAll => "suba",
            Opcode::MultiplyAll => "mula",
            Opcode::DivideAll => "diva",
            Opcode::Branch => "branch",
            Opcode::Jump => "jump",
            Opcode::Offset => "offset",
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op.byte()
    }
}

/// Byte referring to variable slot `index`, if addressable.
pub fn variable_byte(index: usize) -> Option<u8> {
    (index < MAX_VARIABLES).then(|| VARIABLE_BASE + index as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_opcode_bytes_are_unique_and_below_variable_base() {
        let bytes: HashSet<u8> = Opcode::ALL.iter().map(|op| op.byte()).collect();
        assert_eq!(bytes.len(), Opcode::ALL.len());
        assert!(bytes.iter().all(|&b| b < VARIABLE_BASE));
    }

    #[test]
    fn test_from_byte_round_trips_fixed_opcodes() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_byte(op.byte()), Some(op));
        }
        assert_eq!(Opcode::from_byte(0x7f), None);
        assert_eq!(Opcode::from_byte(VARIABLE_BASE), None);
    }

    #[test]
    fn test_common_constants_match_bit_patterns() {
        assert_eq!(Opcode::common_constant(0.0), Some(Opcode::ConstZero));
        assert_eq!(Opcode::common_constant(-0.0), None);
        assert_eq!(Opcode::common_constant(0.5), Some(Opcode::ConstHalf));
        assert_eq!(Opcode::common_constant(3.0), None);
    }

    #[test]
    fn test_variable_bytes() {
        assert_eq!(variable_byte(0), Some(0x80));
        assert_eq!(variable_byte(MAX_VARIABLES - 1), Some(0xff));
        assert_eq!(variable_byte(MAX_VARIABLES), None);
    }
}
