//! Core error types for botforge-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of building bytecode and external-function signatures.

use thiserror::Error;

/// Core errors produced by the botforge-core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Bytecode length is not a whole number of instructions.
    #[error("malformed bytecode: {len} bytes is not a multiple of {width}")]
    MalformedBytecode { len: usize, width: usize },

    /// An opcode byte does not name any instruction.
    #[error("unknown opcode 0x{opcode:02x}")]
    UnknownOpcode { opcode: u8 },

    /// A register operand is outside the register file.
    #[error("register r{index} out of range")]
    InvalidRegister { index: u8 },

    /// An external-function signature breaks the byte-size contract.
    #[error("invalid signature for external '{name}': {reason}")]
    InvalidSignature { name: String, reason: String },
}
