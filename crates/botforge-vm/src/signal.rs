//! Abnormal termination of a program.
//!
//! A [`Trap`] is what the interpreter raises; the [`Signal`] is what stays
//! on the processor afterwards. Neither ever escapes the entity: the engine
//! records the signal, writes a crash message and moves on to the next
//! entity.

use serde::{Deserialize, Serialize};

use botforge_core::MemoryFault;

/// Per-entity termination state. `None` means the program may run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    #[default]
    None,
    Halt,
    UserCrash,
    StackOverflow,
    UndefinedExternalFunction,
    IllegalInstruction,
    MemoryFault,
    DivideByZero,
}

impl Signal {
    pub fn is_none(self) -> bool {
        self == Signal::None
    }

    /// Whether the program stopped because something went wrong, as opposed
    /// to halting normally.
    pub fn is_crash(self) -> bool {
        !matches!(self, Signal::None | Signal::Halt)
    }
}

/// Trap conditions raised by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Trap {
    #[error("program halted")]
    Halt,

    #[error("program crashed at pc {pc}")]
    UserCrash { pc: u32, message: u32 },

    #[error("stack overflow at pc {pc}")]
    StackOverflow { pc: u32 },

    #[error("undefined external function {id} at pc {pc}")]
    UndefinedExternalFunction { pc: u32, id: i32 },

    #[error("illegal instruction at pc {pc}: {reason}")]
    IllegalInstruction { pc: u32, reason: String },

    #[error("memory fault at pc {pc}: {fault}")]
    MemoryFault { pc: u32, fault: MemoryFault },

    #[error("divide by zero at pc {pc}")]
    DivideByZero { pc: u32 },
}

impl Trap {
    pub fn signal(&self) -> Signal {
        match self {
            Trap::Halt => Signal::Halt,
            Trap::UserCrash { .. } => Signal::UserCrash,
            Trap::StackOverflow { .. } => Signal::StackOverflow,
            Trap::UndefinedExternalFunction { .. } => Signal::UndefinedExternalFunction,
            Trap::IllegalInstruction { .. } => Signal::IllegalInstruction,
            Trap::MemoryFault { .. } => Signal::MemoryFault,
            Trap::DivideByZero { .. } => Signal::DivideByZero,
        }
    }

    /// Instruction index the trap was raised at, if it has one.
    pub fn pc(&self) -> Option<u32> {
        match self {
            Trap::Halt => None,
            Trap::UserCrash { pc, .. }
            | Trap::StackOverflow { pc }
            | Trap::UndefinedExternalFunction { pc, .. }
            | Trap::IllegalInstruction { pc, .. }
            | Trap::MemoryFault { pc, .. }
            | Trap::DivideByZero { pc } => Some(*pc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halt_is_not_a_crash() {
        assert!(!Signal::Halt.is_crash());
        assert!(!Signal::None.is_crash());
        assert!(Signal::StackOverflow.is_crash());
    }

    #[test]
    fn traps_map_to_signals() {
        assert_eq!(Trap::DivideByZero { pc: 3 }.signal(), Signal::DivideByZero);
        assert_eq!(Trap::Halt.pc(), None);
        assert_eq!(
            Trap::UndefinedExternalFunction { pc: 9, id: 77 }.to_string(),
            "undefined external function 77 at pc 9"
        );
    }
}
