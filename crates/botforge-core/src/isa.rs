//! Reference instruction set and the immutable bytecode container.
//!
//! Every instruction is eight bytes: `[opcode, a, b, c, imm (i32 LE)]`.
//! `a`, `b` and `c` name registers; `imm` is an immediate, an absolute
//! instruction index for control flow, a byte offset for memory access, or an
//! external-function id for `ext`.
//!
//! | opcode | effect |
//! |---|---|
//! | `li a, imm` | `r[a] = imm` |
//! | `mov a, b` | `r[a] = r[b]` |
//! | `addi a, b, imm` | `r[a] = r[b] + imm` (wrapping) |
//! | `add`..`shr a, b, c` | `r[a] = r[b] op r[c]` (wrapping, signed div/rem) |
//! | `fadd`..`fdiv a, b, c` | `f32` arithmetic on the register bits |
//! | `itof` / `ftoi a, b` | explicit int/float conversion |
//! | `eq` / `lt` / `le` / `flt a, b, c` | `r[a] = (r[b] op r[c]) as u32` |
//! | `jmp imm`, `jz a, imm`, `jnz a, imm` | absolute jumps |
//! | `ld` / `ldb a, b, imm` | load word / byte from `r[b] + imm` |
//! | `st` / `stb a, b, imm` | store word / byte `r[a]` to `r[b] + imm` |
//! | `push a`, `pop a`, `call imm`, `ret` | stack operations |
//! | `ext imm` | call external function `imm` |
//! | `crash a` | user crash with message pointer `r[a]` |
//! | `yield` | end this tick's slice early |
//! | `halt` | stop the program |

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Width of one encoded instruction in bytes.
pub const INSTRUCTION_SIZE: usize = 8;

/// Number of general-purpose registers.
pub const REGISTER_COUNT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    Halt = 1,
    Crash = 2,
    Li = 3,
    Mov = 4,
    Addi = 5,
    Add = 6,
    Sub = 7,
    Mul = 8,
    Div = 9,
    Rem = 10,
    And = 11,
    Or = 12,
    Xor = 13,
    Shl = 14,
    Shr = 15,
    FAdd = 16,
    FSub = 17,
    FMul = 18,
    FDiv = 19,
    ItoF = 20,
    FtoI = 21,
    Eq = 22,
    Lt = 23,
    Le = 24,
    FLt = 25,
    Jmp = 26,
    Jz = 27,
    Jnz = 28,
    Ld = 29,
    St = 30,
    Ldb = 31,
    Stb = 32,
    Push = 33,
    Pop = 34,
    Call = 35,
    Ret = 36,
    Ext = 37,
    Yield = 38,
}

impl Opcode {
    /// Every opcode, in encoding order.
    pub const ALL: [Opcode; 39] = [
        Opcode::Nop,
        Opcode::Halt,
        Opcode::Crash,
        Opcode::Li,
        Opcode::Mov,
        Opcode::Addi,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Rem,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Shl,
        Opcode::Shr,
        Opcode::FAdd,
        Opcode::FSub,
        Opcode::FMul,
        Opcode::FDiv,
        Opcode::ItoF,
        Opcode::FtoI,
        Opcode::Eq,
        Opcode::Lt,
        Opcode::Le,
        Opcode::FLt,
        Opcode::Jmp,
        Opcode::Jz,
        Opcode::Jnz,
        Opcode::Ld,
        Opcode::St,
        Opcode::Ldb,
        Opcode::Stb,
        Opcode::Push,
        Opcode::Pop,
        Opcode::Call,
        Opcode::Ret,
        Opcode::Ext,
        Opcode::Yield,
    ];

    /// Assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Halt => "halt",
            Opcode::Crash => "crash",
            Opcode::Li => "li",
            Opcode::Mov => "mov",
            Opcode::Addi => "addi",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Rem => "rem",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::FAdd => "fadd",
            Opcode::FSub => "fsub",
            Opcode::FMul => "fmul",
            Opcode::FDiv => "fdiv",
            Opcode::ItoF => "itof",
            Opcode::FtoI => "ftoi",
            Opcode::Eq => "eq",
            Opcode::Lt => "lt",
            Opcode::Le => "le",
            Opcode::FLt => "flt",
            Opcode::Jmp => "jmp",
            Opcode::Jz => "jz",
            Opcode::Jnz => "jnz",
            Opcode::Ld => "ld",
            Opcode::St => "st",
            Opcode::Ldb => "ldb",
            Opcode::Stb => "stb",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Ext => "ext",
            Opcode::Yield => "yield",
        }
    }

    pub fn from_mnemonic(text: &str) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| op.mnemonic() == text)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = CoreError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .get(byte as usize)
            .copied()
            .ok_or(CoreError::UnknownOpcode { opcode: byte })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Opcode,
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub imm: i32,
}

impl Instruction {
    pub const fn new(op: Opcode, a: u8, b: u8, c: u8, imm: i32) -> Self {
        Instruction { op, a, b, c, imm }
    }

    /// Instruction with no operands.
    pub const fn bare(op: Opcode) -> Self {
        Instruction::new(op, 0, 0, 0, 0)
    }

    pub fn encode(&self) -> [u8; INSTRUCTION_SIZE] {
        let imm = self.imm.to_le_bytes();
        [
            self.op as u8,
            self.a,
            self.b,
            self.c,
            imm[0],
            imm[1],
            imm[2],
            imm[3],
        ]
    }

    pub fn decode(bytes: &[u8; INSTRUCTION_SIZE]) -> Result<Self, CoreError> {
        let op = Opcode::try_from(bytes[0])?;
        for &reg in &bytes[1..4] {
            if reg as usize >= REGISTER_COUNT {
                return Err(CoreError::InvalidRegister { index: reg });
            }
        }
        Ok(Instruction {
            op,
            a: bytes[1],
            b: bytes[2],
            c: bytes[3],
            imm: i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} r{}, r{}, r{}, {}",
            self.op, self.a, self.b, self.c, self.imm
        )
    }
}

/// Immutable, shareable program image.
///
/// Cloning is cheap; a recompilation produces a new `Bytecode` instead of
/// mutating an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bytecode {
    bytes: Arc<[u8]>,
}

impl Bytecode {
    /// Wraps raw bytes, checking that they hold whole instructions.
    pub fn new(bytes: Vec<u8>) -> Result<Self, CoreError> {
        if bytes.len() % INSTRUCTION_SIZE != 0 {
            return Err(CoreError::MalformedBytecode {
                len: bytes.len(),
                width: INSTRUCTION_SIZE,
            });
        }
        Ok(Bytecode {
            bytes: bytes.into(),
        })
    }

    /// Encodes a sequence of decoded instructions.
    pub fn from_instructions(instructions: &[Instruction]) -> Self {
        let mut bytes = Vec::with_capacity(instructions.len() * INSTRUCTION_SIZE);
        for instruction in instructions {
            bytes.extend_from_slice(&instruction.encode());
        }
        Bytecode {
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / INSTRUCTION_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decodes the instruction at index `pc`. `None` past the end.
    pub fn fetch(&self, pc: u32) -> Option<Result<Instruction, CoreError>> {
        let start = (pc as usize).checked_mul(INSTRUCTION_SIZE)?;
        let chunk = self.bytes.get(start..start + INSTRUCTION_SIZE)?;
        let mut raw = [0u8; INSTRUCTION_SIZE];
        raw.copy_from_slice(chunk);
        Some(Instruction::decode(&raw))
    }
}

/// Maps instruction indices back to source lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    /// Source files contributing to the program, root first.
    pub files: Vec<String>,
    /// For each instruction: (index into `files`, zero-based line).
    pub lines: Vec<(u16, u32)>,
}

impl DebugInfo {
    /// `path:line` (one-based) for the instruction at `pc`.
    pub fn location(&self, pc: u32) -> Option<String> {
        let &(file, line) = self.lines.get(pc as usize)?;
        let path = self.files.get(file as usize)?;
        Some(format!("{}:{}", path, line + 1))
    }
}
