//! Shared data model for botforge programmable machines.
//!
//! Everything the compilation scheduler, the execution engine and the
//! simulation bridges agree on lives here: identifiers, diagnostics, the
//! reference instruction set, the per-entity memory image and the fixed
//! register layout of the memory-mapped peripheral bus.

pub mod abi;
pub mod diagnostics;
pub mod error;
pub mod geometry;
pub mod id;
pub mod isa;
pub mod memory;
pub mod peripheral;

// Re-export commonly used types
pub use abi::{ExternalSignature, ABI_FAILURE, ABI_OK};
pub use diagnostics::{Diagnostic, Severity, TextPosition, TextRange};
pub use error::CoreError;
pub use geometry::{Transform, Vec2};
pub use id::{EntityId, PeerId, SourceId, TeamId, Version};
pub use isa::{Bytecode, DebugInfo, Instruction, Opcode};
pub use memory::{MemoryFault, MemoryImage};
pub use peripheral::{PeripheralKind, PeripheralRegs, TechHash};
