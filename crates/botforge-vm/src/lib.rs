//! Budgeted bytecode execution for processor entities.
//!
//! Every processor entity owns a register file, a 16 KiB memory image and a
//! handful of bounded message queues. Once per simulation tick the
//! [`ExecutionEngine`] runs at most `instruction_budget` instructions of the
//! entity's compiled program, reloading first whenever the program's version
//! changed. Programs reach the outside world through external functions
//! (`ext`) and through the memory-mapped peripheral registers that the
//! simulation's bridge systems service after the VM tick.
//!
//! # Architecture
//!
//! - [`ProcessorState`] -- per-entity registers, memory, signal and queues
//! - [`ExecutionEngine`] -- per-tick reload/execute decision
//! - [`machine`] -- the instruction interpreter itself
//! - [`abi`] -- external function table, per-call execution context and the
//!   standard functions
//! - [`Signal`] / [`Trap`] -- abnormal termination, recorded per entity
//! - [`TraceEntry`] -- optional per-instruction trace

pub mod abi;
pub mod engine;
pub mod machine;
pub mod processor;
pub mod queue;
pub mod signal;
pub mod trace;

pub use abi::context::{EntityScope, ExecutionContext, HostContext, HostOutbox};
pub use abi::{AbiError, ExternalTable, Invocation};
pub use engine::{EngineConfig, ExecutionEngine, TickOutcome};
pub use machine::{Registers, RunOutcome, RunReport};
pub use processor::{ProcessorQueues, ProcessorState, QueueCapacities};
pub use queue::BoundedQueue;
pub use signal::{Signal, Trap};
pub use trace::TraceEntry;
