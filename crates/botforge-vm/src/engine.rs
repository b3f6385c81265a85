//! Per-tick execution decisions.
//!
//! For each processor the engine decides between doing nothing, reloading
//! a newer program, or running one budgeted slice:
//!
//! 1. No runnable record (unbound, still compiling, or failed): idle.
//! 2. The record's version differs from the bound version: reload. Nothing
//!    executes on the reload tick.
//! 3. A signal is set: idle until reload or a source change.
//! 4. Otherwise run up to `instruction_budget` instructions.
//!
//! Traps are recorded on the processor and never propagate further.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use botforge_core::{DebugInfo, EntityId, Version};

use crate::abi::context::{ExecutionContext, HostContext};
use crate::abi::ExternalTable;
use crate::machine::{Machine, RunOutcome};
use crate::processor::ProcessorState;
use crate::signal::{Signal, Trap};

/// Configuration for the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum instructions per processor per tick.
    pub instruction_budget: u32,
    /// Whether to record an instruction trace.
    pub trace_enabled: bool,
    /// Trace entries kept per tick.
    pub trace_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            instruction_budget: 256,
            trace_enabled: false,
            trace_capacity: 64,
        }
    }
}

/// What happened to one processor during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Reloaded { version: Version },
    Executed { instructions: u32, yielded: bool },
    Signaled { signal: Signal, instructions: u32 },
}

pub struct ExecutionEngine {
    config: EngineConfig,
    externals: Arc<ExternalTable>,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig, externals: Arc<ExternalTable>) -> Self {
        ExecutionEngine { config, externals }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn externals(&self) -> &Arc<ExternalTable> {
        &self.externals
    }

    /// Advances one processor by one tick. `host` is `None` for processors
    /// that run without an entity (tests, headless checks).
    pub fn tick(&self, processor: &mut ProcessorState, host: Option<HostContext<'_>>) -> TickOutcome {
        let runnable = processor
            .record
            .as_ref()
            .and_then(|record| record.read().runnable());
        let Some((version, program)) = runnable else {
            return TickOutcome::Idle;
        };

        if version != processor.bound_version {
            processor.reload(version);
            debug!(%version, "processor reloaded");
            return TickOutcome::Reloaded { version };
        }
        if !processor.signal.is_none() {
            return TickOutcome::Idle;
        }

        let entity = host.as_ref().map(|host| host.entity);
        let ProcessorState {
            registers,
            memory,
            queues,
            trace,
            ..
        } = processor;
        let mut context = match host {
            Some(host) => ExecutionContext::Entity(host.into_scope(queues)),
            None => ExecutionContext::Detached,
        };
        let trace = if self.config.trace_enabled {
            trace.reset(self.config.trace_capacity);
            Some(trace)
        } else {
            None
        };
        let report = Machine {
            registers,
            memory,
            bytecode: &program.bytecode,
            externals: &self.externals,
            context: &mut context,
            trace,
        }
        .run(self.config.instruction_budget);

        match report.outcome {
            RunOutcome::BudgetExhausted => TickOutcome::Executed {
                instructions: report.executed,
                yielded: false,
            },
            RunOutcome::Yielded => TickOutcome::Executed {
                instructions: report.executed,
                yielded: true,
            },
            RunOutcome::Stopped(trap) => {
                let signal = raise(processor, &trap, &program.debug_info, entity);
                TickOutcome::Signaled {
                    signal,
                    instructions: report.executed,
                }
            }
        }
    }
}

/// Records a trap on the processor and points the crash context at a
/// readable message.
fn raise(processor: &mut ProcessorState, trap: &Trap, debug_info: &DebugInfo, entity: Option<EntityId>) -> Signal {
    let signal = trap.signal();
    processor.signal = signal;
    processor.crash_context = match trap {
        Trap::Halt => None,
        Trap::UserCrash { message, .. } => Some(*message),
        _ => {
            let text = match trap.pc().and_then(|pc| debug_info.location(pc)) {
                Some(location) => format!("{} ({})", trap, location),
                None => trap.to_string(),
            };
            Some(processor.memory.system_regs().set_crash_message(&text))
        }
    };

    let entity = entity.map(|id| id.0);
    match signal {
        Signal::Halt => debug!(?entity, "program halted"),
        _ => {
            let message = processor.crash_message().unwrap_or_default();
            info!(?entity, ?signal, %message, "program crashed");
        }
    }
    signal
}
