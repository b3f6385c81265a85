//! Execution trace recording.
//!
//! When tracing is enabled via [`EngineConfig::trace_enabled`], the engine
//! records a [`TraceEntry`] for every instruction executed during the most
//! recent tick, up to [`EngineConfig::trace_capacity`] entries.
//!
//! [`EngineConfig::trace_enabled`]: crate::EngineConfig::trace_enabled
//! [`EngineConfig::trace_capacity`]: crate::EngineConfig::trace_capacity

use botforge_core::isa::REGISTER_COUNT;
use botforge_core::Instruction;

/// A single executed instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub pc: u32,
    pub instruction: Instruction,
    /// General-purpose registers after the instruction ran.
    pub registers: [u32; REGISTER_COUNT],
}

/// Capped trace buffer for one tick.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    entries: Vec<TraceEntry>,
    capacity: usize,
}

impl Trace {
    pub fn new(capacity: usize) -> Self {
        Trace {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, entry: TraceEntry) {
        if self.entries.len() < self.capacity {
            self.entries.push(entry);
        }
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Empties the buffer for a new slice with the given cap.
    pub fn reset(&mut self, capacity: usize) {
        self.entries.clear();
        self.capacity = capacity;
    }
}
