//! Per-entity processor state.

use serde::{Deserialize, Serialize};

use botforge_compile::RecordHandle;
use botforge_core::peripheral::CRASH_MESSAGE_CAPACITY;
use botforge_core::{MemoryImage, PeripheralKind, PeripheralRegs, SourceId, Version};

use crate::abi::comms::Transmission;
use crate::machine::Registers;
use crate::queue::BoundedQueue;
use crate::signal::Signal;
use crate::trace::{Trace, TraceEntry};

/// Capacities of the per-processor queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueCapacities {
    pub inbound: usize,
    pub outbound: usize,
    pub commands: usize,
    pub stdin: usize,
    pub ui_events: usize,
}

impl Default for QueueCapacities {
    fn default() -> Self {
        QueueCapacities {
            inbound: 16,
            outbound: 8,
            commands: 16,
            stdin: 4,
            ui_events: 16,
        }
    }
}

/// Transient queues between the program and the host. Producers see a
/// failure when a queue is full.
#[derive(Debug, Clone)]
pub struct ProcessorQueues {
    /// Delivered transmissions, popped by `receive`.
    pub inbound: BoundedQueue<Transmission>,
    /// Transmissions waiting for delivery after the VM tick.
    pub outbound: BoundedQueue<Transmission>,
    /// Commands pushed by the owning player, popped by `next_command`.
    pub commands: BoundedQueue<Vec<u8>>,
    /// Lines typed into the console, delivered when the program asks.
    pub stdin: BoundedQueue<Vec<u8>>,
    /// Element ids of clicked GUI elements, popped by `gui_poll`.
    pub ui_events: BoundedQueue<u32>,
}

impl ProcessorQueues {
    pub fn new(capacities: &QueueCapacities) -> Self {
        ProcessorQueues {
            inbound: BoundedQueue::new(capacities.inbound),
            outbound: BoundedQueue::new(capacities.outbound),
            commands: BoundedQueue::new(capacities.commands),
            stdin: BoundedQueue::new(capacities.stdin),
            ui_events: BoundedQueue::new(capacities.ui_events),
        }
    }
}

impl Default for ProcessorQueues {
    fn default() -> Self {
        ProcessorQueues::new(&QueueCapacities::default())
    }
}

/// Execution state owned by one processor entity.
///
/// The processor references its program by [`SourceId`]; the simulation
/// binds it to the shared compilation record the first tick it is seen
/// unbound. The engine reloads whenever the record's version differs from
/// [`bound_version`](Self::bound_version).
#[derive(Debug)]
pub struct ProcessorState {
    pub(crate) source: Option<SourceId>,
    pub(crate) record: Option<RecordHandle>,
    pub(crate) bound_version: Version,
    pub(crate) registers: Registers,
    pub(crate) memory: MemoryImage,
    pub(crate) signal: Signal,
    pub(crate) crash_context: Option<u32>,
    pub(crate) peripheral: PeripheralKind,
    pub(crate) queues: ProcessorQueues,
    pub(crate) trace: Trace,
}

impl ProcessorState {
    pub fn new(peripheral: PeripheralKind, capacities: &QueueCapacities) -> Self {
        ProcessorState {
            source: None,
            record: None,
            bound_version: Version::NONE,
            registers: Registers::default(),
            memory: MemoryImage::new(),
            signal: Signal::None,
            crash_context: None,
            peripheral,
            queues: ProcessorQueues::new(capacities),
            trace: Trace::default(),
        }
    }

    pub fn with_source(mut self, source: SourceId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn source(&self) -> Option<&SourceId> {
        self.source.as_ref()
    }

    /// Points the processor at another program. The binding and any signal
    /// are dropped; the next tick rebinds and reloads.
    pub fn set_source(&mut self, source: Option<SourceId>) {
        self.source = source;
        self.record = None;
        self.bound_version = Version::NONE;
        self.signal = Signal::None;
        self.crash_context = None;
    }

    pub fn is_bound(&self) -> bool {
        self.record.is_some()
    }

    pub fn bind(&mut self, record: RecordHandle) {
        self.record = Some(record);
    }

    pub fn record(&self) -> Option<&RecordHandle> {
        self.record.as_ref()
    }

    pub fn bound_version(&self) -> Version {
        self.bound_version
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn memory(&self) -> &MemoryImage {
        &self.memory
    }

    /// Mapped memory for bridge systems.
    pub fn memory_mut(&mut self) -> &mut MemoryImage {
        &mut self.memory
    }

    pub fn peripheral(&self) -> PeripheralKind {
        self.peripheral
    }

    /// The archetype tail, typed for this processor's own peripheral.
    pub fn peripheral_regs(&mut self) -> PeripheralRegs<'_> {
        self.memory.peripheral_regs(self.peripheral)
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    pub fn crash_context(&self) -> Option<u32> {
        self.crash_context
    }

    /// Text at the crash-context pointer.
    pub fn crash_message(&self) -> Option<String> {
        let pointer = self.crash_context?;
        self.memory
            .read_c_string(pointer, CRASH_MESSAGE_CAPACITY)
            .ok()
    }

    pub fn queues(&self) -> &ProcessorQueues {
        &self.queues
    }

    pub fn queues_mut(&mut self) -> &mut ProcessorQueues {
        &mut self.queues
    }

    /// Instructions traced during the last executed tick.
    pub fn trace(&self) -> &[TraceEntry] {
        self.trace.entries()
    }

    /// Initial registers, zeroed program area, cleared signal.
    pub(crate) fn reload(&mut self, version: Version) {
        self.registers = Registers::default();
        self.memory.reset_program_area();
        self.signal = Signal::None;
        self.crash_context = None;
        self.bound_version = version;
        self.trace.clear();
    }
}
