//! Per-call execution context for scoped external functions.
//!
//! The host hands the engine a [`HostContext`] for each entity it ticks. The
//! engine pairs it with the processor's own queues to form an
//! [`EntityScope`], which lives exactly as long as that entity's slice of
//! the tick. Nothing in here outlives the borrow it was built from.

use serde::{Deserialize, Serialize};

use botforge_core::{EntityId, TeamId, Transform, Vec2};

use super::gui::GuiRegistry;
use super::pendrive::Pendrive;
use crate::processor::ProcessorQueues;

/// Debug primitives one tick may emit across all entities.
pub const MAX_DEBUG_ITEMS: usize = 256;

/// Whether a call happens on behalf of an entity.
pub enum ExecutionContext<'ctx> {
    /// No entity: only memory-local functions work.
    Detached,
    Entity(EntityScope<'ctx>),
}

/// Host-side state an entity's programs may touch this tick.
pub struct HostContext<'h> {
    pub entity: EntityId,
    pub team: TeamId,
    pub transform: Transform,
    pub wall_clock_ms: u64,
    pub outbox: &'h mut HostOutbox,
    pub gui: &'h mut GuiRegistry,
    pub pendrive: Option<&'h mut Pendrive>,
}

impl<'h> HostContext<'h> {
    /// Joins the host state with the processor's queues.
    pub fn into_scope<'s>(self, queues: &'s mut ProcessorQueues) -> EntityScope<'s>
    where
        'h: 's,
    {
        EntityScope {
            entity: self.entity,
            team: self.team,
            transform: self.transform,
            wall_clock_ms: self.wall_clock_ms,
            queues,
            outbox: self.outbox,
            gui: self.gui,
            pendrive: self.pendrive,
        }
    }
}

/// Everything a scoped function can reach for the calling entity.
pub struct EntityScope<'ctx> {
    pub entity: EntityId,
    pub team: TeamId,
    pub transform: Transform,
    pub wall_clock_ms: u64,
    pub queues: &'ctx mut ProcessorQueues,
    pub outbox: &'ctx mut HostOutbox,
    pub gui: &'ctx mut GuiRegistry,
    pub pendrive: Option<&'ctx mut Pendrive>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugLine {
    pub entity: EntityId,
    pub from: Vec2,
    pub to: Vec2,
    pub color: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugLabel {
    pub entity: EntityId,
    pub position: Vec2,
    pub text: String,
}

/// Debug output collected during a tick. The host drains it afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostOutbox {
    pub debug_lines: Vec<DebugLine>,
    pub debug_labels: Vec<DebugLabel>,
}

impl HostOutbox {
    pub fn new() -> Self {
        HostOutbox::default()
    }

    pub fn is_full(&self) -> bool {
        self.debug_lines.len() + self.debug_labels.len() >= MAX_DEBUG_ITEMS
    }

    pub fn clear(&mut self) {
        self.debug_lines.clear();
        self.debug_labels.clear();
    }
}
