//! The host entity table.
//!
//! A plain owned table standing in for a full ECS. Bridges iterate it
//! directly; the GUI registry and debug outbox live next to it so a
//! processor's scoped context can borrow them alongside its own entity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use botforge_core::{EntityId, Vec2};
use botforge_vm::abi::gui::GuiRegistry;
use botforge_vm::HostOutbox;

use crate::config::SimConfig;
use crate::entity::{Entity, EntitySpec};
use crate::projectile::Projectile;

/// A finite deposit that extractors draw from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub position: Vec2,
    pub amount: u32,
}

#[derive(Debug)]
pub struct World {
    pub(crate) entities: BTreeMap<EntityId, Entity>,
    next_id: u32,
    pub(crate) resources: Vec<ResourceNode>,
    pub(crate) projectiles: Vec<Projectile>,
    pub(crate) gui: GuiRegistry,
    pub(crate) outbox: HostOutbox,
}

impl Default for World {
    fn default() -> Self {
        World::new()
    }
}

impl World {
    pub fn new() -> Self {
        World {
            entities: BTreeMap::new(),
            next_id: 1,
            resources: Vec::new(),
            projectiles: Vec::new(),
            gui: GuiRegistry::new(),
            outbox: HostOutbox::new(),
        }
    }

    /// Creates an entity. Ids start at 1 and are never reused.
    pub fn spawn(&mut self, spec: EntitySpec, config: &SimConfig) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.entities.insert(id, Entity::from_spec(id, spec, config));
        id
    }

    /// Removes an entity and every GUI element it created. Dropping its
    /// processor releases its compilation record for collection.
    pub fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        let removed = self.gui.remove_owned_by(id);
        debug!(entity = id.0, gui_elements = removed, "entity despawned");
        Some(entity)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn add_resource(&mut self, position: Vec2, amount: u32) {
        self.resources.push(ResourceNode { position, amount });
    }

    pub fn resources(&self) -> &[ResourceNode] {
        &self.resources
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn gui(&self) -> &GuiRegistry {
        &self.gui
    }

    /// Debug lines and labels emitted during the last tick.
    pub fn outbox(&self) -> &HostOutbox {
        &self.outbox
    }
}
