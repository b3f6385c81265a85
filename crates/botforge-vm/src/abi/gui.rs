//! Team-owned GUI elements created by programs.
//!
//! The registry only stores element state; drawing it is the client's
//! business. Element ids start at 1 so that 0 can mean "no event" to
//! `gui_poll`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use botforge_core::{EntityId, TeamId, Vec2};

use super::{
    arg_f32, arg_u32, check_len, ids, put_u32, signature, AbiError, ExternalBody, ExternalTable,
    Invocation,
};

/// Longest element label.
pub const MAX_GUI_LABEL_LEN: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuiKind {
    Button,
    Label,
    Gauge,
}

impl GuiKind {
    pub fn from_code(code: u32) -> Option<GuiKind> {
        match code {
            0 => Some(GuiKind::Button),
            1 => Some(GuiKind::Label),
            2 => Some(GuiKind::Gauge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuiElement {
    pub owner: EntityId,
    pub team: TeamId,
    pub kind: GuiKind,
    pub position: Vec2,
    pub value: f32,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuiRegistry {
    elements: BTreeMap<u32, GuiElement>,
    next_id: u32,
}

impl Default for GuiRegistry {
    fn default() -> Self {
        GuiRegistry {
            elements: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl GuiRegistry {
    pub fn new() -> Self {
        GuiRegistry::default()
    }

    pub fn create(&mut self, owner: EntityId, team: TeamId, kind: GuiKind, position: Vec2) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.elements.insert(
            id,
            GuiElement {
                owner,
                team,
                kind,
                position,
                value: 0.0,
                label: String::new(),
            },
        );
        id
    }

    fn owned_mut(&mut self, team: TeamId, id: u32) -> Result<&mut GuiElement, AbiError> {
        let element = self
            .elements
            .get_mut(&id)
            .ok_or(AbiError::UnknownElement { id })?;
        if element.team != team {
            return Err(AbiError::NotOwner { id });
        }
        Ok(element)
    }

    pub fn update(&mut self, team: TeamId, id: u32, value: f32, label: String) -> Result<(), AbiError> {
        let element = self.owned_mut(team, id)?;
        element.value = value;
        element.label = label;
        Ok(())
    }

    pub fn destroy(&mut self, team: TeamId, id: u32) -> Result<GuiElement, AbiError> {
        self.owned_mut(team, id)?;
        self.elements
            .remove(&id)
            .ok_or(AbiError::UnknownElement { id })
    }

    /// Drops everything created by `owner`, e.g. when the entity is removed.
    pub fn remove_owned_by(&mut self, owner: EntityId) -> usize {
        let before = self.elements.len();
        self.elements.retain(|_, element| element.owner != owner);
        before - self.elements.len()
    }

    pub fn get(&self, id: u32) -> Option<&GuiElement> {
        self.elements.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &GuiElement)> {
        self.elements.iter().map(|(id, element)| (*id, element))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

pub(crate) fn install(table: &mut ExternalTable) {
    table.insert(
        signature(ids::GUI_CREATE, "gui_create", 12, 4),
        ExternalBody::Scoped(Box::new(gui_create)),
    );
    table.insert(
        signature(ids::GUI_UPDATE, "gui_update", 16, 0),
        ExternalBody::Scoped(Box::new(gui_update)),
    );
    table.insert(
        signature(ids::GUI_DESTROY, "gui_destroy", 4, 0),
        ExternalBody::Scoped(Box::new(gui_destroy)),
    );
    table.insert(
        signature(ids::GUI_POLL, "gui_poll", 0, 4),
        ExternalBody::Scoped(Box::new(gui_poll)),
    );
}

/// `gui_create(kind, x, y) -> id`.
fn gui_create(call: &mut Invocation<'_, '_>, args: &[u8], ret: &mut [u8]) -> Result<(), AbiError> {
    let kind = GuiKind::from_code(arg_u32(args, 0)).ok_or(AbiError::InvalidArgument("gui kind"))?;
    let position = Vec2::new(arg_f32(args, 1), arg_f32(args, 2));
    let scope = call.scope()?;
    let id = scope.gui.create(scope.entity, scope.team, kind, position);
    put_u32(ret, 0, id);
    Ok(())
}

/// `gui_update(id, value, ptr, len)`.
fn gui_update(call: &mut Invocation<'_, '_>, args: &[u8], _ret: &mut [u8]) -> Result<(), AbiError> {
    let (id, value) = (arg_u32(args, 0), arg_f32(args, 1));
    let (ptr, len) = (arg_u32(args, 2), arg_u32(args, 3));
    check_len(len, MAX_GUI_LABEL_LEN)?;
    let (memory, scope) = call.split()?;
    let label = String::from_utf8_lossy(memory.read(ptr, len)?).into_owned();
    scope.gui.update(scope.team, id, value, label)
}

/// `gui_destroy(id)`.
fn gui_destroy(call: &mut Invocation<'_, '_>, args: &[u8], _ret: &mut [u8]) -> Result<(), AbiError> {
    let scope = call.scope()?;
    scope.gui.destroy(scope.team, arg_u32(args, 0)).map(|_| ())
}

/// `gui_poll() -> id`: element id of the oldest pending UI event, or 0.
fn gui_poll(call: &mut Invocation<'_, '_>, _args: &[u8], ret: &mut [u8]) -> Result<(), AbiError> {
    let scope = call.scope()?;
    put_u32(ret, 0, scope.queues.ui_events.pop().unwrap_or(0));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one() {
        let mut gui = GuiRegistry::new();
        let id = gui.create(EntityId(1), TeamId(1), GuiKind::Button, Vec2::ZERO);
        assert_eq!(id, 1);
        assert_eq!(gui.create(EntityId(1), TeamId(1), GuiKind::Label, Vec2::ZERO), 2);
    }

    #[test]
    fn other_teams_cannot_touch_elements() {
        let mut gui = GuiRegistry::new();
        let id = gui.create(EntityId(1), TeamId(1), GuiKind::Gauge, Vec2::ZERO);
        assert_eq!(
            gui.update(TeamId(2), id, 1.0, "x".into()),
            Err(AbiError::NotOwner { id })
        );
        assert_eq!(gui.destroy(TeamId(2), id).unwrap_err(), AbiError::NotOwner { id });
        assert!(gui.update(TeamId(1), id, 0.5, "half".into()).is_ok());
        assert_eq!(gui.get(id).unwrap().label, "half");
        assert!(gui.destroy(TeamId(1), id).is_ok());
        assert_eq!(
            gui.destroy(TeamId(1), id).unwrap_err(),
            AbiError::UnknownElement { id }
        );
    }

    #[test]
    fn removing_an_owner_drops_its_elements() {
        let mut gui = GuiRegistry::new();
        gui.create(EntityId(1), TeamId(1), GuiKind::Button, Vec2::ZERO);
        gui.create(EntityId(2), TeamId(1), GuiKind::Button, Vec2::ZERO);
        assert_eq!(gui.remove_owned_by(EntityId(1)), 1);
        assert_eq!(gui.len(), 1);
    }
}
