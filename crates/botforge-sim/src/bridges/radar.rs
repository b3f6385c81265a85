//! Radar bridge: answers pending scans with the nearest contacts.
//!
//! A scan sees other entities (ally or enemy by team) and non-empty
//! resource nodes within the smaller of the requested range and the
//! hardware range. A non-positive or non-finite request uses the hardware
//! range. Contacts are written nearest first.

use botforge_core::peripheral::{radar, RadarContact, RADAR_SLOTS};
use botforge_core::{EntityId, TeamId, Vec2};

use crate::world::World;

pub fn run(world: &mut World) {
    let World {
        entities, resources, ..
    } = world;

    let blips: Vec<(EntityId, TeamId, Vec2)> = entities
        .values()
        .map(|entity| (entity.id, entity.team, entity.transform.position))
        .collect();

    for entity in entities.values_mut() {
        let Some(hardware_range) = entity.radar else {
            continue;
        };
        let Some(processor) = entity.processor.as_mut() else {
            continue;
        };
        let mut regs = processor.memory_mut().common_regs();
        if !regs.radar_requested() {
            continue;
        }
        let requested = regs.radar_range();
        let range = if requested.is_finite() && requested > 0.0 {
            requested.min(hardware_range)
        } else {
            hardware_range
        };

        let (own_id, own_team, origin) = (entity.id, entity.team, entity.transform.position);
        let mut contacts: Vec<(f32, RadarContact)> = blips
            .iter()
            .filter(|(id, _, _)| *id != own_id)
            .map(|&(_, team, position)| {
                let class = if team == own_team {
                    radar::CLASS_ALLY
                } else {
                    radar::CLASS_ENEMY
                };
                (position, class)
            })
            .chain(
                resources
                    .iter()
                    .filter(|node| node.amount > 0)
                    .map(|node| (node.position, radar::CLASS_RESOURCE)),
            )
            .map(|(position, class)| (origin.distance(position), RadarContact { position, class }))
            .filter(|(distance, _)| *distance <= range)
            .collect();
        contacts.sort_by(|a, b| a.0.total_cmp(&b.0));
        contacts.truncate(RADAR_SLOTS);

        let contacts: Vec<RadarContact> = contacts.into_iter().map(|(_, contact)| contact).collect();
        regs.answer_radar(&contacts);
    }
}
