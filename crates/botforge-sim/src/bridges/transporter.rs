//! Transporter bridge: moves cargo between same-team extractors and
//! facilities.
//!
//! `LOAD` takes from the nearest same-team extractor within reach, `UNLOAD`
//! empties the cargo into the nearest same-team facility within reach.
//! The answer carries the status, the resulting cargo and the partner id
//! (0 when there was none).

use botforge_core::peripheral::transporter::{LOAD, NOTHING_TO_MOVE, NO_PARTNER, OK, UNLOAD};
use botforge_core::{EntityId, PeripheralRegs, TeamId, Vec2};
use tracing::{debug, trace};

use crate::config::SimConfig;
use crate::entity::Peripheral;
use crate::world::World;

struct Request {
    entity: EntityId,
    team: TeamId,
    position: Vec2,
    command: u8,
}

pub fn run(world: &mut World, config: &SimConfig) {
    let mut requests = Vec::new();
    for entity in world.entities.values_mut() {
        if !matches!(entity.peripheral, Peripheral::Transporter(_)) {
            continue;
        }
        let Some(processor) = entity.processor.as_mut() else {
            continue;
        };
        let PeripheralRegs::Transporter(mut regs) = processor.peripheral_regs() else {
            continue;
        };
        match regs.take_command() {
            0 => {}
            command @ (LOAD | UNLOAD) => requests.push(Request {
                entity: entity.id,
                team: entity.team,
                position: entity.transform.position,
                command,
            }),
            other => debug!(entity = entity.id.0, command = other, "unknown transporter command"),
        }
    }

    for request in requests {
        let (status, partner) = transfer(world, &request, config);
        trace!(entity = request.entity.0, status, ?partner, "transfer");
        let Some(entity) = world.entities.get_mut(&request.entity) else {
            continue;
        };
        let cargo = match &entity.peripheral {
            Peripheral::Transporter(transporter) => transporter.cargo,
            _ => 0,
        };
        let Some(processor) = entity.processor.as_mut() else {
            continue;
        };
        if let PeripheralRegs::Transporter(mut regs) = processor.peripheral_regs() {
            regs.set_status(status);
            regs.set_amount(cargo);
            regs.set_partner(partner.map_or(0, |id| id.0));
        }
    }
}

fn is_extractor(peripheral: &Peripheral) -> bool {
    matches!(peripheral, Peripheral::Extractor(_))
}

fn is_facility(peripheral: &Peripheral) -> bool {
    matches!(peripheral, Peripheral::Facility(_))
}

/// Nearest same-team entity within reach whose peripheral passes `accepts`.
fn partner(world: &World, request: &Request, reach: f32, accepts: fn(&Peripheral) -> bool) -> Option<EntityId> {
    world
        .entities
        .values()
        .filter(|entity| entity.id != request.entity && entity.team == request.team)
        .filter(|entity| accepts(&entity.peripheral))
        .map(|entity| (entity.transform.position.distance(request.position), entity.id))
        .filter(|(distance, _)| *distance <= reach)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, id)| id)
}

fn transfer(world: &mut World, request: &Request, config: &SimConfig) -> (u8, Option<EntityId>) {
    let (cargo, capacity) = match world.entities.get(&request.entity).map(|e| &e.peripheral) {
        Some(Peripheral::Transporter(transporter)) => (transporter.cargo, transporter.capacity),
        _ => return (NO_PARTNER, None),
    };

    let accepts = if request.command == LOAD {
        is_extractor
    } else {
        is_facility
    };
    let Some(partner_id) = partner(world, request, config.transfer_reach, accepts) else {
        return (NO_PARTNER, None);
    };

    let moved = match world.entities.get_mut(&partner_id).map(|e| &mut e.peripheral) {
        Some(Peripheral::Extractor(extractor)) => {
            let moved = extractor.stored.min(capacity - cargo);
            extractor.stored -= moved;
            moved
        }
        Some(Peripheral::Facility(facility)) => {
            facility.stored += cargo;
            cargo
        }
        _ => 0,
    };
    if moved == 0 {
        return (NOTHING_TO_MOVE, Some(partner_id));
    }

    if let Some(Peripheral::Transporter(transporter)) =
        world.entities.get_mut(&request.entity).map(|e| &mut e.peripheral)
    {
        if request.command == LOAD {
            transporter.cargo += moved;
        } else {
            transporter.cargo -= moved;
        }
    }
    (OK, Some(partner_id))
}
