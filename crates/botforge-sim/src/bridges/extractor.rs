//! Extractor bridge: draws resources from nearby nodes into storage.

use botforge_core::peripheral::extractor::{FULL, NOTHING_IN_RANGE, OK};
use botforge_core::{PeripheralRegs, Vec2};
use tracing::trace;

use crate::config::SimConfig;
use crate::entity::{Extractor, Peripheral};
use crate::world::{ResourceNode, World};

pub fn run(world: &mut World, config: &SimConfig) {
    let World {
        entities, resources, ..
    } = world;

    for entity in entities.values_mut() {
        let Peripheral::Extractor(extractor) = &mut entity.peripheral else {
            continue;
        };
        let Some(processor) = entity.processor.as_mut() else {
            continue;
        };
        let PeripheralRegs::Extractor(mut regs) = processor.peripheral_regs() else {
            continue;
        };

        if regs.take_request() {
            let status = extract(extractor, entity.transform.position, resources, config);
            trace!(entity = entity.id.0, status, stored = extractor.stored, "extraction");
            regs.set_status(status);
        }
        regs.set_storage(extractor.stored, extractor.capacity);
    }
}

fn extract(extractor: &mut Extractor, position: Vec2, resources: &mut [ResourceNode], config: &SimConfig) -> u8 {
    if extractor.stored >= extractor.capacity {
        return FULL;
    }
    let nearest = resources
        .iter_mut()
        .filter(|node| node.amount > 0)
        .map(|node| (node.position.distance(position), node))
        .filter(|(distance, _)| *distance <= config.extraction_radius)
        .min_by(|a, b| a.0.total_cmp(&b.0));
    let Some((_, node)) = nearest else {
        return NOTHING_IN_RANGE;
    };

    let amount = config
        .extraction_amount
        .min(node.amount)
        .min(extractor.capacity - extractor.stored);
    node.amount -= amount;
    extractor.stored += amount;
    OK
}

#[cfg(test)]
mod tests {
    use botforge_core::peripheral::addr;
    use botforge_core::{EntityId, PeripheralKind, TeamId};

    use super::*;
    use crate::entity::EntitySpec;

    fn request(world: &mut World, id: EntityId) {
        let memory = world
            .entity_mut(id)
            .unwrap()
            .processor
            .as_mut()
            .unwrap()
            .memory_mut();
        memory.write_u8(addr::EXTRACTOR_REQUEST, 1).unwrap();
    }

    fn read(world: &World, id: EntityId, address: u32) -> u32 {
        let memory = world.entity(id).unwrap().processor.as_ref().unwrap().memory();
        memory.read_u32(address).unwrap()
    }

    fn status(world: &World, id: EntityId) -> u8 {
        let memory = world.entity(id).unwrap().processor.as_ref().unwrap().memory();
        memory.read_u8(addr::EXTRACTOR_STATUS).unwrap()
    }

    fn setup(config: &SimConfig) -> (World, EntityId) {
        let mut world = World::new();
        let id = world.spawn(
            EntitySpec::new(TeamId(1)).peripheral(PeripheralKind::Extractor),
            config,
        );
        (world, id)
    }

    #[test]
    fn extracts_from_nearest_node() {
        let config = SimConfig::default();
        let (mut world, id) = setup(&config);
        world.add_resource(Vec2::new(8.0, 0.0), 100);
        world.add_resource(Vec2::new(3.0, 0.0), 3);

        request(&mut world, id);
        run(&mut world, &config);
        assert_eq!(status(&world, id), OK);
        assert_eq!(read(&world, id, addr::EXTRACTOR_STORED), 3);
        assert_eq!(world.resources()[1].amount, 0);

        request(&mut world, id);
        run(&mut world, &config);
        assert_eq!(read(&world, id, addr::EXTRACTOR_STORED), 3 + config.extraction_amount);
        assert_eq!(world.resources()[0].amount, 100 - config.extraction_amount);
        assert_eq!(read(&world, id, addr::EXTRACTOR_CAPACITY), config.extractor_capacity);
    }

    #[test]
    fn nothing_in_range() {
        let config = SimConfig::default();
        let (mut world, id) = setup(&config);
        world.add_resource(Vec2::new(50.0, 0.0), 100);
        request(&mut world, id);
        run(&mut world, &config);
        assert_eq!(status(&world, id), NOTHING_IN_RANGE);
        assert_eq!(read(&world, id, addr::EXTRACTOR_STORED), 0);
    }

    #[test]
    fn full_storage_stops_extraction() {
        let config = SimConfig {
            extractor_capacity: 7,
            ..SimConfig::default()
        };
        let (mut world, id) = setup(&config);
        world.add_resource(Vec2::ZERO, 100);

        request(&mut world, id);
        run(&mut world, &config);
        request(&mut world, id);
        run(&mut world, &config);
        assert_eq!(status(&world, id), OK);
        assert_eq!(read(&world, id, addr::EXTRACTOR_STORED), 7);

        request(&mut world, id);
        run(&mut world, &config);
        assert_eq!(status(&world, id), FULL);
        assert_eq!(world.resources()[0].amount, 93);
    }
}
