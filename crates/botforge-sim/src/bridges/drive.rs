//! Drive bridge: turns toward the target heading and moves by throttle.
//!
//! Throttle is clamped to `[-1, 1]`; a non-finite throttle counts as zero
//! and a non-finite target heading leaves the heading alone.

use botforge_core::geometry::move_towards_angle;
use botforge_core::Vec2;

use crate::config::SimConfig;
use crate::world::World;

pub fn run(world: &mut World, config: &SimConfig) {
    for entity in world.entities.values_mut() {
        if !entity.drive {
            continue;
        }
        let Some(processor) = entity.processor.as_mut() else {
            continue;
        };
        let regs = processor.memory_mut().common_regs();
        let throttle = regs.throttle();
        let target = regs.target_heading();

        let transform = &mut entity.transform;
        if target.is_finite() {
            transform.heading = move_towards_angle(transform.heading, target, config.drive_turn_rate);
        }
        let throttle = if throttle.is_finite() {
            throttle.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        transform.position =
            transform.position + Vec2::from_angle(transform.heading).scale(throttle * config.drive_speed);
    }
}

#[cfg(test)]
mod tests {
    use botforge_core::peripheral::addr;
    use botforge_core::{EntityId, TeamId};
    use proptest::prelude::*;

    use super::*;
    use crate::entity::EntitySpec;

    fn world_with_drive(config: &SimConfig, heading: f32) -> (World, EntityId) {
        let mut world = World::new();
        let id = world.spawn(
            EntitySpec::new(TeamId(0)).at(Vec2::ZERO, heading).with_drive(),
            config,
        );
        (world, id)
    }

    fn set(world: &mut World, id: EntityId, address: u32, value: f32) {
        let processor = world.entity_mut(id).unwrap().processor.as_mut().unwrap();
        processor.memory_mut().write_f32(address, value).unwrap();
    }

    #[test]
    fn heading_change_is_clamped_per_tick() {
        let config = SimConfig::default();
        let (mut world, id) = world_with_drive(&config, 0.0);
        set(&mut world, id, addr::DRIVE_TARGET_HEADING, 90.0);

        run(&mut world, &config);
        assert_eq!(world.entity(id).unwrap().transform.heading, config.drive_turn_rate);
        for _ in 0..20 {
            run(&mut world, &config);
        }
        assert_eq!(world.entity(id).unwrap().transform.heading, 90.0);
    }

    #[test]
    fn throttle_moves_along_heading_and_is_clamped() {
        let config = SimConfig::default();
        let (mut world, id) = world_with_drive(&config, 0.0);
        set(&mut world, id, addr::DRIVE_THROTTLE, 5.0);

        run(&mut world, &config);
        let position = world.entity(id).unwrap().transform.position;
        assert!((position.x - config.drive_speed).abs() < 1e-5);
        assert!(position.y.abs() < 1e-5);
    }

    #[test]
    fn nan_registers_are_ignored() {
        let config = SimConfig::default();
        let (mut world, id) = world_with_drive(&config, 30.0);
        set(&mut world, id, addr::DRIVE_THROTTLE, f32::NAN);
        set(&mut world, id, addr::DRIVE_TARGET_HEADING, f32::NAN);

        run(&mut world, &config);
        let transform = world.entity(id).unwrap().transform;
        assert_eq!(transform.heading, 30.0);
        assert_eq!(transform.position, Vec2::ZERO);
    }

    #[test]
    fn entities_without_drive_stay_put() {
        let config = SimConfig::default();
        let mut world = World::new();
        let id = world.spawn(EntitySpec::new(TeamId(0)), &config);
        set(&mut world, id, addr::DRIVE_THROTTLE, 1.0);
        run(&mut world, &config);
        assert_eq!(world.entity(id).unwrap().transform.position, Vec2::ZERO);
    }

    proptest! {
        #[test]
        fn any_register_bits_stay_within_one_step(throttle_bits: u32, heading_bits: u32) {
            let config = SimConfig::default();
            let (mut world, id) = world_with_drive(&config, 0.0);
            set(&mut world, id, addr::DRIVE_THROTTLE, f32::from_bits(throttle_bits));
            set(&mut world, id, addr::DRIVE_TARGET_HEADING, f32::from_bits(heading_bits));

            run(&mut world, &config);
            let transform = world.entity(id).unwrap().transform;
            prop_assert!(transform.position.length() <= config.drive_speed + 1e-4);
            prop_assert!((0.0..360.0).contains(&transform.heading));
        }
    }
}
