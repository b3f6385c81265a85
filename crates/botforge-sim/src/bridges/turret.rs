//! Turret bridge: aims, fires and reports turret state.

use botforge_core::geometry::move_towards_angle;
use botforge_core::PeripheralRegs;
use tracing::trace;

use crate::config::SimConfig;
use crate::entity::Peripheral;
use crate::projectile::Projectile;
use crate::world::World;

pub fn run(world: &mut World, config: &SimConfig) {
    let mut fired = Vec::new();
    for entity in world.entities.values_mut() {
        let Peripheral::Turret(turret) = &mut entity.peripheral else {
            continue;
        };
        let Some(processor) = entity.processor.as_mut() else {
            continue;
        };
        let PeripheralRegs::Turret(mut regs) = processor.peripheral_regs() else {
            continue;
        };

        let target = regs.target_angle();
        if target.is_finite() {
            turret.angle = move_towards_angle(turret.angle, target, config.turret_turn_rate);
        }
        turret.cooldown = turret.cooldown.saturating_sub(1);
        if regs.take_shoot_request() && turret.cooldown == 0 {
            trace!(entity = entity.id.0, angle = turret.angle, "turret fired");
            fired.push(Projectile::fire(
                entity.id,
                entity.team,
                entity.transform.position,
                turret.angle,
                config,
            ));
            turret.cooldown = config.turret_cooldown_ticks;
        }
        regs.set_angle(turret.angle);
        regs.set_cooldown(turret.cooldown);
    }
    world.projectiles.extend(fired);
}
