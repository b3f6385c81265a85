//! Projectile flight and hits.

use serde::{Deserialize, Serialize};
use tracing::info;

use botforge_core::{EntityId, TeamId, Vec2};

use crate::config::SimConfig;
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    pub owner: EntityId,
    pub team: TeamId,
    pub position: Vec2,
    /// Displacement per tick.
    pub velocity: Vec2,
    pub remaining_ticks: u32,
    pub damage: i32,
}

impl Projectile {
    pub fn fire(owner: EntityId, team: TeamId, origin: Vec2, angle: f32, config: &SimConfig) -> Self {
        Projectile {
            owner,
            team,
            position: origin,
            velocity: Vec2::from_angle(angle).scale(config.projectile_speed),
            remaining_ticks: config.projectile_lifetime_ticks,
            damage: config.projectile_damage,
        }
    }
}

/// Moves every projectile one step and applies hits against entities of
/// other teams. Entities whose health drops to zero are despawned; their
/// ids are returned.
pub fn integrate(world: &mut World, config: &SimConfig) -> Vec<EntityId> {
    let mut projectiles = std::mem::take(&mut world.projectiles);
    projectiles.retain_mut(|projectile| {
        projectile.position = projectile.position + projectile.velocity;
        projectile.remaining_ticks = projectile.remaining_ticks.saturating_sub(1);

        let target = world
            .entities
            .values_mut()
            .filter(|entity| entity.team != projectile.team && entity.health > 0)
            .map(|entity| (entity.transform.position.distance(projectile.position), entity))
            .filter(|(distance, _)| *distance <= config.hit_radius)
            .min_by(|a, b| a.0.total_cmp(&b.0));
        if let Some((_, entity)) = target {
            entity.health -= projectile.damage;
            return false;
        }
        projectile.remaining_ticks > 0
    });
    world.projectiles = projectiles;

    let destroyed: Vec<EntityId> = world
        .entities
        .values()
        .filter(|entity| entity.health <= 0)
        .map(|entity| entity.id)
        .collect();
    for id in &destroyed {
        info!(entity = id.0, "entity destroyed");
        world.despawn(*id);
    }
    destroyed
}
