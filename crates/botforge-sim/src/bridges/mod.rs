//! Peripheral bridge systems.
//!
//! Bridges run once per tick after every processor's VM slice, in a fixed
//! order. Each one visits only entities carrying the matching hardware and
//! talks to the program exclusively through the processor's mapped
//! registers.

pub mod console;
pub mod drive;
pub mod extractor;
pub mod facility;
pub mod navigation;
pub mod radar;
pub mod transporter;
pub mod turret;

use std::collections::HashSet;

use botforge_core::TechHash;

use crate::config::SimConfig;
use crate::world::World;

/// Runs every bridge in tick order.
pub fn run_all(world: &mut World, config: &SimConfig, technologies: &HashSet<TechHash>) {
    console::run(world);
    navigation::run(world);
    drive::run(world, config);
    radar::run(world);
    turret::run(world, config);
    extractor::run(world, config);
    transporter::run(world, config);
    facility::run(world, config, technologies);
}
