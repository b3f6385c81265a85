//! Host simulation for botforge processor entities.
//!
//! A [`Simulation`] owns the entity table, the compilation scheduler and the
//! execution engine, and advances them together at a fixed tick rate. After
//! the VM slice of each tick the peripheral bridge systems read and write
//! every processor's mapped registers, turning program intent into movement,
//! sensing, fire and resource flow.
//!
//! # Architecture
//!
//! - [`config`] -- `SimConfig`, loadable from JSON and `BOTFORGE_*` env vars
//! - [`world`] -- entity table, resource nodes, projectiles, GUI registry
//! - [`entity`] -- entity components and the spawn description
//! - [`bridges`] -- per-peripheral systems run after the VM tick
//! - [`comms`] -- delivery of queued transmissions
//! - [`projectile`] -- projectile flight and hits
//! - [`simulation`] -- the tick loop tying everything together

pub mod bridges;
pub mod comms;
pub mod config;
pub mod entity;
pub mod error;
pub mod projectile;
pub mod simulation;
pub mod world;

pub use config::SimConfig;
pub use entity::{Entity, EntitySpec, Peripheral};
pub use error::SimError;
pub use simulation::{Simulation, TickSummary};
pub use world::{ResourceNode, World};
