//! Transmission delivery.
//!
//! After the bridges run, every processor's outbound queue is drained and
//! each transmission is copied into the inbound queue of every other
//! processor on the sender's team that it reaches. A full inbound queue
//! drops the copy for that receiver only.

use tracing::debug;

use botforge_vm::abi::comms::Transmission;

use crate::config::SimConfig;
use crate::world::World;

/// Delivers queued transmissions and returns how many copies arrived.
pub fn deliver(world: &mut World, config: &SimConfig) -> usize {
    let mut pending: Vec<Transmission> = Vec::new();
    for entity in world.entities.values_mut() {
        if let Some(processor) = entity.processor.as_mut() {
            pending.extend(processor.queues_mut().outbound.drain());
        }
    }

    let mut delivered = 0;
    for transmission in &pending {
        for entity in world.entities.values_mut() {
            if entity.id == transmission.sender || entity.team != transmission.team {
                continue;
            }
            if !transmission.reaches(entity.transform.position, config.transmission_range) {
                continue;
            }
            let Some(processor) = entity.processor.as_mut() else {
                continue;
            };
            match processor.queues_mut().inbound.push(transmission.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => debug!(
                    sender = transmission.sender.0,
                    receiver = entity.id.0,
                    "inbound queue full, transmission dropped"
                ),
            }
        }
    }
    delivered
}
