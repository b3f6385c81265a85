//! Facility bridge: the research queue.
//!
//! Programs enqueue or dequeue technology hashes through the op/status
//! handshake. Each tick the facility researches the technology at the
//! front of its queue once enough resources are stored.

use std::collections::HashSet;

use botforge_core::peripheral::facility::{
    BAD_OP, DEQUEUE, ENQUEUE, IDLE, OK, QUEUE_EMPTY, QUEUE_FULL, UNKNOWN_TECH,
};
use botforge_core::{PeripheralRegs, TechHash};
use tracing::info;

use crate::config::SimConfig;
use crate::entity::Peripheral;
use crate::world::World;

pub fn run(world: &mut World, config: &SimConfig, technologies: &HashSet<TechHash>) {
    for entity in world.entities.values_mut() {
        let Peripheral::Facility(facility) = &mut entity.peripheral else {
            continue;
        };

        if let Some(processor) = entity.processor.as_mut() {
            if let PeripheralRegs::Facility(mut regs) = processor.peripheral_regs() {
                match regs.op() {
                    IDLE => {}
                    ENQUEUE => {
                        let hash = regs.hash();
                        let status = if !technologies.contains(&hash) {
                            UNKNOWN_TECH
                        } else if facility.queue.len() >= config.facility_queue_len {
                            QUEUE_FULL
                        } else {
                            facility.queue.push_back(hash);
                            OK
                        };
                        regs.answer(status);
                    }
                    DEQUEUE => match facility.queue.pop_front() {
                        Some(hash) => {
                            regs.set_hash(hash);
                            regs.answer(OK);
                        }
                        None => regs.answer(QUEUE_EMPTY),
                    },
                    _ => regs.answer(BAD_OP),
                }
            }
        }

        if let Some(&front) = facility.queue.front() {
            if facility.stored >= config.research_cost {
                facility.stored -= config.research_cost;
                facility.queue.pop_front();
                facility.researched.push(front);
                info!(entity = entity.id.0, technology = %front, "research complete");
            }
        }

        if let Some(processor) = entity.processor.as_mut() {
            if let PeripheralRegs::Facility(mut regs) = processor.peripheral_regs() {
                regs.set_queue_len(facility.queue.len() as u32);
            }
        }
    }
}
