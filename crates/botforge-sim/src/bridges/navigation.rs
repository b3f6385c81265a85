//! Navigation bridge: publishes each processor's position and heading.

use crate::world::World;

pub fn run(world: &mut World) {
    for entity in world.entities.values_mut() {
        let Some(processor) = entity.processor.as_mut() else {
            continue;
        };
        let mut regs = processor.memory_mut().common_regs();
        regs.set_position(entity.transform.position);
        regs.set_heading(entity.transform.heading);
    }
}
