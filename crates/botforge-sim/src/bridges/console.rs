//! Console bridge: hands typed lines to programs waiting on stdin.

use crate::world::World;

pub fn run(world: &mut World) {
    for entity in world.entities.values_mut() {
        let Some(processor) = entity.processor.as_mut() else {
            continue;
        };
        if !processor.memory_mut().system_regs().stdin_requested() {
            continue;
        }
        if let Some(line) = processor.queues_mut().stdin.pop() {
            processor.memory_mut().system_regs().deliver_stdin(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use botforge_core::peripheral::addr;
    use botforge_core::TeamId;

    use super::*;
    use crate::config::SimConfig;
    use crate::entity::EntitySpec;

    #[test]
    fn delivers_only_when_requested() {
        let config = SimConfig::default();
        let mut world = World::new();
        let id = world.spawn(EntitySpec::new(TeamId(0)), &config);
        let processor = world.entity_mut(id).unwrap().processor.as_mut().unwrap();
        processor.queues_mut().stdin.push(b"go".to_vec()).unwrap();

        run(&mut world);
        let processor = world.entity_mut(id).unwrap().processor.as_mut().unwrap();
        assert_eq!(processor.queues().stdin.len(), 1);

        processor.memory_mut().system_regs().request_stdin();
        run(&mut world);
        let processor = world.entity_mut(id).unwrap().processor.as_mut().unwrap();
        assert!(processor.queues().stdin.is_empty());
        assert_eq!(processor.memory().read_u32(addr::STDIN_LEN).unwrap(), 2);
        assert!(!processor.memory_mut().system_regs().stdin_requested());
        assert_eq!(processor.memory_mut().system_regs().take_stdin().unwrap(), b"go");
    }

    #[test]
    fn request_waits_for_a_line() {
        let config = SimConfig::default();
        let mut world = World::new();
        let id = world.spawn(EntitySpec::new(TeamId(0)), &config);
        let processor = world.entity_mut(id).unwrap().processor.as_mut().unwrap();
        processor.memory_mut().system_regs().request_stdin();

        run(&mut world);
        let processor = world.entity_mut(id).unwrap().processor.as_mut().unwrap();
        assert!(processor.memory_mut().system_regs().stdin_requested());
    }
}
