//! The fixed-rate simulation tick.
//!
//! # Tick order
//!
//! 1. Every processor's source is requested from the scheduler; unbound
//!    processors bind to the returned record.
//! 2. One scheduler pass: dispatch due compiles, commit finished ones.
//! 3. One VM slice per processor, with a scoped context for its entity.
//! 4. Bridges, in [`bridges::run_all`] order.
//! 5. Transmission delivery, then projectile integration.
//! 6. Status/diagnostic sync messages are collected for the caller.
//! 7. Periodic garbage collection of unreferenced compilation records.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use botforge_compile::{
    collect_sync, CompilationRegistry, CompilationScheduler, CompilerFrontend, DependencyResolver,
    Dispatcher, Outbound, TickReport,
};
use botforge_core::{EntityId, ExternalSignature, SourceId, TechHash, Version};
use botforge_vm::{ExecutionEngine, ExternalTable, HostContext, ProcessorState, Signal, TickOutcome};

use crate::bridges;
use crate::comms;
use crate::config::SimConfig;
use crate::entity::{Entity, EntitySpec};
use crate::error::SimError;
use crate::projectile;
use crate::world::World;

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickSummary {
    pub tick: u64,
    pub scheduler: TickReport,
    /// Instructions executed across all processors.
    pub instructions: u64,
    pub reloads: Vec<(EntityId, Version)>,
    /// Signals raised this tick.
    pub signals: Vec<(EntityId, Signal)>,
    pub delivered: usize,
    pub destroyed: Vec<EntityId>,
    /// Sources whose records were garbage collected.
    pub collected: Vec<SourceId>,
}

pub struct Simulation {
    config: SimConfig,
    world: World,
    scheduler: CompilationScheduler,
    engine: ExecutionEngine,
    technologies: HashSet<TechHash>,
    outbound: Vec<Outbound>,
    tick: u64,
    epoch: Instant,
}

impl Simulation {
    pub fn new(
        config: SimConfig,
        resolver: Arc<dyn DependencyResolver>,
        frontend: Arc<dyn CompilerFrontend>,
        dispatcher: Box<dyn Dispatcher>,
    ) -> Self {
        Simulation::with_registry(
            config,
            Arc::new(CompilationRegistry::new()),
            resolver,
            frontend,
            dispatcher,
        )
    }

    /// Builds a simulation around an existing record table.
    pub fn with_registry(
        config: SimConfig,
        registry: Arc<CompilationRegistry>,
        resolver: Arc<dyn DependencyResolver>,
        frontend: Arc<dyn CompilerFrontend>,
        dispatcher: Box<dyn Dispatcher>,
    ) -> Self {
        let externals = Arc::new(ExternalTable::standard());
        let signatures: Arc<[ExternalSignature]> = externals.signature_list().into();
        let scheduler = CompilationScheduler::new(
            registry,
            resolver,
            frontend,
            dispatcher,
            signatures,
            config.scheduler.clone(),
        );
        let engine = ExecutionEngine::new(config.engine.clone(), externals);
        let technologies = config.technology_hashes().into_iter().collect();
        info!(tick_hz = config.tick_hz, budget = config.engine.instruction_budget, "simulation created");

        Simulation {
            config,
            world: World::new(),
            scheduler,
            engine,
            technologies,
            outbound: Vec::new(),
            tick: 0,
            epoch: Instant::now(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn scheduler(&self) -> &CompilationScheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &Arc<CompilationRegistry> {
        self.scheduler.registry()
    }

    /// Ticks completed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Simulated time of the next tick, derived from the tick count.
    pub fn virtual_now(&self) -> Instant {
        let hz = u64::from(self.config.tick_hz.max(1));
        self.epoch + Duration::from_micros(self.tick * 1_000_000 / hz)
    }

    pub fn spawn(&mut self, spec: EntitySpec) -> EntityId {
        self.world.spawn(spec, &self.config)
    }

    pub fn despawn(&mut self, id: EntityId) -> Result<Entity, SimError> {
        self.world.despawn(id).ok_or(SimError::UnknownEntity(id))
    }

    pub fn processor(&self, id: EntityId) -> Option<&ProcessorState> {
        self.world.entity(id)?.processor.as_ref()
    }

    fn processor_mut(&mut self, id: EntityId) -> Result<&mut ProcessorState, SimError> {
        self.world
            .entity_mut(id)
            .ok_or(SimError::UnknownEntity(id))?
            .processor
            .as_mut()
            .ok_or(SimError::NotAProcessor(id))
    }

    /// Points a processor at another program, or none.
    pub fn set_program(&mut self, id: EntityId, source: Option<SourceId>) -> Result<(), SimError> {
        self.processor_mut(id)?.set_source(source);
        Ok(())
    }

    /// The owner uploaded new text for `source`. Returns how many records
    /// were rescheduled.
    pub fn source_changed(&mut self, source: &SourceId, now: Instant) -> Result<usize, SimError> {
        Ok(self.scheduler.invalidate(source, now)?)
    }

    pub fn push_command(&mut self, id: EntityId, command: Vec<u8>) -> Result<(), SimError> {
        self.processor_mut(id)?
            .queues_mut()
            .commands
            .push(command)
            .map_err(|_| SimError::QueueFull {
                entity: id,
                queue: "commands",
            })
    }

    /// Queues a console line; it is delivered when the program asks.
    pub fn provide_stdin(&mut self, id: EntityId, line: Vec<u8>) -> Result<(), SimError> {
        self.processor_mut(id)?
            .queues_mut()
            .stdin
            .push(line)
            .map_err(|_| SimError::QueueFull {
                entity: id,
                queue: "stdin",
            })
    }

    /// A player clicked a GUI element; its owner sees the id via `gui_poll`.
    pub fn click(&mut self, element: u32) -> Result<(), SimError> {
        let owner = self
            .world
            .gui
            .get(element)
            .ok_or(SimError::UnknownGuiElement(element))?
            .owner;
        self.processor_mut(owner)?
            .queues_mut()
            .ui_events
            .push(element)
            .map_err(|_| SimError::QueueFull {
                entity: owner,
                queue: "ui_events",
            })
    }

    /// Sync messages produced since the last call.
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbound)
    }

    /// Runs one tick at the simulated clock.
    pub fn step(&mut self) -> TickSummary {
        let now = self.virtual_now();
        self.tick(now)
    }

    /// Runs one tick. `now` drives compile backoff and sync throttling.
    pub fn tick(&mut self, now: Instant) -> TickSummary {
        let mut summary = TickSummary {
            tick: self.tick,
            ..TickSummary::default()
        };
        self.world.outbox.clear();

        for entity in self.world.entities.values_mut() {
            let Some(processor) = entity.processor.as_mut() else {
                continue;
            };
            let Some(source) = processor.source().cloned() else {
                continue;
            };
            let handle = self.scheduler.request(&source, now);
            if !processor.is_bound() {
                processor.bind(handle);
            }
        }

        summary.scheduler = self.scheduler.tick(now);

        let wall_clock_ms =
            u64::try_from(now.saturating_duration_since(self.epoch).as_millis()).unwrap_or(u64::MAX);
        let World {
            entities, gui, outbox, ..
        } = &mut self.world;
        for entity in entities.values_mut() {
            let Entity {
                id,
                team,
                transform,
                processor,
                pendrive,
                ..
            } = entity;
            let Some(processor) = processor.as_mut() else {
                continue;
            };
            let host = HostContext {
                entity: *id,
                team: *team,
                transform: *transform,
                wall_clock_ms,
                outbox: &mut *outbox,
                gui: &mut *gui,
                pendrive: pendrive.as_mut(),
            };
            match self.engine.tick(processor, Some(host)) {
                TickOutcome::Idle => {}
                TickOutcome::Reloaded { version } => summary.reloads.push((*id, version)),
                TickOutcome::Executed { instructions, .. } => {
                    summary.instructions += u64::from(instructions);
                }
                TickOutcome::Signaled {
                    signal,
                    instructions,
                } => {
                    summary.instructions += u64::from(instructions);
                    summary.signals.push((*id, signal));
                }
            }
        }

        bridges::run_all(&mut self.world, &self.config, &self.technologies);
        summary.delivered = comms::deliver(&mut self.world, &self.config);
        summary.destroyed = projectile::integrate(&mut self.world, &self.config);

        self.outbound.extend(collect_sync(
            self.scheduler.registry(),
            now,
            self.config.scheduler.sync_interval,
        ));

        self.tick += 1;
        let gc_interval = self.config.gc_interval_ticks;
        if gc_interval > 0 && self.tick % gc_interval == 0 {
            summary.collected = self.scheduler.collect_garbage();
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use botforge_compile::resolver::LocalResolver;
    use botforge_compile::{asm::AsmFrontend, InlineDispatcher};
    use botforge_core::TeamId;

    use super::*;

    fn simulation(config: SimConfig) -> (Simulation, Arc<LocalResolver>) {
        let resolver = Arc::new(LocalResolver::new());
        let sim = Simulation::new(
            config,
            resolver.clone(),
            Arc::new(AsmFrontend::new()),
            Box::new(InlineDispatcher),
        );
        (sim, resolver)
    }

    #[test]
    fn virtual_clock_follows_tick_rate() {
        let (mut sim, _) = simulation(SimConfig {
            tick_hz: 10,
            ..SimConfig::default()
        });
        let start = sim.virtual_now();
        for _ in 0..5 {
            sim.step();
        }
        assert_eq!(sim.tick_count(), 5);
        assert_eq!(sim.virtual_now() - start, Duration::from_millis(500));
    }

    #[test]
    fn api_errors_name_the_entity() {
        let (mut sim, _) = simulation(SimConfig::default());
        let passive = sim.spawn(EntitySpec::new(TeamId(0)).passive());

        assert!(matches!(
            sim.push_command(EntityId(42), b"x".to_vec()),
            Err(SimError::UnknownEntity(EntityId(42)))
        ));
        assert!(matches!(
            sim.provide_stdin(passive, b"x".to_vec()),
            Err(SimError::NotAProcessor(id)) if id == passive
        ));
        assert!(matches!(sim.click(7), Err(SimError::UnknownGuiElement(7))));
        assert!(matches!(sim.despawn(EntityId(42)), Err(SimError::UnknownEntity(_))));
    }

    #[test]
    fn command_queue_overflow_is_reported() {
        let mut config = SimConfig::default();
        config.queues.commands = 1;
        let (mut sim, _) = simulation(config);
        let id = sim.spawn(EntitySpec::new(TeamId(0)));

        sim.push_command(id, b"a".to_vec()).unwrap();
        let err = sim.push_command(id, b"b".to_vec()).unwrap_err();
        assert!(matches!(err, SimError::QueueFull { queue: "commands", .. }));
    }

    #[test]
    fn unknown_source_change_is_an_error() {
        let (mut sim, _) = simulation(SimConfig::default());
        let err = sim
            .source_changed(&SourceId::local("nothing.asm"), Instant::now())
            .unwrap_err();
        assert!(matches!(err, SimError::Scheduler(_)));
    }

    #[test]
    fn garbage_collection_runs_on_interval() {
        let (mut sim, resolver) = simulation(SimConfig {
            gc_interval_ticks: 2,
            ..SimConfig::default()
        });
        let source = resolver.insert("a.asm", "halt\n");
        let id = sim.spawn(EntitySpec::new(TeamId(0)).program(source.clone()));
        sim.step();
        assert!(sim.registry().get(&source).is_some());

        sim.despawn(id).unwrap();
        let summary = sim.step();
        assert_eq!(summary.collected, vec![source.clone()]);
        assert!(sim.registry().get(&source).is_none());
    }

    #[test]
    fn wall_clock_follows_the_supplied_time() {
        let (mut sim, resolver) = simulation(SimConfig::default());
        let source = resolver.insert("clock.asm", "ext time\nhalt\n");
        let id = sim.spawn(EntitySpec::new(TeamId(0)).program(source));

        let epoch = sim.epoch;
        sim.tick(epoch);
        sim.tick(epoch + Duration::from_millis(2500));
        let registers = sim.processor(id).unwrap().registers();
        assert_eq!(registers.gpr[0], 2500);
        assert_eq!(registers.gpr[1], 0);
    }
}
