//! Entities and their hardware components.

use std::collections::VecDeque;

use botforge_core::{EntityId, PeripheralKind, SourceId, TeamId, TechHash, Transform, Vec2};
use botforge_vm::abi::pendrive::Pendrive;
use botforge_vm::ProcessorState;

use crate::config::SimConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Turret {
    /// World-space barrel angle, degrees.
    pub angle: f32,
    /// Ticks until the next shot is allowed.
    pub cooldown: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extractor {
    pub stored: u32,
    pub capacity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transporter {
    pub cargo: u32,
    pub capacity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Facility {
    pub stored: u32,
    pub queue: VecDeque<TechHash>,
    pub researched: Vec<TechHash>,
}

/// The archetype-specific hardware of an entity. Its tag always matches the
/// processor's [`PeripheralKind`], so bridges see one interpretation of the
/// register tail.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Peripheral {
    #[default]
    None,
    Turret(Turret),
    Extractor(Extractor),
    Transporter(Transporter),
    Facility(Facility),
}

impl Peripheral {
    pub fn for_kind(kind: PeripheralKind, config: &SimConfig) -> Self {
        match kind {
            PeripheralKind::None => Peripheral::None,
            PeripheralKind::Turret => Peripheral::Turret(Turret::default()),
            PeripheralKind::Extractor => Peripheral::Extractor(Extractor {
                stored: 0,
                capacity: config.extractor_capacity,
            }),
            PeripheralKind::Transporter => Peripheral::Transporter(Transporter {
                cargo: 0,
                capacity: config.transporter_capacity,
            }),
            PeripheralKind::Facility => Peripheral::Facility(Facility::default()),
        }
    }

    pub fn kind(&self) -> PeripheralKind {
        match self {
            Peripheral::None => PeripheralKind::None,
            Peripheral::Turret(_) => PeripheralKind::Turret,
            Peripheral::Extractor(_) => PeripheralKind::Extractor,
            Peripheral::Transporter(_) => PeripheralKind::Transporter,
            Peripheral::Facility(_) => PeripheralKind::Facility,
        }
    }
}

#[derive(Debug)]
pub struct Entity {
    pub id: EntityId,
    pub team: TeamId,
    pub transform: Transform,
    pub health: i32,
    pub drive: bool,
    /// Hardware radar range, `None` without a radar.
    pub radar: Option<f32>,
    pub peripheral: Peripheral,
    pub processor: Option<ProcessorState>,
    pub pendrive: Option<Pendrive>,
}

impl Entity {
    pub fn from_spec(id: EntityId, spec: EntitySpec, config: &SimConfig) -> Self {
        let processor = spec.processor.then(|| {
            let processor = ProcessorState::new(spec.peripheral, &config.queues);
            match spec.program {
                Some(source) => processor.with_source(source),
                None => processor,
            }
        });
        Entity {
            id,
            team: spec.team,
            transform: spec.transform,
            health: config.max_health,
            drive: spec.drive,
            radar: spec.radar.then_some(config.radar_range),
            peripheral: Peripheral::for_kind(spec.peripheral, config),
            processor,
            pendrive: spec
                .pendrive
                .then(|| Pendrive::new(config.pendrive_blocks)),
        }
    }
}

/// Description of an entity to spawn.
///
/// ```
/// use botforge_core::{PeripheralKind, SourceId, TeamId, Vec2};
/// use botforge_sim::EntitySpec;
///
/// let spec = EntitySpec::new(TeamId(1))
///     .at(Vec2::new(10.0, 0.0), 90.0)
///     .program(SourceId::local("turret.asm"))
///     .peripheral(PeripheralKind::Turret)
///     .with_radar();
/// assert!(spec.radar);
/// ```
#[derive(Debug, Clone)]
pub struct EntitySpec {
    pub team: TeamId,
    pub transform: Transform,
    pub program: Option<SourceId>,
    pub processor: bool,
    pub drive: bool,
    pub radar: bool,
    pub peripheral: PeripheralKind,
    pub pendrive: bool,
}

impl EntitySpec {
    /// A processor entity with no hardware at the origin.
    pub fn new(team: TeamId) -> Self {
        EntitySpec {
            team,
            transform: Transform::default(),
            program: None,
            processor: true,
            drive: false,
            radar: false,
            peripheral: PeripheralKind::None,
            pendrive: false,
        }
    }

    pub fn at(mut self, position: Vec2, heading: f32) -> Self {
        self.transform = Transform::new(position, heading);
        self
    }

    pub fn program(mut self, source: SourceId) -> Self {
        self.program = Some(source);
        self
    }

    /// No processor: the entity is only a target or a cargo partner.
    pub fn passive(mut self) -> Self {
        self.processor = false;
        self
    }

    pub fn with_drive(mut self) -> Self {
        self.drive = true;
        self
    }

    pub fn with_radar(mut self) -> Self {
        self.radar = true;
        self
    }

    pub fn peripheral(mut self, kind: PeripheralKind) -> Self {
        self.peripheral = kind;
        self
    }

    pub fn with_pendrive(mut self) -> Self {
        self.pendrive = true;
        self
    }
}
