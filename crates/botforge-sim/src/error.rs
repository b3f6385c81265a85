//! Simulation error types.

use std::path::PathBuf;

use botforge_compile::SchedulerError;
use botforge_core::EntityId;

/// Errors surfaced by the host-facing simulation API.
///
/// Nothing a program does produces one of these: program faults become
/// signals on the entity, ABI misuse becomes a failure code.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {var}")]
    InvalidOverride { var: String, value: String },

    #[error("no entity {0:?}")]
    UnknownEntity(EntityId),

    #[error("entity {0:?} has no processor")]
    NotAProcessor(EntityId),

    #[error("no GUI element {0}")]
    UnknownGuiElement(u32),

    #[error("{queue} queue of entity {entity:?} is full")]
    QueueFull {
        entity: EntityId,
        queue: &'static str,
    },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
