//! Compilation scheduling for player-submitted programs.
//!
//! Sources are compiled in the background while the simulation keeps
//! ticking. Each distinct [`SourceId`](botforge_core::SourceId) gets exactly
//! one [`CompilationRecord`](record::CompilationRecord), shared by every
//! processor that runs it. Dependencies may live on a remote peer; a compile
//! that hits an unfetched dependency is retried after a backoff instead of
//! reporting an error.
//!
//! # Modules
//!
//! - [`record`] -- Compilation record, status state and compiled program
//! - [`registry`] -- Process-wide record table with reference-counted GC
//! - [`scheduler`] -- The per-tick state machine driving every record
//! - [`worker`] -- Background compile jobs and their result channel
//! - [`dependents`] -- Reverse dependency graph for invalidation
//! - [`sync`] -- Status/diagnostic messages sent to owning peers
//! - [`frontend`] -- Collaborator traits for compilers and resolvers
//! - [`resolver`] -- In-memory dependency resolver
//! - [`asm`] -- Reference assembler frontend

pub mod asm;
pub mod dependents;
pub mod error;
pub mod frontend;
pub mod record;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod sync;
pub mod worker;

pub use error::SchedulerError;
pub use frontend::{CompilerFrontend, DependencyLookup, DependencyResolver, FrontendOutcome, Resolution};
pub use record::{CompilationRecord, CompilationStatus, CompiledProgram, RecordHandle};
pub use registry::CompilationRegistry;
pub use scheduler::{CompilationScheduler, TickReport};
pub use sync::{collect_sync, DiagnosticMessage, Outbound, StatusMessage, SyncMessage};
pub use worker::{Dispatcher, InlineDispatcher, TokioDispatcher};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs for the scheduler and the sync pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Delay before retrying a compile that needed an unavailable dependency.
    #[serde(with = "duration_ms")]
    pub retry_backoff: Duration,
    /// Minimum interval between two status syncs of the same record.
    #[serde(with = "duration_ms")]
    pub sync_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            retry_backoff: Duration::from_secs(5),
            sync_interval: Duration::from_secs(1),
        }
    }
}

/// Serializes a [`Duration`] as whole milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
