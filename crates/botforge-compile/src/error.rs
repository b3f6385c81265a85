//! Scheduler error types.

use botforge_core::SourceId;

/// Errors surfaced by the compilation scheduler.
///
/// None of these are compile failures: those are reported to the owning
/// peer as diagnostics and never travel as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// The source has no record (never requested, or already collected).
    #[error("no compilation record for {id}")]
    UnknownSource { id: SourceId },

    /// A compile job could not be handed to its worker.
    #[error("failed to dispatch compile job for {id}: {reason}")]
    DispatchFailed { id: SourceId, reason: String },

    /// The result channel was closed before a job finished.
    #[error("compile result channel closed")]
    ChannelClosed,
}
