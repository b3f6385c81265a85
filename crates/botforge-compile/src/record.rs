//! Compilation records and the shared handles processors hold on them.
//!
//! A record is mutated only by the scheduler's commit point; everyone else
//! reads it through a [`RecordHandle`]. Setters that change anything the
//! owning peer can observe (status, progress, success) raise
//! `status_changed` so the next sync pass reports it.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use botforge_core::{Bytecode, DebugInfo, Diagnostic, SourceId, Version};

/// Where a record is in its compile cycle.
///
/// `None -> Scheduled -> Compiling -> Compiled -> Done`, with
/// `Compiling -> Scheduled` when a dependency is not available yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilationStatus {
    #[default]
    None,
    Scheduled,
    Compiling,
    Compiled,
    Done,
}

/// Output of a successful compile. Immutable once published.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    pub bytecode: Bytecode,
    pub debug_info: DebugInfo,
    /// Warnings and hints from a compile that still succeeded.
    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledProgram {
    pub fn new(bytecode: Bytecode, debug_info: DebugInfo) -> Self {
        CompiledProgram {
            bytecode,
            debug_info,
            diagnostics: Vec::new(),
        }
    }
}

/// Compile state of one source.
#[derive(Debug)]
pub struct CompilationRecord {
    source: SourceId,
    status: CompilationStatus,
    version: Version,
    /// Earliest instant the next compile attempt may start.
    scheduled_at: Instant,
    /// Fraction of outstanding dependency fetches completed, NaN if unknown.
    progress: f32,
    success: bool,
    program: Option<Arc<CompiledProgram>>,
    diagnostics: Vec<Diagnostic>,
    status_changed: bool,
    last_sync_at: Option<Instant>,
    /// Request counter; results tagged with an older generation are stale.
    generation: u64,
    in_flight: bool,
}

impl CompilationRecord {
    pub fn new(source: SourceId, now: Instant) -> Self {
        CompilationRecord {
            source,
            status: CompilationStatus::None,
            version: Version::NONE,
            scheduled_at: now,
            progress: f32::NAN,
            success: false,
            program: None,
            diagnostics: Vec::new(),
            status_changed: false,
            last_sync_at: None,
            generation: 0,
            in_flight: false,
        }
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn status(&self) -> CompilationStatus {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn scheduled_at(&self) -> Instant {
        self.scheduled_at
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn program(&self) -> Option<&Arc<CompiledProgram>> {
        self.program.as_ref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn status_changed(&self) -> bool {
        self.status_changed
    }

    pub fn last_sync_at(&self) -> Option<Instant> {
        self.last_sync_at
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// The program to execute, if the last compile finished successfully.
    pub fn runnable(&self) -> Option<(Version, Arc<CompiledProgram>)> {
        if self.status != CompilationStatus::Done || !self.success {
            return None;
        }
        self.program
            .as_ref()
            .map(|program| (self.version, Arc::clone(program)))
    }

    // -----------------------------------------------------------------------
    // Mutation (scheduler commit point only)
    // -----------------------------------------------------------------------

    pub(crate) fn set_status(&mut self, status: CompilationStatus) {
        if self.status != status {
            self.status = status;
            self.status_changed = true;
        }
    }

    pub(crate) fn set_progress(&mut self, progress: f32) {
        let same = (self.progress.is_nan() && progress.is_nan()) || self.progress == progress;
        if !same {
            self.progress = progress;
            self.status_changed = true;
        }
    }

    pub(crate) fn set_success(&mut self, success: bool) {
        if self.success != success {
            self.success = success;
            self.status_changed = true;
        }
    }

    /// Back to `Scheduled`. Diagnostics of an earlier compile no longer
    /// describe the pending one and are dropped.
    pub(crate) fn schedule(&mut self, at: Instant) {
        self.scheduled_at = at;
        self.diagnostics.clear();
        self.set_status(CompilationStatus::Scheduled);
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub(crate) fn set_program(&mut self, program: Option<Arc<CompiledProgram>>) {
        self.program = program;
    }

    pub(crate) fn set_diagnostics(&mut self, diagnostics: Vec<Diagnostic>) {
        self.diagnostics = diagnostics;
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub(crate) fn set_in_flight(&mut self, in_flight: bool) {
        self.in_flight = in_flight;
    }

    pub(crate) fn mark_synced(&mut self, now: Instant) {
        self.status_changed = false;
        self.last_sync_at = Some(now);
    }
}

/// Shared handle on a record. Cloning shares, never copies.
#[derive(Debug, Clone)]
pub struct RecordHandle(Arc<RwLock<CompilationRecord>>);

impl RecordHandle {
    pub fn new(record: CompilationRecord) -> Self {
        RecordHandle(Arc::new(RwLock::new(record)))
    }

    /// Read access. A poisoned lock is recovered: records hold no invariant
    /// that a panicking reader could break.
    pub fn read(&self) -> RwLockReadGuard<'_, CompilationRecord> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, CompilationRecord> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether both handles refer to the same record.
    pub fn ptr_eq(&self, other: &RecordHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn holders(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CompilationRecord {
        CompilationRecord::new(SourceId::local("main.asm"), Instant::now())
    }

    #[test]
    fn new_record_is_idle() {
        let r = record();
        assert_eq!(r.status(), CompilationStatus::None);
        assert_eq!(r.version(), Version::NONE);
        assert!(r.progress().is_nan());
        assert!(!r.status_changed());
        assert!(r.runnable().is_none());
    }

    #[test]
    fn setters_flag_observable_changes() {
        let mut r = record();
        r.set_status(CompilationStatus::Scheduled);
        assert!(r.status_changed());
        r.mark_synced(Instant::now());

        r.set_status(CompilationStatus::Scheduled);
        assert!(!r.status_changed());

        r.set_progress(f32::NAN);
        assert!(!r.status_changed(), "NaN to NaN is not a change");
        r.set_progress(0.5);
        assert!(r.status_changed());
    }

    #[test]
    fn version_changes_are_not_status_changes() {
        let mut r = record();
        r.set_version(Version(7));
        assert!(!r.status_changed());
    }

    #[test]
    fn runnable_requires_done_and_success() {
        let mut r = record();
        let program = Arc::new(CompiledProgram::new(
            Bytecode::from_instructions(&[]),
            DebugInfo::default(),
        ));
        r.set_program(Some(program));
        r.set_version(Version(3));
        r.set_status(CompilationStatus::Compiled);
        r.set_success(true);
        assert!(r.runnable().is_none());

        r.set_status(CompilationStatus::Done);
        let (version, _) = r.runnable().unwrap();
        assert_eq!(version, Version(3));

        r.set_success(false);
        assert!(r.runnable().is_none());
    }

    #[test]
    fn handles_share_one_record() {
        let a = RecordHandle::new(record());
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.holders(), 2);
        a.write().set_status(CompilationStatus::Scheduled);
        assert_eq!(b.read().status(), CompilationStatus::Scheduled);
    }
}
