//! Process-wide table of compilation records.
//!
//! The registry is an ordinary value owned by the host and passed to the
//! scheduler; there is no global instance. Records are reference counted:
//! once no processor holds a [`RecordHandle`] the registry's own handle is
//! the last one and [`CompilationRegistry::collect_garbage`] drops it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use botforge_core::{SourceId, Version};

use crate::record::{CompilationRecord, CompilationStatus, CompiledProgram, RecordHandle};

#[derive(Debug)]
pub struct CompilationRegistry {
    records: DashMap<SourceId, RecordHandle>,
    /// Next version to hand out. Starts at 1 so that 0 means "never compiled".
    next_version: AtomicU64,
    next_generation: AtomicU64,
}

impl CompilationRegistry {
    pub fn new() -> Self {
        CompilationRegistry {
            records: DashMap::new(),
            next_version: AtomicU64::new(1),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn get(&self, source: &SourceId) -> Option<RecordHandle> {
        self.records.get(source).map(|entry| entry.value().clone())
    }

    /// The record for `source`, created in state `None` if missing.
    pub fn get_or_create(&self, source: &SourceId, now: Instant) -> RecordHandle {
        self.records
            .entry(source.clone())
            .or_insert_with(|| RecordHandle::new(CompilationRecord::new(source.clone(), now)))
            .value()
            .clone()
    }

    /// Registers an already-compiled program as a finished, successful
    /// record. Used for programs built ahead of time.
    pub fn publish(&self, source: &SourceId, program: CompiledProgram, now: Instant) -> RecordHandle {
        let handle = self.get_or_create(source, now);
        {
            let mut record = handle.write();
            record.set_generation(self.fresh_generation());
            record.set_version(self.fresh_version());
            record.set_diagnostics(program.diagnostics.clone());
            record.set_program(Some(Arc::new(program)));
            record.set_success(true);
            record.set_progress(f32::NAN);
            record.set_status(CompilationStatus::Done);
        }
        handle
    }

    /// Snapshot of every live handle.
    pub fn handles(&self) -> Vec<RecordHandle> {
        self.records
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A version never handed out before.
    pub fn fresh_version(&self) -> Version {
        Version(self.next_version.fetch_add(1, Ordering::Relaxed))
    }

    /// A generation never handed out before, even across collected records.
    pub fn fresh_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Removes every record nobody but the registry references and returns
    /// the collected sources.
    pub fn collect_garbage(&self) -> Vec<SourceId> {
        let mut collected = Vec::new();
        self.records.retain(|source, handle| {
            let keep = handle.holders() > 1;
            if !keep {
                collected.push(source.clone());
            }
            keep
        });
        if !collected.is_empty() {
            tracing::debug!(count = collected.len(), "collected unreferenced compilation records");
        }
        collected
    }
}

impl Default for CompilationRegistry {
    fn default() -> Self {
        CompilationRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botforge_core::{Bytecode, DebugInfo};

    #[test]
    fn one_record_per_source() {
        let registry = CompilationRegistry::new();
        let now = Instant::now();
        let a = registry.get_or_create(&SourceId::local("a.asm"), now);
        let again = registry.get_or_create(&SourceId::local("a.asm"), now);
        let b = registry.get_or_create(&SourceId::local("b.asm"), now);
        assert!(a.ptr_eq(&again));
        assert!(!a.ptr_eq(&b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn versions_are_fresh_and_nonzero() {
        let registry = CompilationRegistry::new();
        let first = registry.fresh_version();
        let second = registry.fresh_version();
        assert_ne!(first, Version::NONE);
        assert!(second > first);
    }

    #[test]
    fn gc_drops_only_unreferenced_records() {
        let registry = CompilationRegistry::new();
        let now = Instant::now();
        let held = registry.get_or_create(&SourceId::local("held.asm"), now);
        drop(registry.get_or_create(&SourceId::local("dropped.asm"), now));

        let collected = registry.collect_garbage();
        assert_eq!(collected, vec![SourceId::local("dropped.asm")]);
        assert!(registry.get(&SourceId::local("held.asm")).is_some());
        assert!(registry.get(&SourceId::local("dropped.asm")).is_none());

        drop(held);
        assert_eq!(registry.collect_garbage().len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn publish_marks_done() {
        let registry = CompilationRegistry::new();
        let program = CompiledProgram::new(Bytecode::from_instructions(&[]), DebugInfo::default());
        let handle = registry.publish(&SourceId::local("pre.asm"), program, Instant::now());
        let record = handle.read();
        assert_eq!(record.status(), CompilationStatus::Done);
        assert!(record.runnable().is_some());
    }
}
