//! The compilation scheduler state machine.
//!
//! # Architecture
//!
//! The scheduler runs once per simulation tick, on the simulation thread.
//! Processors call [`CompilationScheduler::request`] for the source they run,
//! which creates the record if needed and marks the source as demanded for
//! this pass. [`CompilationScheduler::tick`] then:
//!
//! 1. dispatches one compile job for every demanded record that is
//!    `Scheduled`, due, and not already compiling;
//! 2. drains the worker channel and commits each result (the only place
//!    records are written after creation);
//! 3. finalizes every record committed this pass from `Compiled` to `Done`;
//! 4. clears the demand set.
//!
//! Results carry the record generation they were started for. Invalidation
//! bumps the generation, so a result for an outdated request is dropped on
//! arrival instead of being cancelled.

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexSet;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use botforge_core::{ExternalSignature, SourceId};

use crate::dependents::DependencyGraph;
use crate::error::SchedulerError;
use crate::frontend::{CompilerFrontend, DependencyResolver};
use crate::record::{CompilationStatus, RecordHandle};
use crate::registry::CompilationRegistry;
use crate::worker::{CompileJob, Dispatcher, JobOutcome, JobResult};
use crate::SchedulerConfig;

/// Counters from one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: usize,
    pub committed: usize,
    /// Results dropped because their record was gone or re-requested.
    pub discarded: usize,
    pub finalized: usize,
}

pub struct CompilationScheduler {
    registry: Arc<CompilationRegistry>,
    resolver: Arc<dyn DependencyResolver>,
    frontend: Arc<dyn CompilerFrontend>,
    dispatcher: Box<dyn Dispatcher>,
    externals: Arc<[ExternalSignature]>,
    config: SchedulerConfig,
    /// Sources requested since the last pass, in request order.
    demanded: IndexSet<SourceId>,
    dependencies: DependencyGraph,
    results_tx: UnboundedSender<JobResult>,
    results_rx: UnboundedReceiver<JobResult>,
}

impl CompilationScheduler {
    pub fn new(
        registry: Arc<CompilationRegistry>,
        resolver: Arc<dyn DependencyResolver>,
        frontend: Arc<dyn CompilerFrontend>,
        dispatcher: Box<dyn Dispatcher>,
        externals: Arc<[ExternalSignature]>,
        config: SchedulerConfig,
    ) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        CompilationScheduler {
            registry,
            resolver,
            frontend,
            dispatcher,
            externals,
            config,
            demanded: IndexSet::new(),
            dependencies: DependencyGraph::new(),
            results_tx,
            results_rx,
        }
    }

    pub fn registry(&self) -> &Arc<CompilationRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.dependencies
    }

    /// Ensures a record exists for `source` and marks it demanded for the
    /// next pass. A record seen for the first time moves to `Scheduled`.
    pub fn request(&mut self, source: &SourceId, now: Instant) -> RecordHandle {
        let handle = self.registry.get_or_create(source, now);
        {
            let mut record = handle.write();
            if record.status() == CompilationStatus::None {
                record.set_generation(self.registry.fresh_generation());
                record.schedule(now);
                tracing::debug!(%source, "compilation scheduled");
            }
        }
        self.demanded.insert(source.clone());
        handle
    }

    /// The owner uploaded new text for `source`: recompile it and every
    /// record that read it. Returns how many records were rescheduled.
    pub fn invalidate(&mut self, source: &SourceId, now: Instant) -> Result<usize, SchedulerError> {
        let mut targets = vec![source.clone()];
        targets.extend(self.dependencies.dependents(source));

        let mut rescheduled = 0;
        for target in &targets {
            let Some(handle) = self.registry.get(target) else {
                continue;
            };
            let mut record = handle.write();
            record.set_generation(self.registry.fresh_generation());
            record.schedule(now);
            rescheduled += 1;
        }

        if rescheduled == 0 && !self.dependencies.contains(source) {
            return Err(SchedulerError::UnknownSource { id: source.clone() });
        }
        tracing::info!(%source, rescheduled, "source invalidated");
        Ok(rescheduled)
    }

    /// Runs one scheduler pass.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        // Phase 1: dispatch due demanded records
        let demanded: Vec<SourceId> = self.demanded.iter().cloned().collect();
        for source in &demanded {
            if self.dispatch_if_due(source, now) {
                report.dispatched += 1;
            }
        }

        // Phase 2: commit worker results
        let mut committed: Vec<RecordHandle> = Vec::new();
        while let Ok(result) = self.results_rx.try_recv() {
            match self.commit(result, now) {
                Some(handle) => {
                    report.committed += 1;
                    committed.push(handle);
                }
                None => report.discarded += 1,
            }
        }

        // Phase 3: finalize
        for handle in &committed {
            let mut record = handle.write();
            if record.status() == CompilationStatus::Compiled {
                record.set_status(CompilationStatus::Done);
                report.finalized += 1;
            }
        }

        // Phase 4: reset demand
        self.demanded.clear();
        report
    }

    fn dispatch_if_due(&mut self, source: &SourceId, now: Instant) -> bool {
        let Some(handle) = self.registry.get(source) else {
            return false;
        };
        let generation = {
            let mut record = handle.write();
            if record.status() != CompilationStatus::Scheduled
                || record.in_flight()
                || now < record.scheduled_at()
            {
                return false;
            }
            record.set_status(CompilationStatus::Compiling);
            record.set_in_flight(true);
            record.generation()
        };

        let job = CompileJob {
            source: source.clone(),
            generation,
            resolver: Arc::clone(&self.resolver),
            frontend: Arc::clone(&self.frontend),
            externals: Arc::clone(&self.externals),
        };
        if let Err(err) = self.dispatcher.dispatch(job, &self.results_tx) {
            tracing::warn!(%source, error = %err, "compile dispatch failed, retrying later");
            let mut record = handle.write();
            record.set_in_flight(false);
            record.schedule(now + self.config.retry_backoff);
            return false;
        }
        true
    }

    /// Applies one worker result. Returns the handle when the record moved to
    /// `Compiled`, `None` when the result was stale or not a completion.
    fn commit(&mut self, result: JobResult, now: Instant) -> Option<RecordHandle> {
        let JobResult {
            source,
            generation,
            outcome,
        } = result;

        let Some(handle) = self.registry.get(&source) else {
            tracing::debug!(%source, "result for collected record dropped");
            return None;
        };
        let mut record = handle.write();
        // Only one job per record runs at a time, so whatever arrives is it.
        record.set_in_flight(false);

        if record.generation() != generation {
            tracing::debug!(
                %source,
                generation,
                current = record.generation(),
                "stale compile result dropped"
            );
            return None;
        }

        match outcome {
            JobOutcome::Compiled {
                program,
                dependencies,
            } => {
                let version = self.registry.fresh_version();
                tracing::info!(%source, %version, warnings = program.diagnostics.len(), "compiled");
                record.set_version(version);
                record.set_diagnostics(program.diagnostics.clone());
                record.set_program(Some(Arc::new(program)));
                record.set_success(true);
                record.set_progress(f32::NAN);
                record.set_status(CompilationStatus::Compiled);
                self.dependencies.set_dependencies(&source, &dependencies);
            }
            JobOutcome::Failed {
                diagnostics,
                dependencies,
            } => {
                let version = self.registry.fresh_version();
                tracing::info!(%source, %version, errors = diagnostics.len(), "compile failed");
                record.set_version(version);
                record.set_diagnostics(diagnostics);
                record.set_program(None);
                record.set_success(false);
                record.set_progress(f32::NAN);
                record.set_status(CompilationStatus::Compiled);
                self.dependencies.set_dependencies(&source, &dependencies);
            }
            JobOutcome::NeedsDependency { progress } => {
                tracing::debug!(%source, progress, "waiting for dependencies");
                record.set_progress(progress);
                record.schedule(now + self.config.retry_backoff);
                return None;
            }
        }
        drop(record);
        Some(handle)
    }

    /// Drops unreferenced records and their dependency edges.
    pub fn collect_garbage(&mut self) -> Vec<SourceId> {
        let collected = self.registry.collect_garbage();
        for source in &collected {
            self.dependencies.remove(source);
            self.demanded.shift_remove(source);
        }
        collected
    }
}
