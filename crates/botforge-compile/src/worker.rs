//! Background compile jobs.
//!
//! A [`CompileJob`] is self-contained: it owns clones of everything it needs
//! and reports back through an unbounded channel. Jobs never touch the
//! record table; the scheduler commits their [`JobResult`]s on the
//! simulation thread.

use std::sync::Arc;

use indexmap::IndexSet;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;

use botforge_core::{Diagnostic, ExternalSignature, SourceId};

use crate::error::SchedulerError;
use crate::frontend::{
    CompilerFrontend, DependencyLookup, DependencyResolver, FrontendOutcome, Resolution,
};
use crate::record::CompiledProgram;

/// One frontend invocation for one record generation.
#[derive(Clone)]
pub struct CompileJob {
    pub source: SourceId,
    pub generation: u64,
    pub resolver: Arc<dyn DependencyResolver>,
    pub frontend: Arc<dyn CompilerFrontend>,
    pub externals: Arc<[ExternalSignature]>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Compiled {
        program: CompiledProgram,
        /// Every source the compile read besides the root.
        dependencies: Vec<SourceId>,
    },
    NeedsDependency {
        /// Mean completion of the outstanding fetches, NaN if none reported.
        progress: f32,
    },
    Failed {
        diagnostics: Vec<Diagnostic>,
        dependencies: Vec<SourceId>,
    },
}

/// Message from a worker to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub source: SourceId,
    pub generation: u64,
    pub outcome: JobOutcome,
}

/// Records which sources a compile touched and how far along the missing
/// ones are.
#[derive(Default)]
struct FetchTracker {
    dependencies: IndexSet<SourceId>,
    outstanding: Vec<f32>,
}

impl FetchTracker {
    fn lookup(&mut self, resolver: &dyn DependencyResolver, source: &SourceId) -> DependencyLookup {
        match resolver.resolve(source) {
            Resolution::Available(text) => DependencyLookup::Ready(text),
            Resolution::InProgress(fraction) => {
                self.outstanding.push(fraction.clamp(0.0, 1.0));
                DependencyLookup::Pending
            }
            Resolution::NotAvailable => {
                resolver.begin_fetch(source);
                self.outstanding.push(0.0);
                DependencyLookup::Pending
            }
        }
    }

    fn progress(&self) -> f32 {
        if self.outstanding.is_empty() {
            return f32::NAN;
        }
        self.outstanding.iter().sum::<f32>() / self.outstanding.len() as f32
    }

    fn into_dependencies(self) -> Vec<SourceId> {
        self.dependencies.into_iter().collect()
    }
}

impl CompileJob {
    /// Resolves the root, runs the frontend and classifies the result.
    pub fn run(&self) -> JobOutcome {
        let mut tracker = FetchTracker::default();
        let resolver = self.resolver.as_ref();

        let root_text = match tracker.lookup(resolver, &self.source) {
            DependencyLookup::Ready(text) => text,
            DependencyLookup::Pending => {
                tracing::debug!(source = %self.source, "root source not available yet");
                return JobOutcome::NeedsDependency {
                    progress: tracker.progress(),
                };
            }
        };

        let root = self.source.clone();
        let outcome = {
            let mut resolve = |dependency: &SourceId| {
                if *dependency != root {
                    tracker.dependencies.insert(dependency.clone());
                }
                tracker.lookup(resolver, dependency)
            };
            self.frontend
                .compile(&self.source, &root_text, &self.externals, &mut resolve)
        };

        match outcome {
            FrontendOutcome::Compiled(program) => JobOutcome::Compiled {
                program,
                dependencies: tracker.into_dependencies(),
            },
            FrontendOutcome::NeedsDependency => {
                let progress = tracker.progress();
                tracing::debug!(source = %self.source, progress, "compile waiting on dependencies");
                JobOutcome::NeedsDependency { progress }
            }
            FrontendOutcome::Failed { diagnostics } => JobOutcome::Failed {
                diagnostics,
                dependencies: tracker.into_dependencies(),
            },
        }
    }

    pub fn into_result(self) -> JobResult {
        let outcome = self.run();
        JobResult {
            source: self.source,
            generation: self.generation,
            outcome,
        }
    }
}

/// Decides where compile jobs run.
pub trait Dispatcher: Send + Sync {
    fn dispatch(
        &self,
        job: CompileJob,
        results: &UnboundedSender<JobResult>,
    ) -> Result<(), SchedulerError>;
}

/// Runs the job on the calling thread before returning. Deterministic, for
/// tests and single-threaded tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(
        &self,
        job: CompileJob,
        results: &UnboundedSender<JobResult>,
    ) -> Result<(), SchedulerError> {
        results
            .send(job.into_result())
            .map_err(|_| SchedulerError::ChannelClosed)
    }
}

/// Runs jobs on a tokio runtime's blocking pool.
#[derive(Debug, Clone)]
pub struct TokioDispatcher {
    handle: Handle,
}

impl TokioDispatcher {
    pub fn new(handle: Handle) -> Self {
        TokioDispatcher { handle }
    }

    /// Dispatcher on the runtime the caller is running in, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(TokioDispatcher::new)
    }
}

impl Dispatcher for TokioDispatcher {
    fn dispatch(
        &self,
        job: CompileJob,
        results: &UnboundedSender<JobResult>,
    ) -> Result<(), SchedulerError> {
        if results.is_closed() {
            return Err(SchedulerError::ChannelClosed);
        }
        let results = results.clone();
        self.handle.spawn_blocking(move || {
            let source = job.source.clone();
            if results.send(job.into_result()).is_err() {
                tracing::debug!(%source, "scheduler gone, dropping compile result");
            }
        });
        Ok(())
    }
}
