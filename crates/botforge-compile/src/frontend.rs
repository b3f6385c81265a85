//! Collaborator interfaces: the compiler frontend and the dependency
//! resolver.
//!
//! Both are called from worker threads, never from the simulation thread,
//! and must therefore be `Send + Sync`.

use std::sync::Arc;

use botforge_core::{Diagnostic, ExternalSignature, SourceId};

use crate::record::CompiledProgram;

/// Availability of a source's text.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Not present locally and no fetch is running.
    NotAvailable,
    /// A fetch is running; the value is its completion fraction in `[0, 1]`.
    InProgress(f32),
    Available(Arc<[u8]>),
}

/// Locates source text, locally or on the owning peer.
pub trait DependencyResolver: Send + Sync {
    fn resolve(&self, source: &SourceId) -> Resolution;

    /// Starts fetching `source` from its owner. Idempotent.
    fn begin_fetch(&self, source: &SourceId);
}

/// What the frontend learns when it asks for a dependency.
#[derive(Debug, Clone, PartialEq)]
pub enum DependencyLookup {
    Ready(Arc<[u8]>),
    /// Not available yet. The frontend should keep going to discover more
    /// missing dependencies, then return [`FrontendOutcome::NeedsDependency`].
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrontendOutcome {
    Compiled(CompiledProgram),
    /// At least one dependency was [`DependencyLookup::Pending`].
    NeedsDependency,
    /// The source has errors.
    Failed { diagnostics: Vec<Diagnostic> },
}

/// Turns source text into bytecode.
pub trait CompilerFrontend: Send + Sync {
    fn compile(
        &self,
        root: &SourceId,
        text: &[u8],
        externals: &[ExternalSignature],
        resolve: &mut dyn FnMut(&SourceId) -> DependencyLookup,
    ) -> FrontendOutcome;
}
