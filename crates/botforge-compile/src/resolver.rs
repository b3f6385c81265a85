//! In-memory dependency resolver.
//!
//! Holds source text keyed by [`SourceId`]. Entries can be put into any
//! [`Resolution`] state, which lets hosts and tests model a remote peer that
//! serves files slowly. `begin_fetch` on an unknown source marks it as
//! in progress and records the request.

use std::path::Path;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use botforge_core::SourceId;

use crate::frontend::{DependencyResolver, Resolution};

#[derive(Debug, Default)]
pub struct LocalResolver {
    entries: DashMap<SourceId, Resolution>,
    fetches: Mutex<Vec<SourceId>>,
}

impl LocalResolver {
    pub fn new() -> Self {
        LocalResolver::default()
    }

    /// Loads every file under `root` as a server-owned source named by its
    /// path relative to `root` (with `/` separators).
    pub fn from_dir(root: &Path) -> std::io::Result<Self> {
        let resolver = LocalResolver::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                resolver.insert(name, std::fs::read(&path)?);
            }
        }
        Ok(resolver)
    }

    /// Makes a server-owned source available.
    pub fn insert(&self, path: impl Into<String>, text: impl AsRef<[u8]>) -> SourceId {
        let source = SourceId::local(path);
        self.set_available(&source, text);
        source
    }

    pub fn set_available(&self, source: &SourceId, text: impl AsRef<[u8]>) {
        self.entries.insert(
            source.clone(),
            Resolution::Available(Arc::from(text.as_ref())),
        );
    }

    pub fn set_in_progress(&self, source: &SourceId, fraction: f32) {
        self.entries
            .insert(source.clone(), Resolution::InProgress(fraction));
    }

    pub fn set_unavailable(&self, source: &SourceId) {
        self.entries.remove(source);
    }

    /// Every source a fetch was started for, in request order.
    pub fn fetch_requests(&self) -> Vec<SourceId> {
        self.fetches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl DependencyResolver for LocalResolver {
    fn resolve(&self, source: &SourceId) -> Resolution {
        self.entries
            .get(source)
            .map(|entry| entry.value().clone())
            .unwrap_or(Resolution::NotAvailable)
    }

    fn begin_fetch(&self, source: &SourceId) {
        if self.entries.contains_key(source) {
            return;
        }
        self.entries
            .insert(source.clone(), Resolution::InProgress(0.0));
        self.fetches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(source.clone());
        tracing::debug!(%source, "fetch requested");
    }
}
