//! Status and diagnostics sync towards owning peers.
//!
//! The sync pass turns dirty records into messages. A record whose
//! `status_changed` flag is set is reported at most once per sync interval:
//! one [`StatusMessage`] followed by one [`DiagnosticMessage`] per stored
//! diagnostic, all addressed to the peer that owns the source. Transport is
//! the caller's concern; messages are plain serde values.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use botforge_core::{PeerId, Severity, SourceId, TextPosition};

use crate::record::CompilationStatus;
use crate::registry::CompilationRegistry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub source: SourceId,
    pub status: CompilationStatus,
    /// Fetch progress in `[0, 1]`; NaN (sent as `null`) when unknown.
    #[serde(with = "nan_as_null")]
    pub progress: f32,
    pub success: bool,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticMessage {
    pub source: SourceId,
    pub range_start: TextPosition,
    pub range_end: TextPosition,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncMessage {
    Status(StatusMessage),
    Diagnostic(DiagnosticMessage),
}

/// A message and the peer it is for.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: PeerId,
    pub message: SyncMessage,
}

/// Emits messages for every dirty record whose last sync is at least
/// `interval` old, and marks those records synced.
pub fn collect_sync(registry: &CompilationRegistry, now: Instant, interval: Duration) -> Vec<Outbound> {
    let mut handles: Vec<_> = registry
        .handles()
        .into_iter()
        .map(|handle| {
            let source = handle.read().source().clone();
            (source, handle)
        })
        .collect();
    handles.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = Vec::new();
    for (_, handle) in handles {
        let mut record = handle.write();
        if !record.status_changed() {
            continue;
        }
        if let Some(last) = record.last_sync_at() {
            if now.saturating_duration_since(last) < interval {
                continue;
            }
        }

        let source = record.source().clone();
        let to = source.owner;
        out.push(Outbound {
            to,
            message: SyncMessage::Status(StatusMessage {
                source: source.clone(),
                status: record.status(),
                progress: record.progress(),
                success: record.success(),
                version: i64::try_from(record.version().0).unwrap_or(i64::MAX),
            }),
        });
        for diagnostic in record.diagnostics() {
            out.push(Outbound {
                to,
                message: SyncMessage::Diagnostic(DiagnosticMessage {
                    source: source.clone(),
                    range_start: diagnostic.range.start,
                    range_end: diagnostic.range.end,
                    severity: diagnostic.severity,
                    message: diagnostic.message.clone(),
                }),
            });
        }
        record.mark_synced(now);
    }
    out
}

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(f32::NAN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::asm::AsmFrontend;
    use crate::resolver::LocalResolver;
    use crate::scheduler::CompilationScheduler;
    use crate::worker::InlineDispatcher;
    use crate::SchedulerConfig;

    fn setup(text: &str) -> (CompilationScheduler, SourceId) {
        let (scheduler, source, _) = setup_with_resolver(text);
        (scheduler, source)
    }

    fn setup_with_resolver(text: &str) -> (CompilationScheduler, SourceId, Arc<LocalResolver>) {
        let resolver = Arc::new(LocalResolver::new());
        let owner = PeerId::from_u128(7);
        let source = SourceId::new("main.asm", owner);
        resolver.set_available(&source, text);
        let scheduler = CompilationScheduler::new(
            Arc::new(CompilationRegistry::new()),
            resolver.clone(),
            Arc::new(AsmFrontend::new()),
            Box::new(InlineDispatcher),
            Arc::from(Vec::new()),
            SchedulerConfig::default(),
        );
        (scheduler, source, resolver)
    }

    #[test]
    fn status_goes_to_owner() {
        let (mut s, source) = setup("halt\n");
        let now = Instant::now();
        s.request(&source, now);
        s.tick(now);

        let out = collect_sync(s.registry(), now, Duration::from_secs(1));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, source.owner);
        match &out[0].message {
            SyncMessage::Status(status) => {
                assert_eq!(status.status, CompilationStatus::Done);
                assert!(status.success);
                assert_eq!(status.version, 1);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn diagnostics_follow_status() {
        let (mut s, source) = setup("halt\nfrobnicate\nmov r1\n");
        let now = Instant::now();
        s.request(&source, now);
        s.tick(now);

        let out = collect_sync(s.registry(), now, Duration::from_secs(1));
        assert_eq!(out.len(), 3);
        assert!(matches!(out[0].message, SyncMessage::Status(_)));
        match &out[1].message {
            SyncMessage::Diagnostic(d) => {
                assert_eq!(d.range_start.line, 1);
                assert_eq!(d.severity, Severity::Error);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn sync_is_throttled_per_record() {
        let (mut s, source) = setup("halt\n");
        let t0 = Instant::now();
        let handle = s.request(&source, t0);
        assert_eq!(collect_sync(s.registry(), t0, Duration::from_secs(1)).len(), 1);

        // A change inside the interval is held back, then sent once.
        s.tick(t0);
        assert!(handle.read().status_changed());
        let half = t0 + Duration::from_millis(500);
        assert!(collect_sync(s.registry(), half, Duration::from_secs(1)).is_empty());
        let later = t0 + Duration::from_secs(1);
        assert_eq!(collect_sync(s.registry(), later, Duration::from_secs(1)).len(), 1);
        assert!(collect_sync(s.registry(), later + Duration::from_secs(5), Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn oscillation_emits_no_diagnostics() {
        let (mut s, source) = setup(".include \"far.asm\"\nhalt\n");
        let mut now = Instant::now();
        let mut messages = Vec::new();
        for _ in 0..4 {
            s.request(&source, now);
            s.tick(now);
            messages.extend(collect_sync(s.registry(), now, Duration::from_secs(1)));
            now += Duration::from_secs(5);
        }
        assert!(!messages.is_empty());
        assert!(messages
            .iter()
            .all(|m| matches!(m.message, SyncMessage::Status(_))));
    }

    #[test]
    fn nan_progress_is_null_on_the_wire() {
        let message = SyncMessage::Status(StatusMessage {
            source: SourceId::local("a.asm"),
            status: CompilationStatus::Scheduled,
            progress: f32::NAN,
            success: false,
            version: 0,
        });
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["kind"], "status");
        assert!(json["progress"].is_null());
        let back: SyncMessage = serde_json::from_value(json).unwrap();
        match back {
            SyncMessage::Status(status) => assert!(status.progress.is_nan()),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn rescheduled_failure_drops_its_old_diagnostics() {
        let (mut s, source, resolver) = setup_with_resolver("frobnicate r1\n");
        let mut now = Instant::now();
        let handle = s.request(&source, now);
        s.tick(now);
        assert_eq!(handle.read().diagnostics().len(), 1);
        assert_eq!(collect_sync(s.registry(), now, Duration::from_secs(1)).len(), 2);

        resolver.set_available(&source, ".include \"never.asm\"\nhalt\n");
        s.invalidate(&source, now).unwrap();
        assert!(handle.read().diagnostics().is_empty());

        let mut messages = Vec::new();
        for _ in 0..4 {
            now += Duration::from_secs(5);
            s.request(&source, now);
            s.tick(now);
            messages.extend(collect_sync(s.registry(), now, Duration::from_secs(1)));
        }
        assert!(!messages.is_empty());
        assert!(messages
            .iter()
            .all(|m| matches!(m.message, SyncMessage::Status(_))));
        assert_eq!(handle.read().status(), CompilationStatus::Scheduled);
    }
}
