//! End-to-end tests for the compilation scheduler.
//!
//! Each test drives a [`CompilationScheduler`] against a [`LocalResolver`]
//! and the reference assembler, ticking with explicit instants so backoff
//! windows are deterministic.
//!
//! Tests cover:
//! - First reference through to a runnable program
//! - Remote dependency arriving after one retry cycle
//! - Permanently missing dependency (no diagnostics, no success)
//! - Legal status transitions under arbitrary resolver behavior
//! - Background compilation on a tokio runtime

use std::sync::Arc;
use std::time::{Duration, Instant};

use proptest::prelude::*;

use botforge_compile::asm::AsmFrontend;
use botforge_compile::resolver::LocalResolver;
use botforge_compile::{
    collect_sync, CompilationRegistry, CompilationScheduler, CompilationStatus, Dispatcher,
    InlineDispatcher, SchedulerConfig, SyncMessage, TokioDispatcher,
};
use botforge_core::{PeerId, SourceId, Version};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn scheduler_with(resolver: Arc<LocalResolver>, dispatcher: Box<dyn Dispatcher>) -> CompilationScheduler {
    CompilationScheduler::new(
        Arc::new(CompilationRegistry::new()),
        resolver,
        Arc::new(AsmFrontend::new()),
        dispatcher,
        Arc::from(Vec::new()),
        SchedulerConfig::default(),
    )
}

fn scheduler(resolver: Arc<LocalResolver>) -> CompilationScheduler {
    scheduler_with(resolver, Box::new(InlineDispatcher))
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn first_reference_reaches_done_with_version_one() {
    let resolver = Arc::new(LocalResolver::new());
    let source = resolver.insert("a.lang", "li r1, 1\nhalt\n");
    let mut s = scheduler(resolver);
    let now = Instant::now();

    let handle = s.request(&source, now);
    assert_eq!(handle.read().status(), CompilationStatus::Scheduled);

    s.tick(now);
    let record = handle.read();
    assert_eq!(record.status(), CompilationStatus::Done);
    assert!(record.success());
    assert_eq!(record.version(), Version(1));
}

#[test]
fn remote_dependency_arrives_after_one_retry_cycle() {
    let resolver = Arc::new(LocalResolver::new());
    let source = resolver.insert("a.lang", ".include \"b.lang\"\nhalt\n");
    let mut s = scheduler(resolver.clone());
    let t0 = Instant::now();

    let handle = s.request(&source, t0);
    s.tick(t0);
    assert_eq!(handle.read().status(), CompilationStatus::Scheduled);
    assert_eq!(resolver.fetch_requests(), vec![SourceId::local("b.lang")]);

    // Ticks inside the backoff window do nothing.
    for second in 1..5 {
        let t = t0 + Duration::from_secs(second);
        s.request(&source, t);
        assert_eq!(s.tick(t).dispatched, 0);
        assert_eq!(handle.read().status(), CompilationStatus::Scheduled);
    }

    resolver.insert("b.lang", "nop\n");
    let t6 = t0 + Duration::from_secs(6);
    s.request(&source, t6);
    s.tick(t6);
    let record = handle.read();
    assert_eq!(record.status(), CompilationStatus::Done);
    assert!(record.success());
}

#[test]
fn unavailable_dependency_never_produces_diagnostics() {
    let resolver = Arc::new(LocalResolver::new());
    let source = resolver.insert("a.lang", ".include \"never.lang\"\nhalt\n");
    let mut s = scheduler(resolver);
    let mut now = Instant::now();
    let handle = s.request(&source, now);

    let mut sent = Vec::new();
    for _ in 0..20 {
        s.request(&source, now);
        s.tick(now);
        let record = handle.read();
        assert!(matches!(
            record.status(),
            CompilationStatus::Scheduled | CompilationStatus::Compiling
        ));
        assert!(!record.success());
        assert!(record.diagnostics().is_empty());
        drop(record);
        sent.extend(collect_sync(s.registry(), now, Duration::from_secs(1)));
        now += Duration::from_secs(5);
    }
    assert!(sent
        .iter()
        .all(|m| matches!(m.message, SyncMessage::Status(_))));
}

#[test]
fn sources_of_different_peers_are_distinct() {
    let resolver = Arc::new(LocalResolver::new());
    let alice = SourceId::new("main.asm", PeerId::from_u128(1));
    let bob = SourceId::new("main.asm", PeerId::from_u128(2));
    resolver.set_available(&alice, "halt\n");
    resolver.set_available(&bob, "nop\nhalt\n");
    let mut s = scheduler(resolver);
    let now = Instant::now();

    let a = s.request(&alice, now);
    let b = s.request(&bob, now);
    assert!(!a.ptr_eq(&b));
    s.tick(now);
    assert_eq!(a.read().program().unwrap().bytecode.len(), 1);
    assert_eq!(b.read().program().unwrap().bytecode.len(), 2);
}

// ---------------------------------------------------------------------------
// Transition property
// ---------------------------------------------------------------------------

fn legal(from: CompilationStatus, to: CompilationStatus) -> bool {
    use CompilationStatus::*;
    from == to
        || matches!(
            (from, to),
            (None, Scheduled)
                | (Scheduled, Compiling)
                | (Compiling, Scheduled)
                | (Compiling, Compiled)
                | (Compiled, Done)
                // One inline pass dispatches and commits, so a tick can
                // observe Scheduled -> Done or Scheduled -> Scheduled.
                | (Scheduled, Done)
        )
}

proptest! {
    #[test]
    fn status_only_follows_legal_transitions(
        availability in proptest::collection::vec(0u8..3, 1..30),
    ) {
        let resolver = Arc::new(LocalResolver::new());
        let source = resolver.insert("main.asm", ".include \"dep.asm\"\nhalt\n");
        let dep = SourceId::local("dep.asm");
        let mut s = scheduler(resolver.clone());
        let mut now = Instant::now();
        let handle = s.request(&source, now);
        let mut previous = handle.read().status();

        for state in availability {
            match state {
                0 => resolver.set_unavailable(&dep),
                1 => resolver.set_in_progress(&dep, 0.5),
                _ => resolver.set_available(&dep, "nop\n"),
            }
            s.request(&source, now);
            s.tick(now);
            let current = handle.read().status();
            prop_assert!(legal(previous, current), "{:?} -> {:?}", previous, current);
            if current == CompilationStatus::Done {
                prop_assert!(handle.read().success());
                break;
            }
            previous = current;
            now += Duration::from_secs(5);
        }
    }
}

// ---------------------------------------------------------------------------
// Background dispatch
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn background_compile_is_committed_on_a_later_pass() {
    let resolver = Arc::new(LocalResolver::new());
    let source = resolver.insert("main.asm", "halt\n");
    let dispatcher = TokioDispatcher::current().expect("inside a runtime");
    let mut s = scheduler_with(resolver, Box::new(dispatcher));
    let handle = s.request(&source, Instant::now());

    let mut done = false;
    for _ in 0..200 {
        s.request(&source, Instant::now());
        s.tick(Instant::now());
        if handle.read().status() == CompilationStatus::Done {
            done = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(done, "background compile never committed");
    assert!(handle.read().success());
}
