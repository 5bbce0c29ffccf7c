// crates/promstore-core/tests/leadership.rs
// ============================================================================
// Module: Leadership Tests
// Description: Tests for lease arbitration across redundant instances.
// ============================================================================
//! ## Overview
//! Drives several arbiters over one store with a manual clock to check
//! mutual exclusion, expiry-based transfer, fencing, and graceful release.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use promstore_core::CatalogStore;
use promstore_core::Clock;
use promstore_core::InMemoryStore;
use promstore_core::LeaderArbiter;
use promstore_core::LeaderConfig;
use promstore_core::LeaderError;
use promstore_core::LeaderLease;
use promstore_core::LeaderState;
use promstore_core::Leadership;
use promstore_core::LeaseStore;
use promstore_core::ManualClock;
use promstore_core::NoopMetrics;
use promstore_core::RelationName;
use promstore_core::StoreError;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const GROUP: &str = "leadership-tests";
const TTL: Duration = Duration::from_secs(15);

fn arbiter(
    store: &Arc<InMemoryStore>,
    clock: &Arc<ManualClock>,
    holder: &str,
) -> LeaderArbiter<InMemoryStore> {
    LeaderArbiter::new(
        Arc::clone(store),
        LeaderConfig::new(GROUP, holder),
        Arc::clone(clock) as Arc<dyn Clock>,
        Arc::new(NoopMetrics),
    )
    .unwrap()
}

fn leaders(arbiters: &[LeaderArbiter<InMemoryStore>]) -> Vec<usize> {
    arbiters
        .iter()
        .enumerate()
        .filter(|(_, arbiter)| arbiter.is_leading())
        .map(|(index, _)| index)
        .collect()
}

/// Lease store whose renewals park until the test lets them finish.
struct GatedRenewStore {
    inner: InMemoryStore,
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl GatedRenewStore {
    fn new() -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Self {
            inner: InMemoryStore::new(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        (store, entered_rx, release_tx)
    }
}

impl LeaseStore for GatedRenewStore {
    fn try_acquire_lease(
        &self,
        group_id: &str,
        holder_id: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<Option<LeaderLease>, StoreError> {
        self.inner.try_acquire_lease(group_id, holder_id, now_ms, ttl_ms)
    }

    fn renew_lease(
        &self,
        lease: &LeaderLease,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<Option<LeaderLease>, StoreError> {
        self.entered.lock().unwrap().send(()).unwrap();
        let _ = self.release.lock().unwrap().recv_timeout(Duration::from_secs(5));
        self.inner.renew_lease(lease, now_ms, ttl_ms)
    }

    fn release_lease(&self, lease: &LeaderLease) -> Result<(), StoreError> {
        self.inner.release_lease(lease)
    }

    fn current_lease(&self, group_id: &str) -> Result<Option<LeaderLease>, StoreError> {
        self.inner.current_lease(group_id)
    }
}

fn gated_leader(
    clock: &Arc<ManualClock>,
) -> (Arc<LeaderArbiter<GatedRenewStore>>, mpsc::Receiver<()>, mpsc::Sender<()>) {
    let (store, entered, release) = GatedRenewStore::new();
    let leader = LeaderArbiter::new(
        Arc::new(store),
        LeaderConfig::new(GROUP, "holder-a"),
        Arc::clone(clock) as Arc<dyn Clock>,
        Arc::new(NoopMetrics),
    )
    .unwrap();
    (Arc::new(leader), entered, release)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn exactly_one_of_many_candidates_leads() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let arbiters: Vec<_> =
        (0 .. 5).map(|index| arbiter(&store, &clock, &format!("holder-{index}"))).collect();

    for round in 0 .. 4 {
        for arbiter in &arbiters {
            arbiter.tick().unwrap();
        }
        assert_eq!(leaders(&arbiters).len(), 1, "round {round}");
        clock.advance(Duration::from_secs(5));
    }
    assert_eq!(leaders(&arbiters), vec![0]);
}

#[test]
fn leadership_transfers_after_expiry_with_higher_token() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let first = arbiter(&store, &clock, "holder-a");
    let second = arbiter(&store, &clock, "holder-b");

    assert_eq!(first.tick().unwrap(), LeaderState::Leader);
    assert_eq!(second.tick().unwrap(), LeaderState::Standby);
    let first_fence = first.current_fence().unwrap();

    clock.advance(TTL + Duration::from_millis(1));
    assert!(!first.is_leading());
    assert_eq!(second.tick().unwrap(), LeaderState::Leader);
    let second_fence = second.current_fence().unwrap();
    assert!(second_fence.token > first_fence.token);

    assert_eq!(first.tick().unwrap(), LeaderState::Standby);
    assert_eq!(leaders(&[first, second]), vec![1]);
}

#[test]
fn store_rejects_stale_fence() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let first = arbiter(&store, &clock, "holder-a");
    let second = arbiter(&store, &clock, "holder-b");
    first.tick().unwrap();
    let stale = first.current_fence().unwrap();

    clock.advance(TTL * 2);
    second.tick().unwrap();
    let err = store
        .create_metric_relations(&stale, &RelationName::data("x"), &RelationName::series("x"))
        .unwrap_err();
    assert!(matches!(err, StoreError::FenceRejected(_)));

    let fresh = second.current_fence().unwrap();
    store.create_metric_relations(&fresh, &RelationName::data("x"), &RelationName::series("x")).unwrap();
}

#[test]
fn renewal_keeps_the_same_term() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let leader = arbiter(&store, &clock, "holder-a");
    leader.tick().unwrap();
    let token = leader.current_fence().unwrap().token;

    for _ in 0 .. 10 {
        clock.advance(Duration::from_secs(5));
        assert_eq!(leader.tick().unwrap(), LeaderState::Leader);
        assert_eq!(leader.current_fence().unwrap().token, token);
    }
}

#[test]
fn stop_releases_lease_for_immediate_takeover() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let first = arbiter(&store, &clock, "holder-a");
    let second = arbiter(&store, &clock, "holder-b");
    first.tick().unwrap();
    second.tick().unwrap();

    first.stop().unwrap();
    assert_eq!(first.state(), LeaderState::Stopped);
    assert_eq!(first.tick().unwrap(), LeaderState::Stopped);
    assert_eq!(second.tick().unwrap(), LeaderState::Leader);
    let lease = store.current_lease(GROUP).unwrap().unwrap();
    assert_eq!(lease.holder_id, "holder-b");
}

#[test]
fn non_campaigning_instance_stays_standby() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let mut config = LeaderConfig::new(GROUP, "observer");
    config.campaign = false;
    let observer = LeaderArbiter::new(
        Arc::clone(&store),
        config,
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::new(NoopMetrics),
    )
    .unwrap();

    for _ in 0 .. 3 {
        assert_eq!(observer.tick().unwrap(), LeaderState::Standby);
        clock.advance(TTL);
    }
    assert!(store.current_lease(GROUP).unwrap().is_none());
}

#[test]
fn subscribers_observe_transitions() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let leader = arbiter(&store, &clock, "holder-a");
    let mut changes = leader.subscribe();
    assert_eq!(*changes.borrow_and_update(), Leadership::NotLeading);

    leader.tick().unwrap();
    assert!(changes.has_changed().unwrap());
    assert_eq!(*changes.borrow_and_update(), Leadership::Leading);

    leader.stop().unwrap();
    assert_eq!(*changes.borrow_and_update(), Leadership::NotLeading);
}

#[test]
fn invalid_timings_are_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let mut config = LeaderConfig::new(GROUP, "holder-a");
    config.renew_interval = TTL;
    let result = LeaderArbiter::new(
        Arc::clone(&store),
        config,
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::new(NoopMetrics),
    );
    assert!(matches!(result, Err(LeaderError::InvalidConfig(_))));
}

#[test]
fn background_loop_acquires_and_releases() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let leader = Arc::new(arbiter(&store, &clock, "holder-a"));
    let mut changes = leader.subscribe();
    let handle = leader.start().unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while *changes.borrow_and_update() != Leadership::Leading {
        assert!(std::time::Instant::now() < deadline, "loop never acquired the lease");
        std::thread::sleep(Duration::from_millis(5));
    }
    handle.shutdown().unwrap();
    assert_eq!(leader.state(), LeaderState::Stopped);
    assert!(store.current_lease(GROUP).unwrap().unwrap().holder_id.is_empty());
}

#[test]
fn status_reads_do_not_wait_for_renewal() {
    let clock = Arc::new(ManualClock::new(0));
    let (leader, entered, release) = gated_leader(&clock);
    assert_eq!(leader.tick().unwrap(), LeaderState::Leader);
    clock.advance(Duration::from_secs(5));

    let ticking = {
        let leader = Arc::clone(&leader);
        thread::spawn(move || leader.tick())
    };
    entered.recv_timeout(Duration::from_secs(5)).unwrap();

    let started = Instant::now();
    assert!(leader.current_fence().is_some());
    assert!(leader.is_leading());
    assert_eq!(leader.state(), LeaderState::Leader);
    assert!(started.elapsed() < Duration::from_secs(1), "status reads waited on renewal");

    release.send(()).unwrap();
    assert_eq!(ticking.join().unwrap().unwrap(), LeaderState::Leader);
}

#[test]
fn renewal_result_is_discarded_after_step_down() {
    let clock = Arc::new(ManualClock::new(0));
    let (leader, entered, release) = gated_leader(&clock);
    leader.tick().unwrap();
    let fence = leader.current_fence().unwrap();
    clock.advance(Duration::from_secs(5));

    let ticking = {
        let leader = Arc::clone(&leader);
        thread::spawn(move || leader.tick())
    };
    entered.recv_timeout(Duration::from_secs(5)).unwrap();
    leader.fence_rejected(&fence);
    release.send(()).unwrap();

    assert_eq!(ticking.join().unwrap().unwrap(), LeaderState::Standby);
    assert!(leader.current_fence().is_none());
    assert_eq!(leader.state(), LeaderState::Standby);
}

#[test]
fn local_expiry_publishes_not_leading() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let leader = arbiter(&store, &clock, "holder-a");
    let mut changes = leader.subscribe();
    leader.tick().unwrap();
    assert_eq!(*changes.borrow_and_update(), Leadership::Leading);

    clock.advance(TTL + Duration::from_millis(1));
    assert!(leader.current_fence().is_none());
    assert!(changes.has_changed().unwrap());
    assert_eq!(*changes.borrow_and_update(), Leadership::NotLeading);
    assert_eq!(leader.state(), LeaderState::Standby);
}
