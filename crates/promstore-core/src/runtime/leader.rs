// crates/promstore-core/src/runtime/leader.rs
// ============================================================================
// Module: Promstore Leader Arbiter
// Description: Lease-based leadership across redundant adapter instances.
// Purpose: Ensure one instance performs schema mutations at a time.
// Dependencies: crate::{core, interfaces, telemetry}, tokio (watch), tracing
// ============================================================================

//! ## Overview
//! The arbiter moves through `Candidate -> Leader -> Standby`, with `Stopped`
//! reachable only through shutdown. Each [`LeaderArbiter::tick`] advances the
//! state machine once against the store's lease row: candidates and standbys
//! try to take the lease, leaders renew it. Every successful acquisition that
//! starts a new term carries a higher fencing token.
//!
//! Provisioning reads [`LeaderArbiter::current_fence`] synchronously before
//! each mutation. The fence is only handed out while this instance leads and
//! its lease has not expired on the local clock; stores reject stale fences,
//! and the provisioner reports rejections back through
//! [`LeaderArbiter::fence_rejected`] so the arbiter steps down immediately.
//!
//! Leadership changes are published on a `tokio::sync::watch` channel and to
//! the metrics sink's leader gauge.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

use crate::core::Clock;
use crate::core::Fence;
use crate::core::LeaderLease;
use crate::core::Leadership;
use crate::core::time::duration_millis;
use crate::interfaces::LeaseStore;
use crate::interfaces::StoreError;
use crate::telemetry::AdapterMetrics;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Default lease group.
pub const DEFAULT_GROUP_ID: &str = "promstore";
/// Default lease time-to-live.
const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(15);
/// Default renew cadence while leading.
const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_secs(5);
/// Default acquisition cadence while not leading.
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Leader arbiter configuration.
///
/// # Invariants
/// - `renew_interval < lease_ttl` and `retry_interval < lease_ttl`.
/// - `group_id` and `holder_id` are non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderConfig {
    /// Lease group shared by redundant instances.
    pub group_id: String,
    /// Unique holder identity for this instance.
    pub holder_id: String,
    /// Lease time-to-live.
    pub lease_ttl: Duration,
    /// Renew cadence while leading.
    pub renew_interval: Duration,
    /// Acquisition cadence while not leading.
    pub retry_interval: Duration,
    /// Whether this instance competes for the lease at all.
    pub campaign: bool,
}

impl LeaderConfig {
    /// Creates a configuration with default timings.
    #[must_use]
    pub fn new(group_id: impl Into<String>, holder_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            holder_id: holder_id.into(),
            lease_ttl: DEFAULT_LEASE_TTL,
            renew_interval: DEFAULT_RENEW_INTERVAL,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            campaign: true,
        }
    }

    /// Validates timing and identity invariants.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderError::InvalidConfig`] when an invariant does not hold.
    pub fn validate(&self) -> Result<(), LeaderError> {
        if self.group_id.trim().is_empty() {
            return Err(LeaderError::InvalidConfig("group_id must be non-empty".to_string()));
        }
        if self.holder_id.trim().is_empty() {
            return Err(LeaderError::InvalidConfig("holder_id must be non-empty".to_string()));
        }
        if self.lease_ttl.is_zero() {
            return Err(LeaderError::InvalidConfig("lease_ttl must be greater than zero".to_string()));
        }
        if self.renew_interval.is_zero() || self.renew_interval >= self.lease_ttl {
            return Err(LeaderError::InvalidConfig(
                "renew_interval must be greater than zero and less than lease_ttl".to_string(),
            ));
        }
        if self.retry_interval.is_zero() || self.retry_interval >= self.lease_ttl {
            return Err(LeaderError::InvalidConfig(
                "retry_interval must be greater than zero and less than lease_ttl".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Leader arbiter errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaderError {
    /// Configuration invariant violated.
    #[error("invalid leader config: {0}")]
    InvalidConfig(String),
    /// Lease store call failed.
    #[error("lease store error: {0}")]
    Store(#[from] StoreError),
    /// Arbiter state is unusable.
    #[error("leader arbiter state error: {0}")]
    State(String),
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Arbiter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderState {
    /// Not yet attempted the lease.
    Candidate,
    /// Holds the lease.
    Leader,
    /// Lease held elsewhere or lost.
    Standby,
    /// Shut down; terminal.
    Stopped,
}

impl LeaderState {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Leader => "leader",
            Self::Standby => "standby",
            Self::Stopped => "stopped",
        }
    }
}

/// Mutable arbiter state.
#[derive(Debug)]
struct ArbiterInner {
    /// Current state.
    state: LeaderState,
    /// Lease held while leading.
    lease: Option<LeaderLease>,
}

// ============================================================================
// SECTION: Arbiter
// ============================================================================

/// Lease-based leader arbiter.
pub struct LeaderArbiter<S: ?Sized> {
    /// Lease store.
    store: Arc<S>,
    /// Arbiter configuration.
    config: LeaderConfig,
    /// Injected time source.
    clock: Arc<dyn Clock>,
    /// Metrics sink for the leader gauge.
    metrics: Arc<dyn AdapterMetrics>,
    /// Mutable state.
    inner: Mutex<ArbiterInner>,
    /// Leadership observable.
    leadership: watch::Sender<Leadership>,
    /// Serializes ticks without blocking state readers.
    tick_lock: Mutex<()>,
}

impl<S> LeaderArbiter<S>
where
    S: LeaseStore + ?Sized,
{
    /// Creates an arbiter in the `Candidate` state.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderError::InvalidConfig`] when the configuration is invalid.
    pub fn new(
        store: Arc<S>,
        config: LeaderConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn AdapterMetrics>,
    ) -> Result<Self, LeaderError> {
        config.validate()?;
        let (leadership, _) = watch::channel(Leadership::NotLeading);
        metrics.set_leader(false);
        let state = if config.campaign { LeaderState::Candidate } else { LeaderState::Standby };
        Ok(Self {
            store,
            config,
            clock,
            metrics,
            inner: Mutex::new(ArbiterInner {
                state,
                lease: None,
            }),
            leadership,
            tick_lock: Mutex::new(()),
        })
    }

    /// Returns the arbiter configuration.
    #[must_use]
    pub const fn config(&self) -> &LeaderConfig {
        &self.config
    }

    /// Advances the state machine once.
    ///
    /// The lease round-trip runs without holding the state lock, so fence
    /// and status reads never wait on the store. A result is applied only
    /// when the state it was computed from is still current.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderError`] when the lease store fails; the state is kept
    /// unless the held lease has already expired locally.
    pub fn tick(&self) -> Result<LeaderState, LeaderError> {
        let _serial = self
            .tick_lock
            .lock()
            .map_err(|_| LeaderError::State("leader tick mutex poisoned".to_string()))?;
        let (state, held) = {
            let inner = self.lock_inner()?;
            (inner.state, inner.lease.clone())
        };
        let now_ms = self.clock.now_millis();
        let ttl_ms = duration_millis(self.config.lease_ttl);
        match state {
            LeaderState::Stopped => Ok(LeaderState::Stopped),
            LeaderState::Standby if !self.config.campaign => Ok(LeaderState::Standby),
            LeaderState::Candidate | LeaderState::Standby => {
                let outcome = self.store.try_acquire_lease(
                    &self.config.group_id,
                    &self.config.holder_id,
                    now_ms,
                    ttl_ms,
                );
                let mut inner = self.lock_inner()?;
                if inner.state != state {
                    let current = inner.state;
                    drop(inner);
                    if let Ok(Some(lease)) = outcome {
                        self.release_orphaned(&lease);
                    }
                    return Ok(current);
                }
                match outcome {
                    Ok(Some(lease)) => {
                        tracing::info!(
                            group = %self.config.group_id,
                            holder = %self.config.holder_id,
                            token = lease.fencing_token.get(),
                            "acquired leadership"
                        );
                        inner.lease = Some(lease);
                        self.transition(&mut inner, LeaderState::Leader);
                        Ok(LeaderState::Leader)
                    }
                    Ok(None) => {
                        self.transition(&mut inner, LeaderState::Standby);
                        Ok(LeaderState::Standby)
                    }
                    Err(err) => {
                        self.transition(&mut inner, LeaderState::Standby);
                        Err(err.into())
                    }
                }
            }
            LeaderState::Leader => {
                let Some(lease) = held else {
                    let mut inner = self.lock_inner()?;
                    if inner.state == LeaderState::Leader {
                        self.transition(&mut inner, LeaderState::Standby);
                    }
                    return Ok(inner.state);
                };
                let outcome = self.store.renew_lease(&lease, now_ms, ttl_ms);
                let mut inner = self.lock_inner()?;
                let unchanged = inner.state == LeaderState::Leader
                    && inner
                        .lease
                        .as_ref()
                        .is_some_and(|current| current.fencing_token == lease.fencing_token);
                if !unchanged {
                    return Ok(inner.state);
                }
                match outcome {
                    Ok(Some(renewed)) => {
                        inner.lease = Some(renewed);
                        Ok(LeaderState::Leader)
                    }
                    Ok(None) => {
                        tracing::warn!(
                            group = %self.config.group_id,
                            token = lease.fencing_token.get(),
                            "lease renewal refused; stepping down"
                        );
                        inner.lease = None;
                        self.transition(&mut inner, LeaderState::Standby);
                        Ok(LeaderState::Standby)
                    }
                    Err(err) => {
                        if !lease.is_live(self.clock.now_millis()) {
                            tracing::warn!(
                                group = %self.config.group_id,
                                error = %err,
                                "lease expired while renewal failing; stepping down"
                            );
                            inner.lease = None;
                            self.transition(&mut inner, LeaderState::Standby);
                        }
                        Err(err.into())
                    }
                }
            }
        }
    }

    /// Returns the fence for schema mutations while leading with a live lease.
    ///
    /// A lease found expired on the local clock is dropped here, so the
    /// leadership observable never reports `Leading` without a usable fence.
    #[must_use]
    pub fn current_fence(&self) -> Option<Fence> {
        let mut inner = self.inner.lock().ok()?;
        if inner.state != LeaderState::Leader {
            return None;
        }
        let now_ms = self.clock.now_millis();
        let live = inner.lease.as_ref().filter(|lease| lease.is_live(now_ms)).map(LeaderLease::fence);
        if live.is_some() {
            return live;
        }
        if let Some(lease) = inner.lease.take() {
            tracing::warn!(
                group = %self.config.group_id,
                token = lease.fencing_token.get(),
                "lease expired locally; stepping down"
            );
        }
        self.transition(&mut inner, LeaderState::Standby);
        None
    }

    /// Steps down when the store rejected the fence for the current term.
    pub fn fence_rejected(&self, fence: &Fence) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let current = inner.lease.as_ref().is_some_and(|lease| lease.fencing_token == fence.token);
        if inner.state == LeaderState::Leader && current {
            tracing::warn!(
                group = %self.config.group_id,
                token = fence.token.get(),
                "store rejected fence; stepping down"
            );
            inner.lease = None;
            self.transition(&mut inner, LeaderState::Standby);
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> LeaderState {
        self.inner.lock().map_or(LeaderState::Stopped, |inner| inner.state)
    }

    /// Returns true when this instance holds a live lease.
    #[must_use]
    pub fn is_leading(&self) -> bool {
        self.current_fence().is_some()
    }

    /// Subscribes to leadership changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Leadership> {
        self.leadership.subscribe()
    }

    /// Releases the lease if held and moves to `Stopped`.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderError`] when the release call fails; the arbiter is
    /// stopped regardless.
    pub fn stop(&self) -> Result<(), LeaderError> {
        let mut inner = self.lock_inner()?;
        let lease = inner.lease.take();
        self.transition(&mut inner, LeaderState::Stopped);
        drop(inner);
        if let Some(lease) = lease {
            self.store.release_lease(&lease)?;
            tracing::info!(
                group = %self.config.group_id,
                token = lease.fencing_token.get(),
                "released leadership"
            );
        }
        Ok(())
    }

    /// Releases a lease acquired after the arbiter left the state that asked for it.
    fn release_orphaned(&self, lease: &LeaderLease) {
        if let Err(err) = self.store.release_lease(lease) {
            tracing::warn!(
                group = %self.config.group_id,
                error = %err,
                "orphaned lease release failed"
            );
        }
    }

    /// Applies a state change and publishes leadership transitions.
    fn transition(&self, inner: &mut MutexGuard<'_, ArbiterInner>, next: LeaderState) {
        let was_leading = inner.state == LeaderState::Leader;
        inner.state = next;
        let leading = next == LeaderState::Leader;
        if was_leading != leading {
            let status = if leading { Leadership::Leading } else { Leadership::NotLeading };
            self.leadership.send_replace(status);
            self.metrics.set_leader(leading);
        }
    }

    /// Locks the inner state, mapping poisoning to an error.
    fn lock_inner(&self) -> Result<MutexGuard<'_, ArbiterInner>, LeaderError> {
        self.inner
            .lock()
            .map_err(|_| LeaderError::State("leader arbiter mutex poisoned".to_string()))
    }
}

impl<S> LeaderArbiter<S>
where
    S: LeaseStore + ?Sized + 'static,
{
    /// Runs the arbiter on a dedicated thread.
    ///
    /// The loop ticks every `renew_interval` while leading and every
    /// `retry_interval` otherwise, until [`ArbiterHandle::shutdown`].
    ///
    /// # Errors
    ///
    /// Returns [`LeaderError::State`] when the thread cannot be spawned.
    pub fn start(self: &Arc<Self>) -> Result<ArbiterHandle, LeaderError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let arbiter = Arc::clone(self);
        let join = thread::Builder::new()
            .name("promstore-leader".to_string())
            .spawn(move || {
                loop {
                    let state = match arbiter.tick() {
                        Ok(state) => state,
                        Err(err) => {
                            tracing::warn!(error = %err, "leader tick failed");
                            arbiter.state()
                        }
                    };
                    let wait = match state {
                        LeaderState::Leader => arbiter.config.renew_interval,
                        LeaderState::Stopped => break,
                        LeaderState::Candidate | LeaderState::Standby => {
                            arbiter.config.retry_interval
                        }
                    };
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                if let Err(err) = arbiter.stop() {
                    tracing::warn!(error = %err, "leader release failed");
                }
            })
            .map_err(|err| LeaderError::State(format!("leader thread spawn failed: {err}")))?;
        Ok(ArbiterHandle {
            stop: Some(stop_tx),
            join: Some(join),
        })
    }
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Handle for a running arbiter loop.
#[derive(Debug)]
pub struct ArbiterHandle {
    /// Stop signal sender.
    stop: Option<mpsc::Sender<()>>,
    /// Loop thread.
    join: Option<JoinHandle<()>>,
}

impl ArbiterHandle {
    /// Stops the loop, releasing the lease if held, and waits for the thread.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderError::State`] when the loop thread panicked.
    pub fn shutdown(mut self) -> Result<(), LeaderError> {
        self.signal_and_join()
    }

    /// Sends the stop signal and joins the loop thread.
    fn signal_and_join(&mut self) -> Result<(), LeaderError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| LeaderError::State("leader thread panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for ArbiterHandle {
    fn drop(&mut self) {
        let _ = self.signal_and_join();
    }
}
