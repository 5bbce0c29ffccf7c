// crates/promstore-core/src/core/context.rs
// ============================================================================
// Module: Promstore Request Context
// Description: Caller-supplied deadline and cancellation for store round-trips.
// Purpose: Let callers bound ingest and query work and abort it cooperatively.
// Dependencies: thiserror, tokio-util
// ============================================================================

//! ## Overview
//! A [`RequestContext`] travels with every ingest and read call. Components
//! check it between store round-trips and clamp lock waits and retry
//! backoff to its remaining budget. Cancellation is cooperative: work that
//! already reached the store completes, and everything not yet started is
//! reported as failed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::Instant;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Reason a request stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    /// Caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,
    /// Request deadline elapsed.
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Deadline and cancellation carried by a request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Optional absolute deadline.
    deadline: Option<Instant>,
    /// Cooperative cancellation signal.
    cancel: CancellationToken,
}

impl RequestContext {
    /// Creates an unbounded, uncancelled context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a context observing an existing cancellation token.
    #[must_use]
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            deadline: None,
            cancel,
        }
    }

    /// Returns a copy with `timeout` applied when no deadline is set yet.
    #[must_use]
    pub fn or_timeout(&self, timeout: Option<Duration>) -> Self {
        let deadline = match (self.deadline, timeout) {
            (Some(deadline), _) => Some(deadline),
            (None, Some(timeout)) => Instant::now().checked_add(timeout),
            (None, None) => None,
        };
        Self {
            deadline,
            cancel: self.cancel.clone(),
        }
    }

    /// Returns the cancellation token shared with this context.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the request.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Fails when the request was cancelled or its deadline elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] describing why the request stopped.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.cancel.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(Interrupted::DeadlineExceeded);
        }
        Ok(())
    }

    /// Returns the time left before the deadline, if one is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Clamps `wait` to the remaining budget.
    #[must_use]
    pub fn clamp(&self, wait: Duration) -> Duration {
        self.remaining().map_or(wait, |remaining| wait.min(remaining))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
