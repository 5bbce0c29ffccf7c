// crates/promstore-core/src/runtime/retry.rs
// ============================================================================
// Module: Promstore Retry Policy
// Description: Bounded exponential backoff for transient store failures.
// Purpose: Retry busy, conflicting, or exhausted store calls without unbounded waits.
// Dependencies: crate::{core, interfaces}, tracing
// ============================================================================

//! ## Overview
//! [`RetryPolicy::run`] repeats an operation while its error reports itself
//! retryable, sleeping with exponential backoff between attempts. Sleeps are
//! clamped to the request's remaining budget and the request context is
//! checked before every attempt.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::thread;
use std::time::Duration;

use crate::core::Interrupted;
use crate::core::RequestContext;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Retryable Errors
// ============================================================================

/// Errors that can classify themselves as transient.
pub trait Retryable {
    /// Returns true when repeating the operation may succeed.
    fn is_retryable(&self) -> bool;
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

/// Outcome of a retried operation that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Last error observed (non-retryable or attempts exhausted).
    Failed {
        /// Error from the final attempt.
        error: E,
        /// Attempts made.
        attempts: u32,
    },
    /// Request stopped before the operation succeeded.
    Interrupted(Interrupted),
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Default attempts per operation.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default first backoff.
const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(25);
/// Default backoff ceiling.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Bounded exponential backoff policy.
///
/// # Invariants
/// - `max_attempts >= 1`; an operation always runs at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    pub base_backoff: Duration,
    /// Upper bound for any single backoff.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Returns a policy that never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Returns the backoff applied after `attempt` (1-based) failed.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1_u32 << shift).min(self.max_backoff)
    }

    /// Runs `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Failed`] with the final error, or
    /// [`RetryError::Interrupted`] when the request stops first.
    pub fn run<T, E, F>(
        &self,
        ctx: &RequestContext,
        operation: &str,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            ctx.check().map_err(RetryError::Interrupted)?;
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let wait = ctx.clamp(self.backoff(attempt));
                    tracing::debug!(
                        operation,
                        attempt,
                        backoff_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "retrying store operation"
                    );
                    if !wait.is_zero() {
                        thread::sleep(wait);
                    }
                }
                Err(error) => {
                    return Err(RetryError::Failed {
                        error,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
