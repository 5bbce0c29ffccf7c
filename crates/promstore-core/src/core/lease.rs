// crates/promstore-core/src/core/lease.rs
// ============================================================================
// Module: Promstore Leader Leases
// Description: Lease rows, fences, and leadership status values.
// Purpose: Describe what the arbiter and stores exchange to serialize schema mutation.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Leadership is a lease row per group. The holder presents a [`Fence`]
//! derived from its lease on every schema mutation; stores reject fences
//! whose holder or token no longer match the row.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::FencingToken;

// ============================================================================
// SECTION: Lease Types
// ============================================================================

/// Lease row held by the current leader.
///
/// # Invariants
/// - `fencing_token` increases whenever a new term begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderLease {
    /// Lease group shared by redundant instances.
    pub group_id: String,
    /// Holder that owns the lease.
    pub holder_id: String,
    /// Term marker.
    pub fencing_token: FencingToken,
    /// Expiry (unix ms).
    pub expires_at_ms: i64,
}

impl LeaderLease {
    /// Returns the fence presented on schema mutations.
    #[must_use]
    pub fn fence(&self) -> Fence {
        Fence {
            group_id: self.group_id.clone(),
            holder_id: self.holder_id.clone(),
            token: self.fencing_token,
        }
    }

    /// Returns true when the lease is still valid at `now_ms`.
    #[must_use]
    pub const fn is_live(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms
    }

    /// Computes the lease row that results from an acquisition attempt.
    ///
    /// A live lease held by `holder_id` is extended within its term. An
    /// absent, expired, or released lease starts a new term with the next
    /// token. Returns `None` while another holder's lease is live.
    #[must_use]
    pub fn acquire(
        current: Option<&Self>,
        group_id: &str,
        holder_id: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Option<Self> {
        let expires_at_ms = now_ms.saturating_add(ttl_ms);
        let fencing_token = match current {
            None => FencingToken::new(1),
            Some(lease) if lease.is_live(now_ms) && lease.holder_id == holder_id => {
                lease.fencing_token
            }
            Some(lease) if lease.is_live(now_ms) => return None,
            Some(lease) => lease.fencing_token.next(),
        };
        Some(Self {
            group_id: group_id.to_string(),
            holder_id: holder_id.to_string(),
            fencing_token,
            expires_at_ms,
        })
    }
}

/// Credential attached to schema-mutating store calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fence {
    /// Lease group.
    pub group_id: String,
    /// Holder presenting the fence.
    pub holder_id: String,
    /// Term marker.
    pub token: FencingToken,
}

/// Externally observable leadership status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leadership {
    /// This instance holds the lease.
    Leading,
    /// This instance does not hold the lease.
    NotLeading,
}

impl Leadership {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Leading => "leading",
            Self::NotLeading => "not_leading",
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
