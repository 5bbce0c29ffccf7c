// crates/promstore-core/src/runtime/permission.rs
// ============================================================================
// Module: Promstore Permission Verifier
// Description: Confirms the store principal may write a resolved relation.
// Purpose: Block identifier injection and escalation before any dynamic write.
// Dependencies: crate::{core, interfaces}, thiserror, tracing
// ============================================================================

//! ## Overview
//! Verification has two layers. The in-process layer rejects any relation
//! outside the managed data and series namespaces, however well-formed. The
//! store layer asks the backend whether the executing principal holds write
//! privilege on that exact relation and whether the adapter created it.
//! Results are never cached across relations; the catalog cache only ever
//! installs entries that passed verification.
//! Security posture: a denial is final for the request and is not retried.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::core::CatalogEntry;
use crate::core::DATA_NAMESPACE;
use crate::core::RelationName;
use crate::core::SERIES_NAMESPACE;
use crate::interfaces::CatalogStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authorization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    /// Relation lives outside the managed namespaces.
    #[error("relation {0} is outside managed namespaces")]
    OutsideManagedNamespace(String),
    /// Store principal lacks write privilege or the relation is unmanaged.
    #[error("permission denied on relation {0}")]
    Denied(String),
    /// Privilege check could not be executed.
    #[error("permission check failed: {0}")]
    Store(#[from] StoreError),
}

impl PermissionError {
    /// Returns true when the failure is a transient store problem.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            Self::OutsideManagedNamespace(_) | Self::Denied(_) => false,
        }
    }
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Relation write-permission verifier.
pub struct PermissionVerifier<S: ?Sized> {
    /// Store answering the privilege question.
    store: Arc<S>,
}

impl<S: ?Sized> Clone for PermissionVerifier<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> PermissionVerifier<S>
where
    S: CatalogStore + ?Sized,
{
    /// Creates a verifier bound to a store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self {
            store,
        }
    }

    /// Verifies the principal may write `relation`.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when the relation is unmanaged, the
    /// principal lacks privilege, or the check fails.
    pub fn verify(&self, relation: &RelationName) -> Result<(), PermissionError> {
        if !is_managed_namespace(&relation.namespace) {
            tracing::warn!(relation = %relation, "rejected relation outside managed namespaces");
            return Err(PermissionError::OutsideManagedNamespace(relation.qualified()));
        }
        if self.store.check_permission(relation)? {
            Ok(())
        } else {
            tracing::warn!(relation = %relation, "store principal denied on relation");
            Err(PermissionError::Denied(relation.qualified()))
        }
    }

    /// Verifies both relations of a catalog entry.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] for the first relation that fails.
    pub fn verify_entry(&self, entry: &CatalogEntry) -> Result<(), PermissionError> {
        self.verify(&entry.data_relation)?;
        self.verify(&entry.series_relation)
    }
}

/// Returns true for namespaces the adapter writes samples and series into.
#[must_use]
pub fn is_managed_namespace(namespace: &str) -> bool {
    namespace == DATA_NAMESPACE || namespace == SERIES_NAMESPACE
}
