// crates/promstore-core/src/runtime/sanitize.rs
// ============================================================================
// Module: Promstore Identifier Sanitizer
// Description: Maps untrusted metric names onto bounded relation identifiers.
// Purpose: Produce safe, deterministic, collision-resistant storage identifiers.
// Dependencies: crate::core, sha2
// ============================================================================

//! ## Overview
//! Metric names are arbitrary strings; relation identifiers are not. The
//! sanitizer keeps `[A-Za-z0-9_]`, replaces every other character with `_`,
//! and bounds the result to [`MAX_IDENTIFIER_BYTES`]. Whenever the mapping
//! loses information (replacement, truncation, reserved prefix) a short
//! SHA-256 suffix of the raw name is appended so distinct names rarely meet.
//! When they still do, the provisioner walks deterministic disambiguation
//! attempts and persists whichever identifier it registered.
//!
//! Identifiers are always quoted with [`quote_ident`] before reaching a
//! statement; raw names are never concatenated into SQL.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

use crate::core::MetricName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum relation identifier length in bytes.
pub const MAX_IDENTIFIER_BYTES: usize = 63;
/// Maximum number of disambiguation attempts after the base identifier.
pub const MAX_DISAMBIGUATION_ATTEMPTS: u32 = 8;
/// Hex characters kept from the digest suffix.
const HASH_SUFFIX_HEX: usize = 8;
/// Room left for the base once `_` and the suffix are appended.
const HASHED_BASE_BYTES: usize = MAX_IDENTIFIER_BYTES - HASH_SUFFIX_HEX - 1;
/// Prefix applied to identifiers that would shadow system objects.
const RESERVED_ESCAPE: &str = "m_";
/// Identifier prefixes owned by the database or the adapter itself.
const RESERVED_PREFIXES: [&str; 4] = ["pg_", "sqlite_", "_prom_", "_ps_"];

// ============================================================================
// SECTION: Sanitizer
// ============================================================================

/// Result of sanitizing a metric name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedIdentifier {
    /// Bounded identifier.
    pub identifier: String,
    /// True when the mapping was not the identity.
    pub lossy: bool,
}

/// Sanitizes a metric name into its base relation identifier.
#[must_use]
pub fn sanitize(name: &MetricName) -> SanitizedIdentifier {
    let (base, lossy) = map_charset(name.as_str());
    if !lossy && base.len() <= MAX_IDENTIFIER_BYTES {
        return SanitizedIdentifier {
            identifier: base,
            lossy: false,
        };
    }
    let digest = hex_prefix(&Sha256::digest(name.as_str().as_bytes()));
    SanitizedIdentifier {
        identifier: with_suffix(&base, &digest),
        lossy: true,
    }
}

/// Returns the identifier for a given attempt (0 is the base identifier).
#[must_use]
pub fn candidate(name: &MetricName, attempt: u32) -> String {
    if attempt == 0 {
        return sanitize(name).identifier;
    }
    let (base, _) = map_charset(name.as_str());
    let mut hasher = Sha256::new();
    hasher.update(name.as_str().as_bytes());
    hasher.update(b"#");
    hasher.update(attempt.to_string().as_bytes());
    let digest = hex_prefix(&hasher.finalize());
    with_suffix(&base, &digest)
}

/// Returns the provisioning lock key for an identifier.
///
/// Keys are case-folded so backends with case-insensitive identifiers
/// serialize every spelling of the same relation.
#[must_use]
pub fn lock_key(identifier: &str) -> String {
    format!("metric:{}", identifier.to_ascii_lowercase())
}

/// Quotes an identifier for SQL, doubling embedded quotes.
#[must_use]
pub fn quote_ident(identifier: &str) -> String {
    let mut out = String::with_capacity(identifier.len() + 2);
    out.push('"');
    for ch in identifier.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps characters into the identifier charset and escapes reserved prefixes.
fn map_charset(raw: &str) -> (String, bool) {
    let mut lossy = false;
    let mut mapped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            mapped.push(ch);
        } else {
            mapped.push('_');
            lossy = true;
        }
    }
    let lowered = mapped.to_ascii_lowercase();
    if mapped.is_empty() || RESERVED_PREFIXES.iter().any(|prefix| lowered.starts_with(prefix)) {
        mapped.insert_str(0, RESERVED_ESCAPE);
        lossy = true;
    }
    (mapped, lossy)
}

/// Truncates `base` and appends `_<suffix>`.
fn with_suffix(base: &str, suffix: &str) -> String {
    let keep = base.len().min(HASHED_BASE_BYTES);
    format!("{}_{suffix}", &base[.. keep])
}

/// Encodes the leading digest bytes as lowercase hex.
fn hex_prefix(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(HASH_SUFFIX_HEX);
    for byte in bytes.iter().take(HASH_SUFFIX_HEX / 2) {
        out.push(HEX[usize::from(byte >> 4)] as char);
        out.push(HEX[usize::from(byte & 0x0f)] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
