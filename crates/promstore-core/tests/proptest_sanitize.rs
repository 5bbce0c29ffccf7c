// crates/promstore-core/tests/proptest_sanitize.rs
// ============================================================================
// Module: Identifier Sanitizer Property-Based Tests
// Description: Property tests for identifier bounds and label canonicalization.
// Purpose: Detect bound violations and unstable mappings across wide inputs.
// ============================================================================

//! Property-based tests for sanitizer and series key invariants.

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
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeSet;

use promstore_core::Label;
use promstore_core::MetricName;
use promstore_core::SeriesKey;
use promstore_core::runtime::sanitize::MAX_DISAMBIGUATION_ATTEMPTS;
use promstore_core::runtime::sanitize::MAX_IDENTIFIER_BYTES;
use promstore_core::runtime::sanitize::candidate;
use promstore_core::runtime::sanitize::sanitize;
use proptest::prelude::*;

fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

proptest! {
    #[test]
    fn sanitized_identifiers_are_bounded_and_safe(raw in "\\PC{1,200}") {
        let name = MetricName::new(raw).unwrap();
        let out = sanitize(&name);
        prop_assert!(!out.identifier.is_empty());
        prop_assert!(out.identifier.len() <= MAX_IDENTIFIER_BYTES);
        prop_assert!(out.identifier.chars().all(is_identifier_char));
        prop_assert!(!out.identifier.to_ascii_lowercase().starts_with("pg_"));
        prop_assert_eq!(sanitize(&name), out);
    }

    #[test]
    fn clean_short_names_are_unchanged(raw in "[a-oq-rt-z][a-zA-Z0-9_]{0,40}") {
        let name = MetricName::new(raw.clone()).unwrap();
        let out = sanitize(&name);
        prop_assert_eq!(out.identifier, raw);
        prop_assert!(!out.lossy);
    }

    #[test]
    fn distinct_names_get_distinct_identifiers(a in "[a-z.:-]{1,80}", b in "[a-z.:-]{1,80}") {
        prop_assume!(a != b);
        let left = sanitize(&MetricName::new(a).unwrap());
        let right = sanitize(&MetricName::new(b).unwrap());
        prop_assert_ne!(left.identifier, right.identifier);
    }

    #[test]
    fn disambiguation_candidates_never_repeat(raw in "\\PC{1,100}") {
        let name = MetricName::new(raw).unwrap();
        let candidates: BTreeSet<String> =
            (0 ..= MAX_DISAMBIGUATION_ATTEMPTS).map(|attempt| candidate(&name, attempt)).collect();
        prop_assert_eq!(candidates.len(), usize::try_from(MAX_DISAMBIGUATION_ATTEMPTS).unwrap() + 1);
        for identifier in &candidates {
            prop_assert!(identifier.len() <= MAX_IDENTIFIER_BYTES);
        }
    }

    #[test]
    fn series_key_ignores_label_order(
        pairs in prop::collection::btree_map("[a-z][a-z0-9_]{0,8}", "[a-z0-9]{0,6}", 0 .. 8),
    ) {
        let mut labels: Vec<Label> =
            pairs.iter().map(|(name, value)| Label::new(name.clone(), value.clone())).collect();
        labels.push(Label::new("__name__", "metric"));
        let (_, forward) = SeriesKey::from_labels(&labels).unwrap();
        labels.reverse();
        let (name, backward) = SeriesKey::from_labels(&labels).unwrap();
        prop_assert_eq!(name.as_str(), "metric");
        prop_assert_eq!(&forward, &backward);
        prop_assert!(forward.iter().all(|(_, value)| !value.is_empty()));
    }
}
