// crates/promstore-config/src/lib.rs
// ============================================================================
// Module: Promstore Config
// Description: Configuration model, logging setup, and adapter bootstrap.
// Purpose: Single source of truth for how a Promstore instance is configured.
// Dependencies: promstore-core, promstore-store-postgres, promstore-store-sqlite
// ============================================================================

//! ## Overview
//! Loads `promstore.toml`, validates it fail-closed, installs logging, and
//! opens the selected backing store behind a wired adapter.

pub mod bootstrap;
pub mod config;
pub mod logging;

pub use bootstrap::BootstrapError;
pub use bootstrap::PromstoreAdapter;
pub use bootstrap::open_adapter;
pub use config::*;
pub use logging::init_logging;
