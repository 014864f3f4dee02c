//! Offline transfer queue and sync engine.
//!
//! Transfers initiated without connectivity are persisted in a durable local store, then drained
//! into a remote ledger when connectivity returns. Each queued transfer carries an integrity hash
//! the ledger uses to recognise replays, so a drain interrupted at any point can be repeated
//! without applying a transfer twice.

/// Environment-driven application configuration
pub mod config;
/// Online/offline tracking and the reachability probe
pub mod connectivity;
/// Remote ledger interface and GraphQL client
pub mod ledger;
/// Durable local store
pub mod store;
/// Drain passes, notifications and auto-sync
pub mod sync;
