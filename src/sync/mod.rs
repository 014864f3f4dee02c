//! Sync engine
//!
//! This module drains the offline queue into the remote ledger. It provides:
//! - `SyncEngine`, which runs guarded, sequential drain passes with deduplication and retries
//! - the notification dispatcher used to report drain phases to observers
//! - per-pass progress tracking and summaries
//! - the connectivity-driven auto-sync task
//! - `RecipientDirectory`, which resolves payment ids online and falls back to the cache offline

/// Connectivity-driven drain scheduling
pub mod auto_sync;
/// Drain passes over the offline queue
pub mod engine;
/// Drain notifications and observers
pub mod events;
/// Per-pass counters and summaries
pub mod progress;
/// Payment id resolution with offline fallback
pub mod recipients;

pub use auto_sync::{AutoSyncConfig, AutoSyncHandle, spawn_auto_sync};
pub use engine::{SyncConfig, SyncEngine, SyncError};
pub use events::{EventDispatcher, SyncNotification, SyncObserver};
pub use progress::{DrainTracker, SyncOutcome};
pub use recipients::RecipientDirectory;
