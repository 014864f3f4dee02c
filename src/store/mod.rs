//! Durable local store for offline transfers
//!
//! This module provides the crash-durable, transactional store that holds transfers queued while
//! offline, cached recipient lookups and arbitrary offline settings, along with the amount type and
//! the content addressing used for deduplication against the remote ledger.

/// Fixed-point amounts
pub mod amount;
/// Integrity hash and id derivation
pub mod hash;
/// The store and its indexes
pub mod offline_store;
/// Storage backends (file and in-memory)
pub mod repositories;
/// Record and error types
mod types;

pub use amount::{AMOUNT_DECIMALS, Amount, AmountParseError};
pub use offline_store::{DEVICE_ID_SETTING, OfflineStore, StoreConfig, day_start, now_millis};
pub use repositories::{FileBackend, MemoryBackend, StorageBackend};
pub use types::*;
