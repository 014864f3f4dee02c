//! Remote ledger integration
//!
//! This module provides the narrow interface the sync engine uses to reach the external ledger
//! service, and a GraphQL client implementing it. The ledger applies transfers atomically and
//! exposes a lookup by integrity hash used for deduplication.

/// GraphQL client for the ledger service
mod client;
/// The ledger service trait
mod remote;
/// Type definitions for ledger requests, profiles and errors
mod types;

pub use client::{GraphQlLedgerClient, classify_http_status};
#[cfg(test)]
pub use remote::MockRemoteLedger;
pub use remote::RemoteLedger;
pub use types::*;
