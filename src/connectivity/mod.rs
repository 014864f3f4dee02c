//! Connectivity monitoring
//!
//! Exposes the current online/offline state with link-quality hints and emits a change on every
//! transition. The sync engine's auto-sync task subscribes to it; an optional HTTP probe can feed
//! it on hosts that have no platform connectivity signal.

mod monitor;
mod probe;

pub use monitor::{ConnectionType, ConnectivityMonitor, ConnectivityState, LinkQuality};
pub use probe::{ConnectivityProbe, ProbeConfig, ProbeError, ProbeResult};
