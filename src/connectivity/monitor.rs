//! Online/offline state tracking
//!
//! The monitor holds the current connectivity state and link-quality hints and notifies
//! subscribers on every transition. It is purely observational; nothing here touches queued
//! transfers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

/// Physical link type, when the platform reports one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
	Wifi,
	Cellular,
	Ethernet,
	Other,
	Unknown,
}

/// Optional link-quality hints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkQuality {
	pub connection_type: Option<ConnectionType>,
	/// Effective link class such as "4g" or "slow-2g"
	pub effective_type: Option<String>,
	/// Estimated downlink bandwidth in Mbps
	pub downlink_mbps: Option<f64>,
	/// Estimated round trip in milliseconds
	pub rtt_ms: Option<u64>,
}

/// Snapshot of the connectivity state
#[derive(Debug, Clone)]
pub struct ConnectivityState {
	pub online: bool,
	pub link: LinkQuality,
	/// When `online` last flipped
	pub changed_at: DateTime<Utc>,
}

/// Tracks connectivity and broadcasts every change to subscribers
#[derive(Debug)]
pub struct ConnectivityMonitor {
	sender: watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
	pub fn new(online: bool) -> Self {
		let (sender, _) = watch::channel(ConnectivityState {
			online,
			link: LinkQuality::default(),
			changed_at: Utc::now(),
		});
		Self { sender }
	}

	/// Record the platform's online/offline signal. Returns `true` if this was a transition.
	pub fn set_online(&self, online: bool) -> bool {
		let changed = self.sender.send_if_modified(|state| {
			if state.online == online {
				return false;
			}
			state.online = online;
			state.changed_at = Utc::now();
			true
		});

		if changed {
			info!("Connectivity changed: {}", if online { "online" } else { "offline" });
		}
		changed
	}

	/// Replace the link-quality hints, notifying subscribers if they differ.
	pub fn update_link(&self, link: LinkQuality) -> bool {
		self.sender.send_if_modified(|state| {
			if state.link == link {
				return false;
			}
			state.link = link;
			true
		})
	}

	/// Record a full observation (online flag plus hints) in one notification.
	pub fn report(&self, online: bool, link: LinkQuality) -> bool {
		let transitioned = std::cell::Cell::new(false);
		let changed = self.sender.send_if_modified(|state| {
			let mut modified = false;
			if state.online != online {
				state.online = online;
				state.changed_at = Utc::now();
				transitioned.set(true);
				modified = true;
			}
			if state.link != link {
				state.link = link;
				modified = true;
			}
			modified
		});

		if transitioned.get() {
			info!("Connectivity changed: {}", if online { "online" } else { "offline" });
		}
		changed
	}

	pub fn is_online(&self) -> bool {
		self.sender.borrow().online
	}

	pub fn current(&self) -> ConnectivityState {
		self.sender.borrow().clone()
	}

	/// Subscribe to connectivity changes
	pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
		self.sender.subscribe()
	}
}

impl Default for ConnectivityMonitor {
	fn default() -> Self {
		Self::new(false)
	}
}
