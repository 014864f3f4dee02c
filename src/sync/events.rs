//! Notification system for drain passes.
//!
//! This module defines the notifications a drain pass emits and the dispatcher that delivers them.
//! The dispatcher keeps a single registered observer (registering a new one replaces the old) and
//! additionally publishes every notification on a broadcast channel, so any number of independent
//! listeners can follow sync progress without displacing the primary observer.
//!
//! Delivery is fire-and-forget: there is no backpressure, and broadcast subscribers that fall
//! behind simply miss old notifications.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the broadcast channel
const BROADCAST_CAPACITY: usize = 64;

/// Notifications emitted during a drain pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncNotification {
	/// A drain pass started with this many pending transfers
	Syncing { pending: usize },
	/// This many transfers were confirmed by the ledger during the pass
	Success { synced: usize },
	/// This many transfers failed during the pass
	Error { failed: usize },
}

/// Trait for receiving sync notifications.
///
/// Implemented for any `Fn(&SyncNotification)` closure.
pub trait SyncObserver: Send + Sync {
	fn notify(&self, notification: &SyncNotification);
}

impl<F> SyncObserver for F
where
	F: Fn(&SyncNotification) + Send + Sync,
{
	fn notify(&self, notification: &SyncNotification) {
		self(notification)
	}
}

/// Delivers notifications to the registered observer and to broadcast subscribers.
pub struct EventDispatcher {
	observer: Mutex<Option<Arc<dyn SyncObserver>>>,
	broadcaster: broadcast::Sender<SyncNotification>,
}

impl EventDispatcher {
	/// Create a dispatcher with no observer.
	pub fn new() -> Self {
		let (broadcaster, _) = broadcast::channel(BROADCAST_CAPACITY);
		Self {
			observer: Mutex::new(None),
			broadcaster,
		}
	}

	/// Register the observer, replacing any previous registration.
	pub fn register_observer(&self, observer: Arc<dyn SyncObserver>) {
		*self.observer.lock().unwrap_or_else(PoisonError::into_inner) = Some(observer);
	}

	pub fn clear_observer(&self) {
		*self.observer.lock().unwrap_or_else(PoisonError::into_inner) = None;
	}

	/// Subscribe to every future notification.
	pub fn subscribe(&self) -> broadcast::Receiver<SyncNotification> {
		self.broadcaster.subscribe()
	}

	/// Deliver a notification. The observer is called outside the registration lock.
	pub fn dispatch(&self, notification: SyncNotification) {
		let observer = self
			.observer
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clone();
		if let Some(observer) = observer {
			observer.notify(&notification);
		}

		// No subscribers is not an error
		if self.broadcaster.send(notification).is_err() {
			debug!("No broadcast subscribers for {:?}", notification);
		}
	}
}

impl Default for EventDispatcher {
	fn default() -> Self {
		Self::new()
	}
}
