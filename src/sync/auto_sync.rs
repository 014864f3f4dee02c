//! Connectivity-driven drain scheduling.
//!
//! The auto-sync task watches the connectivity monitor and starts a drain when the device comes
//! back online (after a settle delay, and only if still online), plus one best-effort drain shortly
//! after start when already online.

use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::sync::engine::SyncEngine;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Delays used by the auto-sync task
#[derive(Debug, Clone)]
pub struct AutoSyncConfig {
	/// Wait after an offline to online transition before draining
	pub settle_delay: Duration,
	/// Wait after start before the initial drain
	pub startup_delay: Duration,
}

impl Default for AutoSyncConfig {
	fn default() -> Self {
		Self {
			settle_delay: Duration::from_secs(2),
			startup_delay: Duration::from_secs(3),
		}
	}
}

/// Owns the background auto-sync task. Dropping the handle stops the task.
pub struct AutoSyncHandle {
	task: JoinHandle<()>,
}

impl AutoSyncHandle {
	/// Stop the task. A drain already in flight is cancelled between store writes.
	pub fn shutdown(self) {
		self.task.abort();
		info!("Auto-sync stopped");
	}

	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}
}

impl Drop for AutoSyncHandle {
	fn drop(&mut self) {
		self.task.abort();
	}
}

/// Start draining `engine` whenever `monitor` reports a return to connectivity.
pub fn spawn_auto_sync(
	engine: Arc<SyncEngine>,
	monitor: &ConnectivityMonitor,
	config: AutoSyncConfig,
) -> AutoSyncHandle {
	let receiver = monitor.subscribe();
	let task = tokio::spawn(run_auto_sync(engine, receiver, config));
	AutoSyncHandle { task }
}

async fn run_auto_sync(
	engine: Arc<SyncEngine>,
	mut receiver: watch::Receiver<ConnectivityState>,
	config: AutoSyncConfig,
) {
	// `changed_at` only moves when `online` flips, so comparing it also catches an
	// offline/online flap that happened while a drain was running.
	let mut seen_transition: DateTime<Utc> = {
		let state = receiver.borrow_and_update();
		state.changed_at
	};

	if receiver.borrow().online {
		tokio::time::sleep(config.startup_delay).await;
		let state = receiver.borrow_and_update().clone();
		seen_transition = state.changed_at;
		if state.online {
			drain(&engine, "startup").await;
		}
	}

	while receiver.changed().await.is_ok() {
		let state = receiver.borrow_and_update().clone();
		let came_online = state.online && state.changed_at != seen_transition;
		seen_transition = state.changed_at;
		if !came_online {
			continue;
		}

		debug!(
			"Back online, draining in {:?} if the link holds",
			config.settle_delay
		);
		tokio::time::sleep(config.settle_delay).await;

		let state = receiver.borrow_and_update().clone();
		seen_transition = state.changed_at;
		if state.online {
			drain(&engine, "reconnect").await;
		} else {
			debug!("Went offline again during settle delay, skipping drain");
		}
	}

	info!("Connectivity monitor closed, stopping auto-sync");
}

async fn drain(engine: &SyncEngine, trigger: &str) {
	match engine.run_sync().await {
		Ok(outcome) => debug!(
			"Auto-sync ({}) finished: {} synced, {} failed",
			trigger, outcome.synced, outcome.failed
		),
		Err(e) => error!("Auto-sync ({}) drain failed: {}", trigger, e),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ledger::{LedgerError, MockRemoteLedger};
	use crate::store::{Amount, NewTransfer, OfflineStore};
	use crate::sync::engine::SyncConfig;
	use crate::sync::events::SyncNotification;
	use tokio::time::Instant;

	async fn store_with_one_transfer() -> Arc<OfflineStore> {
		let store = OfflineStore::in_memory().await.expect("store opens");
		store
			.enqueue(NewTransfer {
				sender_id: "sender-S".to_string(),
				receiver_id: "receiver-R".to_string(),
				receiver_payment_id: "PAY-R".to_string(),
				amount: Amount::from_minor_units(1_000),
				description: None,
				device_id: "device-1".to_string(),
			})
			.await
			.expect("enqueue");
		Arc::new(store)
	}

	fn accepting_ledger() -> MockRemoteLedger {
		let mut ledger = MockRemoteLedger::new();
		ledger.expect_duplicate_exists().returning(|_| Ok(false));
		ledger
			.expect_process_transfer()
			.returning(|_| Ok("ledger-1".to_string()));
		ledger
	}

	#[tokio::test(start_paused = true)]
	async fn test_reconnect_drains_after_settle_delay() {
		let store = store_with_one_transfer().await;
		let engine = Arc::new(SyncEngine::new(
			store.clone(),
			Arc::new(accepting_ledger()),
			SyncConfig::default(),
		));
		let mut notifications = engine.subscribe();
		let monitor = ConnectivityMonitor::new(false);
		let config = AutoSyncConfig::default();
		let _handle = spawn_auto_sync(engine.clone(), &monitor, config.clone());
		tokio::task::yield_now().await;

		let start = Instant::now();
		monitor.set_online(true);

		assert_eq!(
			notifications.recv().await.expect("syncing"),
			SyncNotification::Syncing { pending: 1 }
		);
		assert_eq!(
			notifications.recv().await.expect("success"),
			SyncNotification::Success { synced: 1 }
		);
		assert!(start.elapsed() >= config.settle_delay);
		assert_eq!(store.pending_count().await, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_offline_again_during_settle_delay_skips_drain() {
		let store = store_with_one_transfer().await;
		let mut ledger = MockRemoteLedger::new();
		ledger.expect_duplicate_exists().times(0);
		ledger.expect_process_transfer().times(0);
		let engine = Arc::new(SyncEngine::new(
			store.clone(),
			Arc::new(ledger),
			SyncConfig::default(),
		));
		let monitor = ConnectivityMonitor::new(false);
		let _handle = spawn_auto_sync(engine, &monitor, AutoSyncConfig::default());
		tokio::task::yield_now().await;

		monitor.set_online(true);
		tokio::time::sleep(Duration::from_millis(500)).await;
		monitor.set_online(false);
		tokio::time::sleep(Duration::from_secs(5)).await;

		assert_eq!(store.pending_count().await, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_startup_drain_when_already_online() {
		let store = store_with_one_transfer().await;
		let engine = Arc::new(SyncEngine::new(
			store.clone(),
			Arc::new(accepting_ledger()),
			SyncConfig::default(),
		));
		let mut notifications = engine.subscribe();
		let monitor = ConnectivityMonitor::new(true);
		let config = AutoSyncConfig::default();

		let start = Instant::now();
		let _handle = spawn_auto_sync(engine, &monitor, config.clone());

		assert_eq!(
			notifications.recv().await.expect("syncing"),
			SyncNotification::Syncing { pending: 1 }
		);
		assert!(start.elapsed() >= config.startup_delay);
	}

	#[tokio::test(start_paused = true)]
	async fn test_drain_errors_do_not_stop_the_task() {
		let store = store_with_one_transfer().await;
		let mut ledger = MockRemoteLedger::new();
		ledger.expect_duplicate_exists().returning(|_| {
			Err(LedgerError::NetworkUnavailable("unreachable".to_string()))
		});
		let engine = Arc::new(SyncEngine::new(
			store.clone(),
			Arc::new(ledger),
			SyncConfig::default(),
		));
		let mut notifications = engine.subscribe();
		let monitor = ConnectivityMonitor::new(false);
		let handle = spawn_auto_sync(engine, &monitor, AutoSyncConfig::default());
		tokio::task::yield_now().await;

		for attempt in 1..=2u32 {
			monitor.set_online(true);
			assert_eq!(
				notifications.recv().await.expect("syncing"),
				SyncNotification::Syncing { pending: 1 }
			);
			assert_eq!(
				notifications.recv().await.expect("error"),
				SyncNotification::Error { failed: 1 }
			);
			monitor.set_online(false);
			tokio::task::yield_now().await;
			assert_eq!(
				store.list_all().await[0].retry_count,
				attempt,
				"attempt {attempt}"
			);
		}
		assert!(!handle.is_finished());
	}

	#[tokio::test(start_paused = true)]
	async fn test_shutdown_stops_reacting_to_transitions() {
		let store = store_with_one_transfer().await;
		let mut ledger = MockRemoteLedger::new();
		ledger.expect_duplicate_exists().times(0);
		let engine = Arc::new(SyncEngine::new(
			store.clone(),
			Arc::new(ledger),
			SyncConfig::default(),
		));
		let monitor = ConnectivityMonitor::new(false);
		let handle = spawn_auto_sync(engine, &monitor, AutoSyncConfig::default());
		handle.shutdown();

		monitor.set_online(true);
		tokio::time::sleep(Duration::from_secs(5)).await;

		assert_eq!(store.pending_count().await, 1);
	}
}
