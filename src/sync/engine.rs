//! Sync engine: drains the offline queue into the remote ledger.
//!
//! This module defines the `SyncEngine`, which coordinates the local store and the remote ledger
//! during a drain pass. For every pending transfer it:
//! - marks the record `syncing`
//! - asks the ledger whether the integrity hash was already applied (duplicate check)
//! - otherwise submits the transfer through the ledger's process operation
//! - removes the record on success, or applies the retry policy on failure
//!
//! Records are processed strictly one at a time and the local record is updated immediately after
//! each remote call, so a crash between records leaves a queue that can be drained again safely:
//! the duplicate check turns a replay of an already-applied transfer into a success.
//!
//! At most one drain runs per engine instance; a trigger arriving while a pass is in flight
//! returns a zero outcome instead of queueing.

use crate::ledger::{LedgerError, ProcessTransferRequest, RemoteLedger};
use crate::store::{OfflineStore, PendingTransfer, StoreError, TransferStatus};
use crate::sync::events::{EventDispatcher, SyncNotification, SyncObserver};
use crate::sync::progress::{DrainTracker, SyncOutcome};

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Configuration for drain passes
#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// Failed attempts allowed before a record is marked failed; a record gets
	/// `max_retries + 1` attempts in total.
	pub max_retries: u32,
	/// Deadline applied to every individual ledger call
	pub remote_call_timeout: Duration,
	/// Mark a record failed on the first business-rule rejection instead of retrying it
	pub fail_fast_on_rejection: bool,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			max_retries: 2,
			remote_call_timeout: Duration::from_secs(15),
			fail_fast_on_rejection: false,
		}
	}
}

/// Errors that abort a whole drain pass
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Storage error: {0}")]
	Storage(#[from] StoreError),
}

/// What the ledger said about one record
enum RecordOutcome {
	Submitted { transfer_id: String },
	Duplicate,
}

/// Releases the drain flag when dropped, including on early return or error.
struct DrainGuard<'a> {
	in_progress: &'a AtomicBool,
}

impl Drop for DrainGuard<'_> {
	fn drop(&mut self) {
		self.in_progress.store(false, Ordering::Release);
	}
}

/// Drives queued transfers to the remote ledger.
pub struct SyncEngine {
	store: Arc<OfflineStore>,
	ledger: Arc<dyn RemoteLedger>,
	config: SyncConfig,
	in_progress: AtomicBool,
	dispatcher: EventDispatcher,
}

impl SyncEngine {
	pub fn new(store: Arc<OfflineStore>, ledger: Arc<dyn RemoteLedger>, config: SyncConfig) -> Self {
		Self {
			store,
			ledger,
			config,
			in_progress: AtomicBool::new(false),
			dispatcher: EventDispatcher::new(),
		}
	}

	pub fn store(&self) -> &Arc<OfflineStore> {
		&self.store
	}

	pub fn config(&self) -> &SyncConfig {
		&self.config
	}

	/// Whether a drain pass is currently running.
	pub fn is_syncing(&self) -> bool {
		self.in_progress.load(Ordering::Acquire)
	}

	/// Register the observer for drain notifications, replacing any previous one.
	pub fn register_observer<F>(&self, observer: F)
	where
		F: Fn(&SyncNotification) + Send + Sync + 'static,
	{
		self.dispatcher.register_observer(Arc::new(observer));
	}

	/// Register an observer implemented as a type rather than a closure.
	pub fn register_observer_arc(&self, observer: Arc<dyn SyncObserver>) {
		self.dispatcher.register_observer(observer);
	}

	pub fn clear_observer(&self) {
		self.dispatcher.clear_observer();
	}

	/// Subscribe to drain notifications alongside the registered observer.
	pub fn subscribe(&self) -> broadcast::Receiver<SyncNotification> {
		self.dispatcher.subscribe()
	}

	/// Run one drain pass over every pending transfer.
	///
	/// Returns immediately with a zero outcome when another pass is in flight. Errors of
	/// individual ledger calls become status transitions; storage errors abort the pass.
	pub async fn run_sync(&self) -> Result<SyncOutcome, SyncError> {
		let Some(_guard) = self.try_begin_drain() else {
			debug!("Drain already in progress, skipping trigger");
			return Ok(SyncOutcome::default());
		};

		self.store.requeue_interrupted().await?;

		let mut pending = self.store.list_pending().await;
		if pending.is_empty() {
			debug!("No pending transfers to sync");
			return Ok(SyncOutcome::default());
		}
		pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

		info!("Starting drain of {} pending transfers", pending.len());
		self.dispatcher.dispatch(SyncNotification::Syncing {
			pending: pending.len(),
		});

		let mut tracker = DrainTracker::new(pending.len());
		for transfer in pending {
			self.drain_one(&transfer, &mut tracker).await?;
		}

		let outcome = tracker.outcome();
		if outcome.synced > 0 {
			self.dispatcher.dispatch(SyncNotification::Success {
				synced: outcome.synced,
			});
		}
		if outcome.failed > 0 {
			self.dispatcher.dispatch(SyncNotification::Error {
				failed: outcome.failed,
			});
		}

		info!("{}", tracker.summary());
		Ok(outcome)
	}

	fn try_begin_drain(&self) -> Option<DrainGuard<'_>> {
		self.in_progress
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.ok()
			.map(|_| DrainGuard {
				in_progress: &self.in_progress,
			})
	}

	async fn drain_one(
		&self,
		transfer: &PendingTransfer,
		tracker: &mut DrainTracker,
	) -> Result<(), SyncError> {
		if self
			.store
			.set_status(&transfer.id, TransferStatus::Syncing, false)
			.await?
			.is_none()
		{
			debug!("Transfer {} vanished before it could be synced", transfer.id);
			tracker.record_skipped();
			return Ok(());
		}

		match self.submit(transfer).await {
			Ok(RecordOutcome::Duplicate) => {
				info!(
					"Transfer {} already applied by the ledger (hash {}), removing",
					transfer.id, transfer.hash
				);
				self.store.remove(&transfer.id).await?;
				tracker.record_duplicate();
			}
			Ok(RecordOutcome::Submitted { transfer_id }) => {
				info!(
					"Transfer {} synced as ledger transfer {}",
					transfer.id, transfer_id
				);
				self.store.remove(&transfer.id).await?;
				tracker.record_submitted();
			}
			Err(e) => {
				let terminal = self.record_failure(transfer, &e).await?;
				tracker.record_failure(terminal);
			}
		}
		Ok(())
	}

	/// Duplicate check first, then the process call.
	async fn submit(&self, transfer: &PendingTransfer) -> Result<RecordOutcome, LedgerError> {
		if self
			.with_deadline(self.ledger.duplicate_exists(&transfer.hash))
			.await?
		{
			return Ok(RecordOutcome::Duplicate);
		}

		let request = ProcessTransferRequest::from_pending(transfer);
		let transfer_id = self
			.with_deadline(self.ledger.process_transfer(&request))
			.await?;
		Ok(RecordOutcome::Submitted { transfer_id })
	}

	async fn with_deadline<T>(
		&self,
		call: impl Future<Output = Result<T, LedgerError>>,
	) -> Result<T, LedgerError> {
		let deadline = self.config.remote_call_timeout;
		tokio::time::timeout(deadline, call)
			.await
			.map_err(|_| LedgerError::Timeout(deadline))?
	}

	/// Apply the retry policy after a failed attempt. Returns whether the record is now terminal.
	async fn record_failure(
		&self,
		transfer: &PendingTransfer,
		error: &LedgerError,
	) -> Result<bool, SyncError> {
		let retries_exhausted = transfer.retry_count >= self.config.max_retries;
		let rejected_fast = self.config.fail_fast_on_rejection && error.is_rejection();
		let terminal = retries_exhausted || rejected_fast;
		let status = if terminal {
			TransferStatus::Failed
		} else {
			TransferStatus::Pending
		};

		let updated = self.store.set_status(&transfer.id, status, true).await?;
		let retry_count = updated.map_or(transfer.retry_count + 1, |record| record.retry_count);

		if terminal {
			warn!(
				"Transfer {} failed permanently after {} attempts: {}",
				transfer.id, retry_count, error
			);
		} else {
			warn!(
				"Transfer {} failed (attempt {}), will retry: {}",
				transfer.id, retry_count, error
			);
		}
		Ok(terminal)
	}
}
