//! The durable local store for offline transfers.
//!
//! `OfflineStore` owns the three collections (pending transfers, cached recipients, offline
//! settings) and keeps secondary indexes over them in memory. Every mutating operation builds the
//! next version of the affected collection, persists it through the [`StorageBackend`] and only
//! then commits it in memory, so a failed write leaves the store exactly as it was.
//!
//! Operations are serialized behind a single async mutex; each one is a self-contained
//! transaction with respect to every other store call.

use crate::store::hash::{integrity_hash, transfer_id};
use crate::store::repositories::{
	Collection, FileBackend, MemoryBackend, StorageBackend, decode_document, encode_document,
};
use crate::store::{
	Amount, CachedRecipient, NewTransfer, OfflineSetting, PendingTransfer, StoreError,
	TransferStatus,
};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Settings key holding the stable per-installation device identifier
pub const DEVICE_ID_SETTING: &str = "device_id";

/// Configuration for the local store
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
	/// Maximum number of pending/syncing transfers; `None` means unbounded.
	pub max_queued_transfers: Option<usize>,
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
	Utc::now().timestamp_millis()
}

/// UTC midnight at or before `timestamp_ms`.
pub fn day_start(timestamp_ms: i64) -> i64 {
	DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
		.and_then(|ts| ts.date_naive().and_hms_opt(0, 0, 0))
		.map(|midnight| midnight.and_utc().timestamp_millis())
		.unwrap_or(timestamp_ms)
}

/// Pending transfer records plus their secondary indexes.
#[derive(Debug, Clone, Default)]
struct TransferTable {
	records: HashMap<String, PendingTransfer>,
	by_status: HashMap<TransferStatus, BTreeSet<String>>,
	by_created: BTreeSet<(i64, String)>,
	by_sender: HashMap<String, BTreeSet<String>>,
}

impl TransferTable {
	fn from_records(records: Vec<PendingTransfer>) -> Self {
		let mut table = Self::default();
		for record in records {
			table.insert(record);
		}
		table
	}

	fn get(&self, id: &str) -> Option<&PendingTransfer> {
		self.records.get(id)
	}

	fn insert(&mut self, record: PendingTransfer) {
		self.remove(&record.id);
		self.by_status
			.entry(record.status)
			.or_default()
			.insert(record.id.clone());
		self.by_created.insert((record.created_at, record.id.clone()));
		self.by_sender
			.entry(record.sender_id.clone())
			.or_default()
			.insert(record.id.clone());
		self.records.insert(record.id.clone(), record);
	}

	fn remove(&mut self, id: &str) -> Option<PendingTransfer> {
		let record = self.records.remove(id)?;
		if let Some(ids) = self.by_status.get_mut(&record.status) {
			ids.remove(id);
		}
		self.by_created.remove(&(record.created_at, record.id.clone()));
		if let Some(ids) = self.by_sender.get_mut(&record.sender_id) {
			ids.remove(id);
			if ids.is_empty() {
				self.by_sender.remove(&record.sender_id);
			}
		}
		Some(record)
	}

	fn ids_with_status(&self, status: TransferStatus) -> Vec<String> {
		self.by_status
			.get(&status)
			.map(|ids| ids.iter().cloned().collect())
			.unwrap_or_default()
	}

	fn with_status(&self, status: TransferStatus) -> Vec<PendingTransfer> {
		self.by_status
			.get(&status)
			.into_iter()
			.flatten()
			.filter_map(|id| self.records.get(id).cloned())
			.collect()
	}

	fn count_active(&self) -> usize {
		[TransferStatus::Pending, TransferStatus::Syncing]
			.iter()
			.map(|status| self.by_status.get(status).map_or(0, BTreeSet::len))
			.sum()
	}

	/// Records in ascending creation order
	fn ordered(&self) -> impl DoubleEndedIterator<Item = &PendingTransfer> {
		self.by_created
			.iter()
			.filter_map(|(_, id)| self.records.get(id))
	}

	fn latest_created_at(&self) -> Option<i64> {
		self.by_created.iter().next_back().map(|(created_at, _)| *created_at)
	}
}

/// Cached recipients keyed by internal id, indexed by payment id.
#[derive(Debug, Clone, Default)]
struct RecipientTable {
	records: HashMap<String, CachedRecipient>,
	by_payment_id: HashMap<String, String>,
}

impl RecipientTable {
	fn from_records(records: Vec<CachedRecipient>) -> Self {
		let mut table = Self::default();
		let mut records = records;
		records.sort_by_key(|record| record.cached_at);
		for record in records {
			table.upsert(record);
		}
		table
	}

	fn upsert(&mut self, record: CachedRecipient) {
		if let Some(previous_id) = self.by_payment_id.get(&record.payment_id).cloned() {
			self.records.remove(&previous_id);
		}
		if let Some(previous) = self.records.remove(&record.id) {
			self.by_payment_id.remove(&previous.payment_id);
		}
		self.by_payment_id
			.insert(record.payment_id.clone(), record.id.clone());
		self.records.insert(record.id.clone(), record);
	}

	fn by_payment_id(&self, payment_id: &str) -> Option<&CachedRecipient> {
		self.by_payment_id
			.get(payment_id)
			.and_then(|id| self.records.get(id))
	}

	fn to_records(&self) -> Vec<CachedRecipient> {
		let mut records: Vec<CachedRecipient> = self.records.values().cloned().collect();
		records.sort_by(|a, b| a.cached_at.cmp(&b.cached_at).then_with(|| a.id.cmp(&b.id)));
		records
	}
}

#[derive(Debug, Default)]
struct StoreState {
	transfers: TransferTable,
	recipients: RecipientTable,
	settings: BTreeMap<String, OfflineSetting>,
	last_created_at: i64,
}

/// Crash-durable, transactional store for queued transfers, cached recipients and settings.
pub struct OfflineStore {
	backend: Box<dyn StorageBackend>,
	config: StoreConfig,
	state: Mutex<StoreState>,
}

impl OfflineStore {
	/// Open a store over the given backend, loading all collections.
	///
	/// Any record left in `syncing` by an interrupted drain is moved back to `pending`.
	pub async fn open(
		backend: impl StorageBackend + 'static,
		config: StoreConfig,
	) -> Result<Self, StoreError> {
		let backend: Box<dyn StorageBackend> = Box::new(backend);

		let transfers: Vec<PendingTransfer> =
			load_collection(backend.as_ref(), Collection::PendingTransfers).await?;
		let recipients: Vec<CachedRecipient> =
			load_collection(backend.as_ref(), Collection::CachedRecipients).await?;
		let settings: Vec<OfflineSetting> =
			load_collection(backend.as_ref(), Collection::OfflineSettings).await?;

		let transfers = TransferTable::from_records(transfers);
		let state = StoreState {
			last_created_at: transfers.latest_created_at().unwrap_or(0),
			transfers,
			recipients: RecipientTable::from_records(recipients),
			settings: settings
				.into_iter()
				.map(|setting| (setting.key.clone(), setting))
				.collect(),
		};

		info!(
			"Opened offline store on {}: {} queued transfers, {} cached recipients, {} settings",
			backend.name(),
			state.transfers.records.len(),
			state.recipients.records.len(),
			state.settings.len()
		);

		let store = Self {
			backend,
			config,
			state: Mutex::new(state),
		};
		store.requeue_interrupted().await?;
		Ok(store)
	}

	/// Open a file-backed store rooted at `data_dir`.
	pub async fn open_file(
		data_dir: impl Into<PathBuf>,
		config: StoreConfig,
	) -> Result<Self, StoreError> {
		let backend = FileBackend::open(data_dir).await?;
		Self::open(backend, config).await
	}

	/// Open an empty, process-local store.
	pub async fn in_memory() -> Result<Self, StoreError> {
		Self::open(MemoryBackend::new(), StoreConfig::default()).await
	}

	/// Persist a new transfer as `pending` and return the full record.
	pub async fn enqueue(&self, transfer: NewTransfer) -> Result<PendingTransfer, StoreError> {
		validate_new_transfer(&transfer)?;

		let mut state = self.state.lock().await;

		if let Some(limit) = self.config.max_queued_transfers {
			let queued = state.transfers.count_active();
			if queued >= limit {
				return Err(StoreError::StorageUnavailable(format!(
					"quota exceeded: {} transfers already queued (limit {})",
					queued, limit
				)));
			}
		}

		let created_at = now_millis().max(state.last_created_at + 1);
		let hash = integrity_hash(
			&transfer.sender_id,
			&transfer.receiver_id,
			transfer.amount,
			created_at,
			&transfer.device_id,
		);
		let record = PendingTransfer {
			id: transfer_id(created_at, &hash),
			sender_id: transfer.sender_id,
			receiver_id: transfer.receiver_id,
			receiver_payment_id: transfer.receiver_payment_id,
			amount: transfer.amount,
			description: transfer.description,
			created_at,
			status: TransferStatus::Pending,
			hash,
			retry_count: 0,
			device_id: transfer.device_id,
		};

		let mut next = state.transfers.clone();
		next.insert(record.clone());
		self.commit_transfers(&mut state, next).await?;
		state.last_created_at = created_at;

		info!(
			"Queued offline transfer {} ({} to {})",
			record.id, record.amount, record.receiver_payment_id
		);
		Ok(record)
	}

	/// All records currently waiting for a drain pass.
	pub async fn list_pending(&self) -> Vec<PendingTransfer> {
		self.list_by_status(TransferStatus::Pending).await
	}

	pub async fn list_by_status(&self, status: TransferStatus) -> Vec<PendingTransfer> {
		self.state.lock().await.transfers.with_status(status)
	}

	/// All queued records, newest first.
	pub async fn list_all(&self) -> Vec<PendingTransfer> {
		let state = self.state.lock().await;
		state.transfers.ordered().rev().cloned().collect()
	}

	/// A sender's queued records, newest first.
	pub async fn list_by_sender(&self, sender_id: &str) -> Vec<PendingTransfer> {
		let state = self.state.lock().await;
		let Some(ids) = state.transfers.by_sender.get(sender_id) else {
			return Vec::new();
		};
		let mut records: Vec<PendingTransfer> = ids
			.iter()
			.filter_map(|id| state.transfers.get(id).cloned())
			.collect();
		records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		records
	}

	pub async fn get(&self, id: &str) -> Option<PendingTransfer> {
		self.state.lock().await.transfers.get(id).cloned()
	}

	pub async fn pending_count(&self) -> usize {
		let state = self.state.lock().await;
		state
			.transfers
			.by_status
			.get(&TransferStatus::Pending)
			.map_or(0, BTreeSet::len)
	}

	/// Update a record's status, optionally incrementing its retry count, in a single write.
	///
	/// Returns the updated record, or `None` (without writing) when the id is unknown.
	pub async fn set_status(
		&self,
		id: &str,
		status: TransferStatus,
		increment_retry: bool,
	) -> Result<Option<PendingTransfer>, StoreError> {
		let mut state = self.state.lock().await;
		let Some(mut record) = state.transfers.get(id).cloned() else {
			debug!("set_status({}) ignored: no such transfer", id);
			return Ok(None);
		};

		record.status = status;
		if increment_retry {
			record.retry_count = record.retry_count.saturating_add(1);
		}

		let mut next = state.transfers.clone();
		next.insert(record.clone());
		self.commit_transfers(&mut state, next).await?;

		debug!(
			"Transfer {} is now {} (retry count {})",
			record.id, record.status, record.retry_count
		);
		Ok(Some(record))
	}

	/// Remove a record. Removing an unknown id is not an error; returns whether a record existed.
	pub async fn remove(&self, id: &str) -> Result<bool, StoreError> {
		let mut state = self.state.lock().await;
		if state.transfers.get(id).is_none() {
			return Ok(false);
		}

		let mut next = state.transfers.clone();
		next.remove(id);
		self.commit_transfers(&mut state, next).await?;

		debug!("Removed transfer {}", id);
		Ok(true)
	}

	/// Delete every record that is neither pending nor syncing; returns how many were removed.
	pub async fn purge_finished(&self) -> Result<usize, StoreError> {
		let mut state = self.state.lock().await;
		let finished: Vec<String> = state
			.transfers
			.records
			.values()
			.filter(|record| !record.status.is_active())
			.map(|record| record.id.clone())
			.collect();

		if finished.is_empty() {
			return Ok(0);
		}

		let mut next = state.transfers.clone();
		for id in &finished {
			next.remove(id);
		}
		self.commit_transfers(&mut state, next).await?;

		info!("Purged {} finished transfers", finished.len());
		Ok(finished.len())
	}

	/// Move every `syncing` record back to `pending`; returns how many were moved.
	///
	/// Only the sync engine's drain guard holder may call this while the store is shared.
	pub async fn requeue_interrupted(&self) -> Result<usize, StoreError> {
		let mut state = self.state.lock().await;
		let interrupted = state.transfers.ids_with_status(TransferStatus::Syncing);
		if interrupted.is_empty() {
			return Ok(0);
		}

		let mut next = state.transfers.clone();
		for id in &interrupted {
			if let Some(mut record) = next.get(id).cloned() {
				record.status = TransferStatus::Pending;
				next.insert(record);
			}
		}
		self.commit_transfers(&mut state, next).await?;

		warn!(
			"Requeued {} transfers left in syncing by an interrupted drain",
			interrupted.len()
		);
		Ok(interrupted.len())
	}

	/// Upsert a recipient snapshot keyed by its payment id.
	pub async fn cache_recipient(&self, recipient: CachedRecipient) -> Result<(), StoreError> {
		let mut state = self.state.lock().await;
		let mut next = state.recipients.clone();
		let payment_id = recipient.payment_id.clone();
		next.upsert(recipient);

		let document = encode_document(next.to_records())?;
		self.backend
			.persist(Collection::CachedRecipients, document)
			.await?;
		state.recipients = next;

		debug!("Cached recipient for payment id {}", payment_id);
		Ok(())
	}

	pub async fn lookup_recipient(&self, payment_id: &str) -> Option<CachedRecipient> {
		let state = self.state.lock().await;
		state.recipients.by_payment_id(payment_id).cloned()
	}

	/// Sum of a user's queued, non-failed amounts created at or after `day_start`.
	pub async fn daily_offline_total(&self, user_id: &str, day_start: i64) -> Amount {
		let state = self.state.lock().await;
		let Some(ids) = state.transfers.by_sender.get(user_id) else {
			return Amount::ZERO;
		};

		ids.iter()
			.filter_map(|id| state.transfers.get(id))
			.filter(|record| {
				record.created_at >= day_start && record.status != TransferStatus::Failed
			})
			.fold(Amount::ZERO, |total, record| total.saturating_add(record.amount))
	}

	pub async fn get_setting(&self, key: &str) -> Option<serde_json::Value> {
		let state = self.state.lock().await;
		state.settings.get(key).map(|setting| setting.value.clone())
	}

	pub async fn get_setting_as<T: DeserializeOwned>(
		&self,
		key: &str,
	) -> Result<Option<T>, StoreError> {
		match self.get_setting(key).await {
			Some(value) => Ok(Some(serde_json::from_value(value)?)),
			None => Ok(None),
		}
	}

	pub async fn set_setting<T: Serialize + ?Sized>(
		&self,
		key: &str,
		value: &T,
	) -> Result<(), StoreError> {
		let value = serde_json::to_value(value)?;
		let mut state = self.state.lock().await;
		let mut next = state.settings.clone();
		next.insert(
			key.to_string(),
			OfflineSetting {
				key: key.to_string(),
				value,
				updated_at: now_millis(),
			},
		);
		self.commit_settings(&mut state, next).await
	}

	pub async fn remove_setting(&self, key: &str) -> Result<bool, StoreError> {
		let mut state = self.state.lock().await;
		if !state.settings.contains_key(key) {
			return Ok(false);
		}
		let mut next = state.settings.clone();
		next.remove(key);
		self.commit_settings(&mut state, next).await?;
		Ok(true)
	}

	/// Stable identifier of this installation, generated and persisted on first use.
	pub async fn device_id(&self) -> Result<String, StoreError> {
		if let Some(device_id) = self.get_setting_as::<String>(DEVICE_ID_SETTING).await? {
			return Ok(device_id);
		}

		let mut bytes = [0u8; 16];
		rand::rng().fill(&mut bytes);
		let device_id = hex::encode(bytes);
		self.set_setting(DEVICE_ID_SETTING, &device_id).await?;

		info!("Generated device id {}", device_id);
		Ok(device_id)
	}

	async fn commit_transfers(
		&self,
		state: &mut StoreState,
		next: TransferTable,
	) -> Result<(), StoreError> {
		let records: Vec<&PendingTransfer> = next.ordered().collect();
		let document = encode_document(records)?;
		self.backend
			.persist(Collection::PendingTransfers, document)
			.await?;
		state.transfers = next;
		Ok(())
	}

	async fn commit_settings(
		&self,
		state: &mut StoreState,
		next: BTreeMap<String, OfflineSetting>,
	) -> Result<(), StoreError> {
		let document = encode_document(next.values().collect::<Vec<_>>())?;
		self.backend
			.persist(Collection::OfflineSettings, document)
			.await?;
		state.settings = next;
		Ok(())
	}
}

async fn load_collection<T: DeserializeOwned>(
	backend: &dyn StorageBackend,
	collection: Collection,
) -> Result<Vec<T>, StoreError> {
	match backend.load(collection).await? {
		Some(bytes) => decode_document(collection, &bytes),
		None => Ok(Vec::new()),
	}
}

fn validate_new_transfer(transfer: &NewTransfer) -> Result<(), StoreError> {
	if transfer.amount.is_zero() {
		return Err(StoreError::InvalidTransfer(
			"amount must be greater than zero".to_string(),
		));
	}
	for (field, value) in [
		("sender_id", &transfer.sender_id),
		("receiver_id", &transfer.receiver_id),
		("device_id", &transfer.device_id),
	] {
		if value.trim().is_empty() {
			return Err(StoreError::InvalidTransfer(format!("{} must not be empty", field)));
		}
	}
	Ok(())
}
