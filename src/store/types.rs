use crate::store::Amount;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a queued transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
	/// Waiting for the next drain pass
	Pending,
	/// Currently being submitted by the sync engine
	Syncing,
	/// Terminal: retries exhausted, kept for inspection until purged
	Failed,
}

impl TransferStatus {
	/// Pending and syncing records are in-flight work and must never be purged.
	pub fn is_active(&self) -> bool {
		matches!(self, TransferStatus::Pending | TransferStatus::Syncing)
	}
}

impl fmt::Display for TransferStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			TransferStatus::Pending => "pending",
			TransferStatus::Syncing => "syncing",
			TransferStatus::Failed => "failed",
		};
		f.write_str(label)
	}
}

/// A transfer as submitted by the caller, before the store assigns identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
	pub sender_id: String,
	pub receiver_id: String,
	/// Display token the user typed or scanned for the receiver
	pub receiver_payment_id: String,
	pub amount: Amount,
	pub description: Option<String>,
	pub device_id: String,
}

/// A locally queued, not yet confirmed money movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransfer {
	pub id: String,
	pub sender_id: String,
	pub receiver_id: String,
	pub receiver_payment_id: String,
	pub amount: Amount,
	pub description: Option<String>,
	/// Milliseconds since the Unix epoch, strictly increasing per store
	pub created_at: i64,
	pub status: TransferStatus,
	/// Integrity hash, computed once at enqueue time
	pub hash: String,
	pub retry_count: u32,
	pub device_id: String,
}

/// Snapshot of a counterparty's public payment profile, used to resolve recipients offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRecipient {
	pub id: String,
	pub user_id: String,
	pub display_name: Option<String>,
	pub payment_id: String,
	pub cached_at: i64,
}

/// Arbitrary engine-local configuration or preference persisted across sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineSetting {
	pub key: String,
	pub value: serde_json::Value,
	pub updated_at: i64,
}

/// Error types for the durable local store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("Storage unavailable: {0}")]
	StorageUnavailable(String),

	#[error("Invalid transfer: {0}")]
	InvalidTransfer(String),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}
