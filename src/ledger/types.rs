//! Types for the remote ledger integration

use crate::store::{Amount, CachedRecipient, PendingTransfer};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Arguments of the ledger's process-transfer operation.
///
/// This tuple is the only data that crosses from the local queue to the remote ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTransferRequest {
	pub sender_id: String,
	pub receiver_id: String,
	pub amount: Amount,
	pub description: Option<String>,
	pub is_offline: bool,
	/// Integrity hash of the queued transfer, the ledger-side idempotency key.
	pub hash: String,
	pub device_id: String,
}

impl ProcessTransferRequest {
	/// Build the submission for a queued transfer.
	pub fn from_pending(transfer: &PendingTransfer) -> Self {
		Self {
			sender_id: transfer.sender_id.clone(),
			receiver_id: transfer.receiver_id.clone(),
			amount: transfer.amount,
			description: transfer.description.clone(),
			is_offline: true,
			hash: transfer.hash.clone(),
			device_id: transfer.device_id.clone(),
		}
	}
}

/// A counterparty's public payment profile as returned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientProfile {
	pub id: String,
	pub user_id: String,
	pub display_name: Option<String>,
	pub payment_id: String,
}

impl RecipientProfile {
	pub fn into_cached(self, cached_at: i64) -> CachedRecipient {
		CachedRecipient {
			id: self.id,
			user_id: self.user_id,
			display_name: self.display_name,
			payment_id: self.payment_id,
			cached_at,
		}
	}
}

/// Error types for remote ledger calls
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
	/// The ledger refused the transfer (insufficient funds, invalid receiver, ...)
	#[error("Transfer rejected by ledger: {0}")]
	Rejected(String),

	/// The call could not be completed
	#[error("Ledger unreachable: {0}")]
	NetworkUnavailable(String),

	#[error("Ledger call timed out after {0:?}")]
	Timeout(Duration),

	#[error("Invalid ledger response: {0}")]
	InvalidResponse(String),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),
}

impl LedgerError {
	/// Business-rule refusals that a retry cannot fix.
	pub fn is_rejection(&self) -> bool {
		matches!(self, LedgerError::Rejected(_))
	}
}

impl From<reqwest::Error> for LedgerError {
	fn from(e: reqwest::Error) -> Self {
		if e.is_decode() {
			LedgerError::InvalidResponse(e.to_string())
		} else {
			LedgerError::NetworkUnavailable(e.to_string())
		}
	}
}
