use crate::ledger::{LedgerError, ProcessTransferRequest, RecipientProfile};

use async_trait::async_trait;

/// The remote ledger service, as seen from the offline queue.
///
/// `process_transfer` is only idempotent per integrity hash when the caller checks
/// `duplicate_exists` first; the sync engine always does.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteLedger: Send + Sync {
	/// Whether a transfer with this integrity hash has already been applied.
	async fn duplicate_exists(&self, hash: &str) -> Result<bool, LedgerError>;

	/// Apply a transfer, returning the ledger's transfer id.
	async fn process_transfer(
		&self,
		request: &ProcessTransferRequest,
	) -> Result<String, LedgerError>;

	async fn lookup_recipient_by_payment_id(
		&self,
		payment_id: &str,
	) -> Result<Option<RecipientProfile>, LedgerError>;
}
