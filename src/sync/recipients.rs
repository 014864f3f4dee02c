//! Recipient resolution with an offline cache.

use crate::connectivity::ConnectivityMonitor;
use crate::ledger::{LedgerError, RemoteLedger};
use crate::store::{CachedRecipient, OfflineStore, StoreError, now_millis};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolves payment ids to recipients, refreshing the local cache while online.
pub struct RecipientDirectory {
	store: Arc<OfflineStore>,
	ledger: Arc<dyn RemoteLedger>,
	monitor: Arc<ConnectivityMonitor>,
	lookup_timeout: Duration,
}

impl RecipientDirectory {
	pub fn new(
		store: Arc<OfflineStore>,
		ledger: Arc<dyn RemoteLedger>,
		monitor: Arc<ConnectivityMonitor>,
		lookup_timeout: Duration,
	) -> Self {
		Self {
			store,
			ledger,
			monitor,
			lookup_timeout,
		}
	}

	/// Resolve a payment id.
	///
	/// Online, the ledger is authoritative: a found recipient is cached and returned, and an
	/// unknown payment id resolves to `None` even if a stale cache entry exists. Offline, or when
	/// the lookup fails, the cached snapshot is returned instead.
	pub async fn resolve(&self, payment_id: &str) -> Result<Option<CachedRecipient>, StoreError> {
		if !self.monitor.is_online() {
			debug!("Offline, resolving {} from cache", payment_id);
			return Ok(self.store.lookup_recipient(payment_id).await);
		}

		match self.lookup_remote(payment_id).await {
			Ok(Some(profile)) => {
				let recipient = profile.into_cached(now_millis());
				self.store.cache_recipient(recipient.clone()).await?;
				Ok(Some(recipient))
			}
			Ok(None) => {
				debug!("Ledger has no recipient for payment id {}", payment_id);
				Ok(None)
			}
			Err(e) => {
				warn!(
					"Recipient lookup for {} failed, using cache: {}",
					payment_id, e
				);
				Ok(self.store.lookup_recipient(payment_id).await)
			}
		}
	}

	async fn lookup_remote(
		&self,
		payment_id: &str,
	) -> Result<Option<crate::ledger::RecipientProfile>, LedgerError> {
		tokio::time::timeout(
			self.lookup_timeout,
			self.ledger.lookup_recipient_by_payment_id(payment_id),
		)
		.await
		.map_err(|_| LedgerError::Timeout(self.lookup_timeout))?
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ledger::{MockRemoteLedger, RecipientProfile};

	fn profile(id: &str, payment_id: &str, name: &str) -> RecipientProfile {
		RecipientProfile {
			id: id.to_string(),
			user_id: format!("user-{id}"),
			display_name: Some(name.to_string()),
			payment_id: payment_id.to_string(),
		}
	}

	async fn directory(
		ledger: MockRemoteLedger,
		online: bool,
	) -> (RecipientDirectory, Arc<OfflineStore>) {
		let store = Arc::new(OfflineStore::in_memory().await.expect("store opens"));
		let directory = RecipientDirectory::new(
			store.clone(),
			Arc::new(ledger),
			Arc::new(ConnectivityMonitor::new(online)),
			Duration::from_secs(5),
		);
		(directory, store)
	}

	#[tokio::test]
	async fn test_online_lookup_refreshes_cache() {
		let mut ledger = MockRemoteLedger::new();
		ledger
			.expect_lookup_recipient_by_payment_id()
			.withf(|payment_id| payment_id == "PAY-1")
			.times(1)
			.returning(|_| Ok(Some(profile("r1", "PAY-1", "Ada"))));
		let (directory, store) = directory(ledger, true).await;

		let resolved = directory
			.resolve("PAY-1")
			.await
			.expect("resolve")
			.expect("recipient found");

		assert_eq!(resolved.display_name.as_deref(), Some("Ada"));
		assert_eq!(store.lookup_recipient("PAY-1").await, Some(resolved));
	}

	#[tokio::test]
	async fn test_offline_uses_cache_without_calling_ledger() {
		let mut ledger = MockRemoteLedger::new();
		ledger.expect_lookup_recipient_by_payment_id().times(0);
		let (directory, store) = directory(ledger, false).await;
		store
			.cache_recipient(profile("r1", "PAY-1", "Ada").into_cached(1))
			.await
			.expect("cache");

		let resolved = directory.resolve("PAY-1").await.expect("resolve");
		assert_eq!(resolved.map(|r| r.id), Some("r1".to_string()));
		assert!(directory.resolve("PAY-2").await.expect("resolve").is_none());
	}

	#[tokio::test]
	async fn test_network_failure_falls_back_to_cache() {
		let mut ledger = MockRemoteLedger::new();
		ledger
			.expect_lookup_recipient_by_payment_id()
			.returning(|_| Err(LedgerError::NetworkUnavailable("dns".to_string())));
		let (directory, store) = directory(ledger, true).await;
		store
			.cache_recipient(profile("r1", "PAY-1", "Ada").into_cached(1))
			.await
			.expect("cache");

		let resolved = directory.resolve("PAY-1").await.expect("resolve");
		assert_eq!(resolved.map(|r| r.cached_at), Some(1));
	}

	#[tokio::test]
	async fn test_unknown_payment_id_online_is_none() {
		let mut ledger = MockRemoteLedger::new();
		ledger
			.expect_lookup_recipient_by_payment_id()
			.returning(|_| Ok(None));
		let (directory, store) = directory(ledger, true).await;
		store
			.cache_recipient(profile("r1", "PAY-1", "Ada").into_cached(1))
			.await
			.expect("cache");

		assert!(directory.resolve("PAY-1").await.expect("resolve").is_none());
	}
}
