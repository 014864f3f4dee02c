use crate::store::StoreError;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Version of the on-disk collection document layout
pub const SCHEMA_VERSION: u32 = 1;

/// The three logical collections owned by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
	PendingTransfers,
	CachedRecipients,
	OfflineSettings,
}

impl Collection {
	pub fn name(&self) -> &'static str {
		match self {
			Collection::PendingTransfers => "pending_transfers",
			Collection::CachedRecipients => "cached_recipients",
			Collection::OfflineSettings => "offline_settings",
		}
	}
}

/// Persisted form of one collection
#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionDocument<T> {
	pub schema_version: u32,
	pub saved_at: DateTime<Utc>,
	pub records: Vec<T>,
}

pub fn encode_document<T: Serialize>(records: Vec<T>) -> Result<Vec<u8>, StoreError> {
	let document = CollectionDocument {
		schema_version: SCHEMA_VERSION,
		saved_at: Utc::now(),
		records,
	};
	Ok(serde_json::to_vec_pretty(&document)?)
}

pub fn decode_document<T: DeserializeOwned>(
	collection: Collection,
	bytes: &[u8],
) -> Result<Vec<T>, StoreError> {
	let document: CollectionDocument<T> = serde_json::from_slice(bytes).map_err(|e| {
		StoreError::StorageUnavailable(format!(
			"Failed to parse {} document: {}",
			collection.name(),
			e
		))
	})?;

	if document.schema_version > SCHEMA_VERSION {
		return Err(StoreError::StorageUnavailable(format!(
			"{} document has schema version {}, newest supported is {}",
			collection.name(),
			document.schema_version,
			SCHEMA_VERSION
		)));
	}

	Ok(document.records)
}

/// Byte-level persistence for whole collection documents.
///
/// A `persist` call must either replace the stored document entirely or leave the previous one in
/// place; the store relies on this to make each operation a single atomic write.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
	async fn load(&self, collection: Collection) -> Result<Option<Vec<u8>>, StoreError>;
	async fn persist(&self, collection: Collection, document: Vec<u8>) -> Result<(), StoreError>;

	/// Get the name of this backend for logging
	fn name(&self) -> &'static str;
}

/// File-based implementation of StorageBackend
pub struct FileBackend {
	data_dir: PathBuf,
}

impl FileBackend {
	/// Open (creating if needed) a data directory.
	pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let data_dir = data_dir.into();
		tokio::fs::create_dir_all(&data_dir).await.map_err(|e| {
			StoreError::StorageUnavailable(format!(
				"Failed to create data directory {:?}: {}",
				data_dir, e
			))
		})?;

		info!("Opened offline store directory {:?}", data_dir);
		Ok(Self { data_dir })
	}

	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}

	fn document_path(&self, collection: Collection) -> PathBuf {
		self.data_dir.join(format!("{}.json", collection.name()))
	}

	fn temp_path(&self, collection: Collection) -> PathBuf {
		self.data_dir.join(format!("{}.json.tmp", collection.name()))
	}
}

#[async_trait::async_trait]
impl StorageBackend for FileBackend {
	async fn load(&self, collection: Collection) -> Result<Option<Vec<u8>>, StoreError> {
		let path = self.document_path(collection);
		match tokio::fs::read(&path).await {
			Ok(bytes) => {
				debug!("Loaded {} bytes from {:?}", bytes.len(), path);
				Ok(Some(bytes))
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(StoreError::StorageUnavailable(format!(
				"Failed to read {:?}: {}",
				path, e
			))),
		}
	}

	async fn persist(&self, collection: Collection, document: Vec<u8>) -> Result<(), StoreError> {
		let temp_path = self.temp_path(collection);
		let path = self.document_path(collection);
		let unavailable = |action: &str, e: std::io::Error| {
			StoreError::StorageUnavailable(format!("Failed to {} {:?}: {}", action, temp_path, e))
		};

		let mut file = tokio::fs::File::create(&temp_path)
			.await
			.map_err(|e| unavailable("create", e))?;
		file.write_all(&document)
			.await
			.map_err(|e| unavailable("write", e))?;
		file.sync_all().await.map_err(|e| unavailable("sync", e))?;
		drop(file);

		tokio::fs::rename(&temp_path, &path).await.map_err(|e| {
			StoreError::StorageUnavailable(format!(
				"Failed to move {:?} into place at {:?}: {}",
				temp_path, path, e
			))
		})?;

		debug!("Persisted {} ({} bytes)", collection.name(), document.len());
		Ok(())
	}

	fn name(&self) -> &'static str {
		"FileBackend"
	}
}

/// Process-local backend. Clones share the same documents, so a store can be reopened on a clone
/// to simulate a restart.
#[derive(Clone, Default)]
pub struct MemoryBackend {
	documents: Arc<Mutex<HashMap<Collection, Vec<u8>>>>,
}

impl MemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}

	fn documents(
		&self,
	) -> Result<std::sync::MutexGuard<'_, HashMap<Collection, Vec<u8>>>, StoreError> {
		self.documents
			.lock()
			.map_err(|_| StoreError::StorageUnavailable("Memory backend lock poisoned".to_string()))
	}
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
	async fn load(&self, collection: Collection) -> Result<Option<Vec<u8>>, StoreError> {
		Ok(self.documents()?.get(&collection).cloned())
	}

	async fn persist(&self, collection: Collection, document: Vec<u8>) -> Result<(), StoreError> {
		self.documents()?.insert(collection, document);
		Ok(())
	}

	fn name(&self) -> &'static str {
		"MemoryBackend"
	}
}

/// Backend whose writes can be switched off to simulate an unavailable disk
#[cfg(test)]
#[derive(Clone, Default)]
pub struct FlakyBackend {
	inner: MemoryBackend,
	fail_writes: Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(test)]
impl FlakyBackend {
	pub fn set_fail_writes(&self, fail: bool) {
		self.fail_writes
			.store(fail, std::sync::atomic::Ordering::SeqCst);
	}
}

#[cfg(test)]
#[async_trait::async_trait]
impl StorageBackend for FlakyBackend {
	async fn load(&self, collection: Collection) -> Result<Option<Vec<u8>>, StoreError> {
		self.inner.load(collection).await
	}

	async fn persist(&self, collection: Collection, document: Vec<u8>) -> Result<(), StoreError> {
		if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
			return Err(StoreError::StorageUnavailable("disk full".to_string()));
		}
		self.inner.persist(collection, document).await
	}

	fn name(&self) -> &'static str {
		"FlakyBackend"
	}
}
