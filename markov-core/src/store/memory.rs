use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BatchOp, KvStore, WriteBatch};
use crate::error::Result;

/// `KvStore` over a `BTreeMap`, so prefix scans come back in key order.
///
/// Batches are applied under a single write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of stored keys.
	pub async fn len(&self) -> usize {
		self.entries.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.entries.read().await.is_empty()
	}
}

#[async_trait]
impl KvStore for MemoryStore {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
		Ok(self.entries.read().await.get(key).cloned())
	}

	async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
		self.entries.write().await.insert(key.to_owned(), value);
		Ok(())
	}

	async fn del(&self, key: &str) -> Result<()> {
		self.entries.write().await.remove(key);
		Ok(())
	}

	async fn write(&self, batch: WriteBatch) -> Result<()> {
		let mut entries = self.entries.write().await;
		for op in batch.into_ops() {
			match op {
				BatchOp::Put { key, value } => {
					entries.insert(key, value);
				}
				BatchOp::Del { key } => {
					entries.remove(&key);
				}
			}
		}
		Ok(())
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
		let entries = self.entries.read().await;
		Ok(entries
			.range(prefix.to_owned()..)
			.take_while(|(key, _)| key.starts_with(prefix))
			.map(|(key, value)| (key.clone(), value.clone()))
			.collect())
	}
}
