//! Key-value persistence for Markov models.
//!
//! The storage engine itself is a collaborator behind [`KvStore`]. This module
//! ships an ordered in-memory implementation and the persistent model built
//! on top of the trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Ordered in-memory store.
pub mod memory;

/// Markov model whose transition table lives in a `KvStore`, gated by a
/// one-time asynchronous readiness run.
pub mod persistent;

/// One operation of a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
	Put { key: String, value: Vec<u8> },
	Del { key: String },
}

/// Group of writes applied together by [`KvStore::write`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
	ops: Vec<BatchOp>,
}

impl WriteBatch {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) -> &mut Self {
		self.ops.push(BatchOp::Put { key: key.into(), value });
		self
	}

	pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
		self.ops.push(BatchOp::Del { key: key.into() });
		self
	}

	pub fn len(&self) -> usize {
		self.ops.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ops.is_empty()
	}

	pub fn into_ops(self) -> Vec<BatchOp> {
		self.ops
	}
}

/// Interface of the storage engine.
///
/// A missing key is `Ok(None)`, never an error. Any other failure is reported
/// as `MarkovError::Storage` and propagated unchanged to the caller of the
/// model operation that triggered it.
#[async_trait]
pub trait KvStore: Send + Sync {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

	async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

	async fn del(&self, key: &str) -> Result<()>;

	/// Applies every operation of `batch` in order.
	async fn write(&self, batch: WriteBatch) -> Result<()>;

	/// Every entry whose key starts with `prefix`, in ascending key order.
	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

	fn batch(&self) -> WriteBatch {
		WriteBatch::new()
	}
}

#[async_trait]
impl<S: KvStore + ?Sized> KvStore for Arc<S> {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
		(**self).get(key).await
	}

	async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
		(**self).put(key, value).await
	}

	async fn del(&self, key: &str) -> Result<()> {
		(**self).del(key).await
	}

	async fn write(&self, batch: WriteBatch) -> Result<()> {
		(**self).write(batch).await
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
		(**self).scan_prefix(prefix).await
	}
}
