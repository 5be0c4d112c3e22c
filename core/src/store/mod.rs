//! Record store contract
//!
//! The engine persists index entries through this narrow interface. The
//! store's internals (schema, SQL dialect, transactions) are its own
//! concern; the engine only relies on upserts being idempotent, batch
//! upserts reporting per-item errors, and path removal cascading to
//! descendants.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::metadata::FileMetadata;

mod memory;

pub use memory::MemoryRecordStore;

/// Opaque store failure. The engine treats every store error the same way
/// (count, log, continue), so no structure beyond the message is needed.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
	#[must_use]
	pub fn new(message: impl Into<String>) -> Self {
		Self(message.into())
	}
}

/// A directory tree under active observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchRootRecord {
	pub id: Uuid,
	/// Canonical, platform-normalized root path.
	pub path: PathBuf,
	/// Maximum recursion depth below the root; `None` is unbounded.
	pub depth: Option<u32>,
	pub created_at: DateTime<Utc>,
	pub last_indexed_at: Option<DateTime<Utc>>,
	pub total_entries: u64,
	pub processed_entries: u64,
}

impl WatchRootRecord {
	#[must_use]
	pub fn new(path: PathBuf, depth: Option<u32>) -> Self {
		Self {
			id: Uuid::new_v4(),
			path,
			depth,
			created_at: Utc::now(),
			last_indexed_at: None,
			total_entries: 0,
			processed_entries: 0,
		}
	}

	/// Whether this root's configured depth reaches `path`. Depth is the
	/// number of path segments between the root and the target; unbounded
	/// depth always reaches.
	#[must_use]
	pub fn reaches(&self, path: &Path) -> bool {
		let Ok(relative) = path.strip_prefix(&self.path) else {
			return false;
		};

		match self.depth {
			None => true,
			Some(depth) => relative.components().count() <= depth as usize,
		}
	}
}

/// An indexed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
	pub path: PathBuf,
	pub parent_path: Option<PathBuf>,
	/// The most specific watch root containing this file.
	pub watch_root_path: PathBuf,
	pub metadata: FileMetadata,
	pub indexed_at: DateTime<Utc>,
}

/// An indexed directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderRecord {
	pub path: PathBuf,
	pub parent_path: Option<PathBuf>,
	pub watch_root_path: PathBuf,
	pub modified_at: DateTime<Utc>,
	pub indexed_at: DateTime<Utc>,
}

/// Outcome of a batch upsert: how many records landed and which ones
/// failed. Per-item failures never fail the batch.
#[derive(Debug, Default)]
pub struct BatchWriteReport {
	pub written: u64,
	pub errors: Vec<(PathBuf, StoreError)>,
}

/// Durable storage for index entries and watch roots.
///
/// `add_watch_root` has upsert semantics so the engine can refresh counters
/// on an existing root record.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
	async fn upsert_file(&self, record: FileRecord) -> Result<(), StoreError>;

	async fn batch_upsert_files(
		&self,
		records: Vec<FileRecord>,
	) -> Result<BatchWriteReport, StoreError>;

	async fn upsert_folder(&self, record: FolderRecord) -> Result<(), StoreError>;

	/// Removes the entry at `path` and every descendant entry. Returns how
	/// many entries were removed.
	async fn remove_path(&self, path: &Path) -> Result<u64, StoreError>;

	async fn get_file(&self, path: &Path) -> Result<Option<FileRecord>, StoreError>;

	async fn all_watch_roots(&self) -> Result<Vec<WatchRootRecord>, StoreError>;

	async fn add_watch_root(&self, record: WatchRootRecord) -> Result<(), StoreError>;

	async fn remove_watch_root(&self, path: &Path) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_unbounded_depth_always_reaches() {
		let root = WatchRootRecord::new(PathBuf::from("/home/user"), None);

		assert!(root.reaches(Path::new("/home/user/a/b/c/d/e")));
		assert!(!root.reaches(Path::new("/home/other")));
	}

	#[test]
	fn test_bounded_depth() {
		let root = WatchRootRecord::new(PathBuf::from("/home/user"), Some(1));

		assert!(root.reaches(Path::new("/home/user")));
		assert!(root.reaches(Path::new("/home/user/docs")));
		assert!(!root.reaches(Path::new("/home/user/docs/taxes")));
	}
}
