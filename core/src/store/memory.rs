//! In-memory record store
//!
//! Reference implementation of [`RecordStore`] backed by hash maps. Used by
//! the test suite and by embedders that don't need persistence across
//! restarts.

use std::{
	collections::HashMap,
	path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
	BatchWriteReport, FileRecord, FolderRecord, RecordStore, StoreError, WatchRootRecord,
};

#[derive(Default)]
struct StoreInner {
	files: HashMap<PathBuf, FileRecord>,
	folders: HashMap<PathBuf, FolderRecord>,
	roots: HashMap<PathBuf, WatchRootRecord>,
}

#[derive(Default)]
pub struct MemoryRecordStore {
	inner: RwLock<StoreInner>,
}

impl MemoryRecordStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of file records currently held.
	pub async fn file_count(&self) -> usize {
		self.inner.read().await.files.len()
	}

	/// Number of folder records currently held.
	pub async fn folder_count(&self) -> usize {
		self.inner.read().await.folders.len()
	}

	/// File and folder records owned by the given watch root.
	pub async fn entries_under_root(&self, root: &Path) -> usize {
		let inner = self.inner.read().await;

		inner
			.files
			.values()
			.filter(|f| f.watch_root_path == root)
			.count() + inner
			.folders
			.values()
			.filter(|f| f.watch_root_path == root)
			.count()
	}

	pub async fn contains_file(&self, path: &Path) -> bool {
		self.inner.read().await.files.contains_key(path)
	}

	pub async fn contains_folder(&self, path: &Path) -> bool {
		self.inner.read().await.folders.contains_key(path)
	}
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
	async fn upsert_file(&self, record: FileRecord) -> Result<(), StoreError> {
		self.inner
			.write()
			.await
			.files
			.insert(record.path.clone(), record);
		Ok(())
	}

	async fn batch_upsert_files(
		&self,
		records: Vec<FileRecord>,
	) -> Result<BatchWriteReport, StoreError> {
		let mut inner = self.inner.write().await;
		let mut report = BatchWriteReport::default();

		for record in records {
			inner.files.insert(record.path.clone(), record);
			report.written += 1;
		}

		Ok(report)
	}

	async fn upsert_folder(&self, record: FolderRecord) -> Result<(), StoreError> {
		self.inner
			.write()
			.await
			.folders
			.insert(record.path.clone(), record);
		Ok(())
	}

	async fn remove_path(&self, path: &Path) -> Result<u64, StoreError> {
		let mut inner = self.inner.write().await;
		let mut removed = 0;

		inner.files.retain(|entry_path, _| {
			let cascade = entry_path == path || entry_path.starts_with(path);
			if cascade {
				removed += 1;
			}
			!cascade
		});
		inner.folders.retain(|entry_path, _| {
			let cascade = entry_path == path || entry_path.starts_with(path);
			if cascade {
				removed += 1;
			}
			!cascade
		});

		Ok(removed)
	}

	async fn get_file(&self, path: &Path) -> Result<Option<FileRecord>, StoreError> {
		Ok(self.inner.read().await.files.get(path).cloned())
	}

	async fn all_watch_roots(&self) -> Result<Vec<WatchRootRecord>, StoreError> {
		Ok(self.inner.read().await.roots.values().cloned().collect())
	}

	async fn add_watch_root(&self, record: WatchRootRecord) -> Result<(), StoreError> {
		self.inner
			.write()
			.await
			.roots
			.insert(record.path.clone(), record);
		Ok(())
	}

	async fn remove_watch_root(&self, path: &Path) -> Result<(), StoreError> {
		self.inner.write().await.roots.remove(path);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::metadata::{FileCategory, FileMetadata};
	use chrono::Utc;

	fn file_record(path: &str, root: &str) -> FileRecord {
		FileRecord {
			path: PathBuf::from(path),
			parent_path: PathBuf::from(path).parent().map(Path::to_path_buf),
			watch_root_path: PathBuf::from(root),
			metadata: FileMetadata {
				size: 42,
				mime_type: None,
				category: FileCategory::Unknown,
				modified_at: Utc::now(),
				created_at: None,
				accessed_at: None,
				content_hash: None,
			},
			indexed_at: Utc::now(),
		}
	}

	#[tokio::test]
	async fn test_upsert_is_idempotent() {
		let store = MemoryRecordStore::new();

		store
			.upsert_file(file_record("/a/b.txt", "/a"))
			.await
			.unwrap();
		store
			.upsert_file(file_record("/a/b.txt", "/a"))
			.await
			.unwrap();

		assert_eq!(store.file_count().await, 1);
	}

	#[tokio::test]
	async fn test_remove_cascades_to_descendants() {
		let store = MemoryRecordStore::new();

		store
			.upsert_file(file_record("/a/sub/x.txt", "/a"))
			.await
			.unwrap();
		store
			.upsert_file(file_record("/a/sub/deep/y.txt", "/a"))
			.await
			.unwrap();
		store
			.upsert_file(file_record("/a/other.txt", "/a"))
			.await
			.unwrap();

		let removed = store.remove_path(Path::new("/a/sub")).await.unwrap();

		assert_eq!(removed, 2);
		assert_eq!(store.file_count().await, 1);
		assert!(store.contains_file(Path::new("/a/other.txt")).await);
	}

	#[tokio::test]
	async fn test_remove_does_not_match_sibling_prefixes() {
		let store = MemoryRecordStore::new();

		store
			.upsert_file(file_record("/a/subdir/x.txt", "/a"))
			.await
			.unwrap();

		// "/a/sub" is a string prefix of "/a/subdir" but not a path ancestor
		let removed = store.remove_path(Path::new("/a/sub")).await.unwrap();

		assert_eq!(removed, 0);
		assert_eq!(store.file_count().await, 1);
	}

	#[tokio::test]
	async fn test_batch_upsert_reports_written() {
		let store = MemoryRecordStore::new();

		let report = store
			.batch_upsert_files(vec![
				file_record("/a/1.txt", "/a"),
				file_record("/a/2.txt", "/a"),
			])
			.await
			.unwrap();

		assert_eq!(report.written, 2);
		assert!(report.errors.is_empty());
	}
}
