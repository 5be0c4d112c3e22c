//! Entry processing
//!
//! Converts raw filesystem events into record-store mutations. The
//! processor deduplicates concurrent work through an in-flight set, skips
//! up-to-date entries through a processed-path cache and mtime comparison,
//! makes sure ancestor directories exist before their children, and batches
//! file writes for throughput.
//!
//! Every operation returns a structured [`ProcessResult`]; per-path
//! failures are outcomes, not errors, so one bad file never aborts a batch.

use std::{
	collections::{HashMap, HashSet},
	path::{Path, PathBuf},
	sync::{Arc, Mutex},
	time::Instant,
};

use chrono::Utc;
use sift_indexer_rules::EntityKind;
use tracing::{debug, error, warn};

use crate::config::{MAX_ANCESTOR_HOPS, WRITE_BUFFER_THRESHOLD};
use crate::metadata::{EntrySnapshot, MetadataExtractor};
use crate::store::{BatchWriteReport, FileRecord, FolderRecord, RecordStore, StoreError};

use super::resolver::WatchRootResolver;

/// How processing one path ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
	/// The entry was (re)indexed.
	Indexed(EntityKind),
	/// The stored entry already matches the filesystem.
	Unchanged,
	/// Another task is processing this path right now.
	AlreadyProcessing,
	/// The entry and its descendants were removed from the store.
	Removed(u64),
	/// Nothing to do for this path (no owning watch root, ancestor walk
	/// aborted, ...).
	Skipped(String),
	/// Stat or read failed; permissions or a race with deletion.
	NotAccessible(String),
	/// The metadata extractor failed for this entry.
	ExtractionFailed(String),
	/// The record store rejected the write.
	StoreWriteFailed(String),
}

/// Structured result of a single processor operation.
#[derive(Debug, Clone)]
pub struct ProcessResult {
	pub path: PathBuf,
	pub outcome: ProcessOutcome,
}

impl ProcessResult {
	fn new(path: impl Into<PathBuf>, outcome: ProcessOutcome) -> Self {
		Self {
			path: path.into(),
			outcome,
		}
	}

	/// Whether this result should be counted as a per-path failure.
	#[must_use]
	pub fn is_failure(&self) -> bool {
		matches!(
			self.outcome,
			ProcessOutcome::NotAccessible(_)
				| ProcessOutcome::ExtractionFailed(_)
				| ProcessOutcome::StoreWriteFailed(_)
		)
	}
}

/// Removes a path from the in-flight map on every exit path, success or
/// failure.
struct InFlightGuard<'a> {
	processing: &'a Mutex<HashMap<PathBuf, Instant>>,
	path: PathBuf,
}

impl Drop for InFlightGuard<'_> {
	fn drop(&mut self) {
		if let Ok(mut processing) = self.processing.lock() {
			processing.remove(&self.path);
		}
	}
}

pub struct EntryProcessor {
	store: Arc<dyn RecordStore>,
	extractor: Arc<dyn MetadataExtractor>,
	resolver: Arc<WatchRootResolver>,
	/// Paths currently being processed, for in-flight dedup.
	processing: Mutex<HashMap<PathBuf, Instant>>,
	/// Paths known to be up to date. Cleared when the owning session
	/// settles into steady-state watching, to bound memory.
	processed: Mutex<HashSet<PathBuf>>,
	/// Buffered file upserts awaiting a batch flush.
	pending_writes: Mutex<Vec<FileRecord>>,
	write_threshold: usize,
}

impl EntryProcessor {
	#[must_use]
	pub fn new(
		store: Arc<dyn RecordStore>,
		extractor: Arc<dyn MetadataExtractor>,
		resolver: Arc<WatchRootResolver>,
	) -> Self {
		Self {
			store,
			extractor,
			resolver,
			processing: Mutex::new(HashMap::new()),
			processed: Mutex::new(HashSet::new()),
			pending_writes: Mutex::new(Vec::new()),
			write_threshold: WRITE_BUFFER_THRESHOLD,
		}
	}

	/// Indexes one path, statting it first when no snapshot was provided.
	pub async fn process_path(
		&self,
		path: &Path,
		snapshot: Option<EntrySnapshot>,
	) -> ProcessResult {
		let _guard = {
			let mut processing = match self.processing.lock() {
				Ok(processing) => processing,
				Err(poisoned) => poisoned.into_inner(),
			};

			if processing.contains_key(path) {
				return ProcessResult::new(path, ProcessOutcome::AlreadyProcessing);
			}

			processing.insert(path.to_path_buf(), Instant::now());
			InFlightGuard {
				processing: &self.processing,
				path: path.to_path_buf(),
			}
		};

		let snapshot = match snapshot {
			Some(snapshot) => snapshot,
			None => match tokio::fs::symlink_metadata(path).await {
				Ok(metadata) => EntrySnapshot::from_fs_metadata(&metadata),
				Err(e) => {
					debug!(path = %path.display(), %e, "Unable to stat path");
					return ProcessResult::new(path, ProcessOutcome::NotAccessible(e.to_string()));
				}
			},
		};

		match snapshot.kind {
			EntityKind::Directory => self.process_directory(path, &snapshot).await,
			EntityKind::File => self.process_file(path, &snapshot).await,
		}
	}

	/// Removes one path (cascading to descendants) from the store.
	pub async fn remove_path(&self, path: &Path) -> ProcessResult {
		self.evict_processed_under(path);

		match self.store.remove_path(path).await {
			Ok(removed) => {
				debug!(path = %path.display(), removed, "Removed path from index");
				ProcessResult::new(path, ProcessOutcome::Removed(removed))
			}
			Err(e) => {
				error!(path = %path.display(), %e, "Failed to remove path from index");
				ProcessResult::new(path, ProcessOutcome::StoreWriteFailed(e.to_string()))
			}
		}
	}

	/// Submits all buffered file writes as one batch.
	pub async fn flush(&self) -> Result<BatchWriteReport, StoreError> {
		let pending = {
			let mut pending_writes = match self.pending_writes.lock() {
				Ok(pending_writes) => pending_writes,
				Err(poisoned) => poisoned.into_inner(),
			};
			std::mem::take(&mut *pending_writes)
		};

		if pending.is_empty() {
			return Ok(BatchWriteReport::default());
		}

		let report = self.store.batch_upsert_files(pending).await?;

		if !report.errors.is_empty() {
			warn!(
				written = report.written,
				failed = report.errors.len(),
				"Batch write finished with per-item errors",
			);
		}

		Ok(report)
	}

	/// Drops the processed-path cache. Called when the owning session
	/// settles into steady-state watching.
	pub fn clear_processed(&self) {
		match self.processed.lock() {
			Ok(mut processed) => processed.clear(),
			Err(poisoned) => poisoned.into_inner().clear(),
		}
	}

	pub fn pending_write_count(&self) -> usize {
		match self.pending_writes.lock() {
			Ok(pending_writes) => pending_writes.len(),
			Err(poisoned) => poisoned.into_inner().len(),
		}
	}

	async fn process_directory(&self, path: &Path, snapshot: &EntrySnapshot) -> ProcessResult {
		let root = match self.resolver.resolve(path).await {
			Ok(Some(root)) => root,
			Ok(None) => {
				debug!(path = %path.display(), "No owning watch root, skipping directory");
				return ProcessResult::new(
					path,
					ProcessOutcome::Skipped("no owning watch root".into()),
				);
			}
			Err(e) => {
				return ProcessResult::new(path, ProcessOutcome::StoreWriteFailed(e.to_string()))
			}
		};

		let record = FolderRecord {
			path: path.to_path_buf(),
			parent_path: path.parent().map(Path::to_path_buf),
			watch_root_path: root.path,
			modified_at: snapshot.modified_at(),
			indexed_at: Utc::now(),
		};

		if let Err(e) = self.store.upsert_folder(record).await {
			error!(path = %path.display(), %e, "Failed to upsert folder");
			return ProcessResult::new(path, ProcessOutcome::StoreWriteFailed(e.to_string()));
		}

		self.mark_processed(path);
		ProcessResult::new(path, ProcessOutcome::Indexed(EntityKind::Directory))
	}

	async fn process_file(&self, path: &Path, snapshot: &EntrySnapshot) -> ProcessResult {
		let root = match self.resolver.resolve(path).await {
			Ok(Some(root)) => root,
			Ok(None) => {
				debug!(path = %path.display(), "No owning watch root, skipping file");
				return ProcessResult::new(
					path,
					ProcessOutcome::Skipped("no owning watch root".into()),
				);
			}
			Err(e) => {
				return ProcessResult::new(path, ProcessOutcome::StoreWriteFailed(e.to_string()))
			}
		};

		// Fast path: a path we've already handled this session and whose
		// mtime still matches the store needs no work at all.
		if self.is_marked_processed(path) {
			if let Ok(Some(stored)) = self.store.get_file(path).await {
				if stored.metadata.modified_at == snapshot.modified_at() {
					return ProcessResult::new(path, ProcessOutcome::Unchanged);
				}
			}
		}

		if let Err(result) = self.index_ancestors(path, &root.path).await {
			return result;
		}

		// mtime equality with the stored record means up to date
		match self.store.get_file(path).await {
			Ok(Some(stored)) if stored.metadata.modified_at == snapshot.modified_at() => {
				self.mark_processed(path);
				return ProcessResult::new(path, ProcessOutcome::Unchanged);
			}
			Ok(_) => {}
			Err(e) => {
				warn!(path = %path.display(), %e, "Store read failed, reindexing entry");
			}
		}

		let metadata = match self.extractor.extract(path, snapshot).await {
			Ok(metadata) => metadata,
			Err(e) => {
				warn!(path = %path.display(), %e, "Metadata extraction failed, skipping entry");
				return ProcessResult::new(path, ProcessOutcome::ExtractionFailed(e.to_string()));
			}
		};

		let record = FileRecord {
			path: path.to_path_buf(),
			parent_path: path.parent().map(Path::to_path_buf),
			watch_root_path: root.path,
			metadata,
			indexed_at: Utc::now(),
		};

		self.buffer_write(record).await;
		self.mark_processed(path);

		ProcessResult::new(path, ProcessOutcome::Indexed(EntityKind::File))
	}

	/// Indexes every unprocessed ancestor between `path` and its watch
	/// root, parents before children, so the store never sees an orphaned
	/// child. The hop cap guards against symlink loops masquerading as
	/// endless ancestry.
	async fn index_ancestors(&self, path: &Path, root_path: &Path) -> Result<(), ProcessResult> {
		let mut unprocessed = Vec::new();
		let mut current = path.parent();
		let mut hops = 0;

		while let Some(ancestor) = current {
			if ancestor == root_path || !ancestor.starts_with(root_path) {
				break;
			}

			hops += 1;
			if hops > MAX_ANCESTOR_HOPS {
				error!(
					path = %path.display(),
					hops,
					"Ancestor walk exceeded hop limit, aborting",
				);
				return Err(ProcessResult::new(
					path,
					ProcessOutcome::Skipped("ancestor walk exceeded hop limit".into()),
				));
			}

			if !self.is_marked_processed(ancestor) {
				unprocessed.push(ancestor.to_path_buf());
			}

			current = ancestor.parent();
		}

		// Root-to-leaf so parents exist before children
		for ancestor in unprocessed.into_iter().rev() {
			match tokio::fs::symlink_metadata(&ancestor).await {
				Ok(metadata) => {
					let snapshot = EntrySnapshot::from_fs_metadata(&metadata);
					let result = self.process_directory(&ancestor, &snapshot).await;
					if result.is_failure() {
						warn!(
							ancestor = %ancestor.display(),
							outcome = ?result.outcome,
							"Failed to index ancestor directory",
						);
					}
				}
				Err(e) => {
					// The ancestor raced with a deletion; the child's own
					// write will fail or be removed in turn.
					debug!(ancestor = %ancestor.display(), %e, "Unable to stat ancestor");
				}
			}
		}

		Ok(())
	}

	async fn buffer_write(&self, record: FileRecord) {
		let should_flush = {
			let mut pending_writes = match self.pending_writes.lock() {
				Ok(pending_writes) => pending_writes,
				Err(poisoned) => poisoned.into_inner(),
			};
			pending_writes.push(record);
			pending_writes.len() >= self.write_threshold
		};

		if should_flush {
			if let Err(e) = self.flush().await {
				error!(%e, "Batch flush failed");
			}
		}
	}

	fn mark_processed(&self, path: &Path) {
		match self.processed.lock() {
			Ok(mut processed) => {
				processed.insert(path.to_path_buf());
			}
			Err(poisoned) => {
				poisoned.into_inner().insert(path.to_path_buf());
			}
		}
	}

	fn is_marked_processed(&self, path: &Path) -> bool {
		match self.processed.lock() {
			Ok(processed) => processed.contains(path),
			Err(poisoned) => poisoned.into_inner().contains(path),
		}
	}

	fn evict_processed_under(&self, path: &Path) {
		match self.processed.lock() {
			Ok(mut processed) => {
				processed.retain(|p| !(p == path || p.starts_with(path)));
			}
			Err(poisoned) => {
				poisoned
					.into_inner()
					.retain(|p| !(p == path || p.starts_with(path)));
			}
		}
	}
}
