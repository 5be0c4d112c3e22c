//! Session orchestration
//!
//! The controller owns every watch session: it validates and persists new
//! watch roots, broadcasts pause/resume, aggregates status, and runs the
//! adaptive performance task that spreads the disk budget when several
//! sessions index at once.

use std::{
	collections::HashMap,
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex, PoisonError,
	},
	time::Duration,
};

use normpath::PathExt;
use sift_indexer_rules::IndexerRuler;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{error, info, trace, warn};

use crate::config::IndexerConfig;
use crate::error::{IndexerError, Result};
use crate::metadata::MetadataExtractor;
use crate::store::{RecordStore, WatchRootRecord};

use super::resolver::WatchRootResolver;
use super::session::WatchSession;
use super::status::{AggregateStatus, SessionStatus};
use super::tuning::Tuning;

/// How often the adaptive performance task recomputes the effective batch
/// size and delay.
const RETUNE_INTERVAL: Duration = Duration::from_secs(5);

pub struct IndexController {
	store: Arc<dyn RecordStore>,
	extractor: Arc<dyn MetadataExtractor>,
	resolver: Arc<WatchRootResolver>,
	ruler: IndexerRuler,
	tuning: Arc<Tuning>,
	sessions: RwLock<HashMap<PathBuf, Arc<WatchSession>>>,
	paused_all: AtomicBool,
	retune_task: Mutex<Option<JoinHandle<()>>>,
}

impl IndexController {
	pub fn new(
		store: Arc<dyn RecordStore>,
		extractor: Arc<dyn MetadataExtractor>,
		config: &IndexerConfig,
	) -> Arc<Self> {
		Self::with_ruler(store, extractor, config, IndexerRuler::default())
	}

	/// A controller with extra path rules stacked on top of (or replacing)
	/// the system set.
	pub fn with_ruler(
		store: Arc<dyn RecordStore>,
		extractor: Arc<dyn MetadataExtractor>,
		config: &IndexerConfig,
		ruler: IndexerRuler,
	) -> Arc<Self> {
		let resolver = Arc::new(WatchRootResolver::new(store.clone()));

		Arc::new(Self {
			store,
			extractor,
			resolver,
			ruler,
			tuning: Arc::new(Tuning::new(config)),
			sessions: RwLock::new(HashMap::new()),
			paused_all: AtomicBool::new(false),
			retune_task: Mutex::new(None),
		})
	}

	/// Restores sessions for every persisted watch root and starts the
	/// adaptive performance task.
	pub async fn initialize(self: &Arc<Self>) -> Result<()> {
		let roots = self
			.store
			.all_watch_roots()
			.await
			.map_err(|e| IndexerError::StoreWriteFailed(e.to_string()))?;

		for record in roots {
			info!(root = %record.path.display(), "Restoring watch session");
			if let Err(e) = self.spawn_session(record).await {
				// One broken root shouldn't keep the rest offline
				error!(%e, "Failed to restore watch session");
			}
		}

		self.start_retune_task();
		Ok(())
	}

	/// Validates, persists, and starts watching a new root. Fails with
	/// [`IndexerError::OverlapRejected`] when the path is already covered
	/// by (or would swallow) an existing root.
	pub async fn add_watch_path(
		self: &Arc<Self>,
		path: impl AsRef<Path>,
		depth: Option<u32>,
	) -> Result<Arc<WatchSession>> {
		let path = canonicalize(path.as_ref())?;

		let metadata =
			tokio::fs::metadata(&path)
				.await
				.map_err(|source| IndexerError::NotAccessible {
					path: path.clone(),
					source,
				})?;
		if !metadata.is_dir() {
			return Err(IndexerError::NotADirectory(path));
		}

		let existing = self
			.store
			.all_watch_roots()
			.await
			.map_err(|e| IndexerError::StoreWriteFailed(e.to_string()))?;
		validate_no_overlap(&existing, &path, depth)?;

		let record = WatchRootRecord::new(path.clone(), depth);
		self.store
			.add_watch_root(record.clone())
			.await
			.map_err(|e| IndexerError::StoreWriteFailed(e.to_string()))?;
		self.resolver.invalidate().await;

		info!(root = %path.display(), ?depth, "Watch root added");

		match self.spawn_session(record).await {
			Ok(session) => Ok(session),
			Err(e) => {
				// Roll the root record back so a failed watch can be retried
				if let Err(remove_err) = self.store.remove_watch_root(&path).await {
					warn!(%remove_err, "Failed to roll back watch root after watch failure");
				}
				self.resolver.invalidate().await;
				Err(e)
			}
		}
	}

	/// Stops the session, removes the watch root, and cascades entry
	/// deletion for everything under it.
	pub async fn remove_watch_path(&self, path: impl AsRef<Path>) -> Result<()> {
		let path = normalize_lossy(path.as_ref());

		let session = self
			.sessions
			.write()
			.await
			.remove(&path)
			.ok_or_else(|| IndexerError::UnknownWatchRoot(path.clone()))?;

		session.cleanup().await;

		self.store
			.remove_watch_root(&path)
			.await
			.map_err(|e| IndexerError::StoreWriteFailed(e.to_string()))?;
		let removed = self
			.store
			.remove_path(&path)
			.await
			.map_err(|e| IndexerError::StoreWriteFailed(e.to_string()))?;
		self.resolver.invalidate().await;

		info!(root = %path.display(), removed, "Watch root removed");
		Ok(())
	}

	pub async fn pause_watcher(&self, path: impl AsRef<Path>) -> Result<()> {
		self.session_for(path.as_ref()).await?.pause().await;
		Ok(())
	}

	pub async fn resume_watcher(&self, path: impl AsRef<Path>) -> Result<()> {
		self.session_for(path.as_ref()).await?.resume().await
	}

	pub async fn pause_all(&self) {
		self.paused_all.store(true, Ordering::Relaxed);

		let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
		for session in sessions {
			session.pause().await;
		}

		info!("All watch sessions paused");
	}

	pub async fn resume_all(&self) {
		self.paused_all.store(false, Ordering::Relaxed);

		let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
		for session in sessions {
			if let Err(e) = session.resume().await {
				error!(root = %session.root_path().display(), %e, "Failed to resume session");
			}
		}

		info!("All watch sessions resumed");
	}

	pub async fn status(&self) -> AggregateStatus {
		let sessions: Vec<SessionStatus> = self
			.sessions
			.read()
			.await
			.values()
			.map(|session| session.status())
			.collect();

		AggregateStatus {
			total_entries: sessions.iter().map(|s| s.total_entries).sum(),
			processed_entries: sessions.iter().map(|s| s.processed_entries).sum(),
			is_paused: self.paused_all.load(Ordering::Relaxed),
			sessions,
		}
	}

	pub async fn watcher_status(&self, path: impl AsRef<Path>) -> Result<SessionStatus> {
		Ok(self.session_for(path.as_ref()).await?.status())
	}

	pub fn set_processing_delay(&self, delay_ms: u64) {
		self.tuning.set_processing_delay_ms(delay_ms);
	}

	pub fn set_batch_size(&self, batch_size: usize) {
		self.tuning.set_batch_size(batch_size);
	}

	pub fn set_enable_batching(&self, enabled: bool) {
		self.tuning.set_enable_batching(enabled);
	}

	pub fn set_auto_performance_mode(&self, enabled: bool) {
		self.tuning.set_auto_performance(enabled);
	}

	/// Tears down every session. The controller is done after this.
	pub async fn cleanup(&self) {
		if let Some(handle) = lock_recover(&self.retune_task).take() {
			handle.abort();
		}

		let sessions: Vec<_> = {
			let mut map = self.sessions.write().await;
			map.drain().map(|(_, session)| session).collect()
		};

		for session in sessions {
			session.cleanup().await;
		}

		info!("Index controller cleaned up");
	}

	async fn spawn_session(
		self: &Arc<Self>,
		record: WatchRootRecord,
	) -> Result<Arc<WatchSession>> {
		let session = WatchSession::new(
			record,
			self.store.clone(),
			self.extractor.clone(),
			self.resolver.clone(),
			self.ruler.clone(),
			self.tuning.clone(),
		);

		session.initialize().await?;

		self.sessions
			.write()
			.await
			.insert(session.root_path().to_path_buf(), session.clone());

		Ok(session)
	}

	async fn session_for(&self, path: &Path) -> Result<Arc<WatchSession>> {
		let path = normalize_lossy(path);

		self.sessions
			.read()
			.await
			.get(&path)
			.cloned()
			.ok_or(IndexerError::UnknownWatchRoot(path))
	}

	fn start_retune_task(self: &Arc<Self>) {
		let controller = Arc::downgrade(self);

		let handle = tokio::spawn(async move {
			let mut tick = tokio::time::interval(RETUNE_INTERVAL);
			tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

			loop {
				tick.tick().await;

				let Some(controller) = controller.upgrade() else {
					break;
				};

				let actively_indexing = controller
					.sessions
					.read()
					.await
					.values()
					.filter(|session| session.state().is_actively_indexing())
					.count();

				controller.tuning.retune(actively_indexing);
				trace!(actively_indexing, "Adaptive performance retune");
			}
		});

		*lock_recover(&self.retune_task) = Some(handle);
	}
}

fn lock_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Platform-normalized absolute form of `path`, used for every comparison
/// and as the session map key.
fn canonicalize(path: &Path) -> Result<PathBuf> {
	path.normalize()
		.map(|normalized| normalized.into_path_buf())
		.map_err(|source| IndexerError::NotAccessible {
			path: path.to_path_buf(),
			source,
		})
}

/// Like [`canonicalize`], but falls back to the path as given when it no
/// longer exists on disk (a watch root can be removed after its directory
/// was deleted).
fn normalize_lossy(path: &Path) -> PathBuf {
	path.normalize()
		.map(|normalized| normalized.into_path_buf())
		.unwrap_or_else(|_| path.to_path_buf())
}

/// Rejects a new watch root that an existing root already covers, or that
/// would swallow an existing root. Depth is the number of path segments
/// between the two roots; unbounded depth always reaches.
fn validate_no_overlap(
	existing: &[WatchRootRecord],
	path: &Path,
	depth: Option<u32>,
) -> Result<()> {
	for root in existing {
		let conflict = if root.path == path {
			true
		} else if path.starts_with(&root.path) {
			// the existing root is an ancestor: does its depth reach us?
			root.reaches(path)
		} else if root.path.starts_with(path) {
			// we'd be an ancestor: would our depth reach the existing root?
			match depth {
				None => true,
				Some(depth) => {
					let Ok(relative) = root.path.strip_prefix(path) else {
						continue;
					};
					relative.components().count() <= depth as usize
				}
			}
		} else {
			false
		};

		if conflict {
			return Err(IndexerError::OverlapRejected {
				requested: path.to_path_buf(),
				existing: root.path.clone(),
			});
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn root(path: &str, depth: Option<u32>) -> WatchRootRecord {
		WatchRootRecord::new(PathBuf::from(path), depth)
	}

	#[test]
	fn test_overlap_rejects_descendant_of_unbounded_root() {
		let existing = vec![root("/home/user", None)];

		let err =
			validate_no_overlap(&existing, Path::new("/home/user/docs"), None).unwrap_err();

		match err {
			IndexerError::OverlapRejected { existing, .. } => {
				assert_eq!(existing, PathBuf::from("/home/user"));
			}
			other => panic!("expected OverlapRejected, got {other}"),
		}
	}

	#[test]
	fn test_overlap_allows_sibling() {
		let existing = vec![root("/home/user", None)];

		assert!(validate_no_overlap(&existing, Path::new("/home/other"), None).is_ok());
	}

	#[test]
	fn test_overlap_allows_deep_descendant_of_bounded_root() {
		// depth 1 covers /data/x but not /data/x/y
		let existing = vec![root("/data", Some(1))];

		assert!(validate_no_overlap(&existing, Path::new("/data/x/y"), None).is_ok());
		assert!(validate_no_overlap(&existing, Path::new("/data/x"), None).is_err());
	}

	#[test]
	fn test_overlap_rejects_swallowing_existing_root() {
		let existing = vec![root("/data/projects", None)];

		assert!(validate_no_overlap(&existing, Path::new("/data"), None).is_err());
		// bounded depth that stops short of the existing root is fine
		assert!(validate_no_overlap(&existing, Path::new("/"), Some(0)).is_ok());
	}

	#[test]
	fn test_overlap_rejects_same_path() {
		let existing = vec![root("/data", Some(2))];

		assert!(validate_no_overlap(&existing, Path::new("/data"), Some(5)).is_err());
	}
}
