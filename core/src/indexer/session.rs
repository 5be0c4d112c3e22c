//! Watch sessions
//!
//! One session owns one watch root: it runs the OS-level recursive watch,
//! queues and coalesces raw events, drives the entry processor from a
//! single-flight drain loop, and publishes progress through atomics.
//!
//! State machine:
//!
//! ```text
//! Initializing -> Scanning -> Indexing -> Watching
//!       any non-terminal -> Paused -> Scanning (on resume)
//!       any -> Error (watch failure)   any -> Closed (cleanup)
//! ```

use std::{
	collections::{HashMap, VecDeque},
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicBool, AtomicU64, Ordering},
		Arc, Mutex, MutexGuard, PoisonError,
	},
	time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use sift_fs_watcher::{FsEvent, FsEventKind, FsWatcher, WatcherMessage};
use sift_indexer_rules::{EntityKind, IndexerRuler};
use tokio::{sync::mpsc, task::JoinHandle, time::interval};
use tracing::{debug, error, info, trace, warn};

use crate::config::QUEUE_OVERFLOW_CEILING;
use crate::error::{IndexerError, Result};
use crate::metadata::{EntrySnapshot, MetadataExtractor};
use crate::store::{RecordStore, WatchRootRecord};

use super::metrics::SessionMetrics;
use super::processor::{EntryProcessor, ProcessResult};
use super::resolver::WatchRootResolver;
use super::status::{progress_percent, SessionState, SessionStatus};
use super::tuning::Tuning;

/// How often the intake task promotes coalesced events whose debounce
/// window has elapsed.
const COALESCE_TICK: Duration = Duration::from_millis(100);

/// What happened to a filesystem entry, as seen by the session queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEventKind {
	Added,
	Changed,
	Removed,
}

/// One pending unit of work.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
	pub kind: FileEventKind,
	pub path: PathBuf,
	pub snapshot: Option<EntrySnapshot>,
	queued_at: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct WatchSession {
	root: WatchRootRecord,
	processor: EntryProcessor,
	ruler: IndexerRuler,
	tuning: Arc<Tuning>,
	metrics: SessionMetrics,

	state: Mutex<SessionState>,
	queue: Mutex<VecDeque<QueuedEvent>>,
	/// Latest pending event per path, awaiting its debounce window.
	coalesce: Mutex<HashMap<PathBuf, QueuedEvent>>,

	total_entries: AtomicU64,
	processed_entries: AtomicU64,

	paused: AtomicBool,
	shutdown: AtomicBool,
	overflowed: AtomicBool,
	initial_scan_complete: AtomicBool,
	/// Single-flight guard for the drain loop.
	draining: AtomicBool,

	watcher: tokio::sync::Mutex<Option<FsWatcher>>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WatchSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WatchSession")
			.field("root", &self.root)
			.finish_non_exhaustive()
	}
}

impl WatchSession {
	pub(crate) fn new(
		root: WatchRootRecord,
		store: Arc<dyn RecordStore>,
		extractor: Arc<dyn MetadataExtractor>,
		resolver: Arc<WatchRootResolver>,
		ruler: IndexerRuler,
		tuning: Arc<Tuning>,
	) -> Arc<Self> {
		Arc::new(Self {
			processor: EntryProcessor::new(store, extractor, resolver),
			root,
			ruler,
			tuning,
			metrics: SessionMetrics::new(),
			state: Mutex::new(SessionState::Initializing),
			queue: Mutex::new(VecDeque::new()),
			coalesce: Mutex::new(HashMap::new()),
			total_entries: AtomicU64::new(0),
			processed_entries: AtomicU64::new(0),
			paused: AtomicBool::new(false),
			shutdown: AtomicBool::new(false),
			overflowed: AtomicBool::new(false),
			initial_scan_complete: AtomicBool::new(false),
			draining: AtomicBool::new(false),
			watcher: tokio::sync::Mutex::new(None),
			tasks: Mutex::new(Vec::new()),
		})
	}

	#[must_use]
	pub fn root_path(&self) -> &Path {
		&self.root.path
	}

	#[must_use]
	pub fn state(&self) -> SessionState {
		*lock(&self.state)
	}

	#[must_use]
	pub fn is_overflowed(&self) -> bool {
		self.overflowed.load(Ordering::Relaxed)
	}

	#[must_use]
	pub fn metrics(&self) -> &SessionMetrics {
		&self.metrics
	}

	/// Starts the OS watch and the initial discovery scan.
	pub async fn initialize(self: &Arc<Self>) -> Result<()> {
		info!(root = %self.root.path.display(), "Initializing watch session");
		self.start_watch_and_scan().await
	}

	/// Accepts one raw event into the session. Ignored while paused. Events
	/// are coalesced per path once the initial scan has completed and
	/// batching is enabled; during the scan every event is queued
	/// immediately so progress isn't delayed by debounce windows.
	pub fn queue_event(
		self: &Arc<Self>,
		kind: FileEventKind,
		path: PathBuf,
		snapshot: Option<EntrySnapshot>,
	) {
		if self.paused.load(Ordering::Relaxed) || self.shutdown.load(Ordering::Relaxed) {
			return;
		}

		if self.ruler.is_ignored(&path) {
			self.metrics.record_event_ignored();
			return;
		}

		// Entries past the configured recursion depth are not part of this
		// root's index.
		if !self.root.reaches(&path) {
			self.metrics.record_event_ignored();
			return;
		}

		let event = QueuedEvent {
			kind,
			path,
			snapshot,
			queued_at: Instant::now(),
		};

		if self.tuning.batching_enabled() && self.initial_scan_complete.load(Ordering::Relaxed) {
			if lock(&self.coalesce)
				.insert(event.path.clone(), event)
				.is_some()
			{
				self.metrics.record_event_coalesced();
			}
			return;
		}

		self.push_events(std::iter::once(event));
		self.ensure_drain();
	}

	/// Transitions to `Paused`: closes the OS watch and stops scheduling
	/// new work. Queued events are kept.
	pub async fn pause(&self) {
		{
			let mut state = lock(&self.state);
			if state.is_terminal() || *state == SessionState::Paused {
				return;
			}
			*state = SessionState::Paused;
		}

		self.paused.store(true, Ordering::Relaxed);
		self.close_watch().await;
		self.stop_tasks();

		info!(root = %self.root.path.display(), "Watch session paused");
	}

	/// Leaves `Paused` (or `Error`, which never recovers on its own):
	/// counters reset, the OS watch reopens, and a fresh scan runs. Work
	/// queued before the pause is superseded by the rescan and dropped.
	pub async fn resume(self: &Arc<Self>) -> Result<()> {
		if !matches!(self.state(), SessionState::Paused | SessionState::Error) {
			return Ok(());
		}

		// An errored session may still have a half-alive watch and tasks
		self.close_watch().await;
		self.stop_tasks();

		lock(&self.queue).clear();
		lock(&self.coalesce).clear();
		self.processor.clear_processed();
		self.total_entries.store(0, Ordering::Relaxed);
		self.processed_entries.store(0, Ordering::Relaxed);
		self.overflowed.store(false, Ordering::Relaxed);
		self.initial_scan_complete.store(false, Ordering::Relaxed);
		self.paused.store(false, Ordering::Relaxed);

		info!(root = %self.root.path.display(), "Resuming watch session");
		self.start_watch_and_scan().await
	}

	/// Terminal teardown: flushes buffered writes, closes the watch, drops
	/// all queued work.
	pub async fn cleanup(&self) {
		if let Err(e) = self.processor.flush().await {
			error!(root = %self.root.path.display(), %e, "Final flush failed during cleanup");
		}

		self.shutdown.store(true, Ordering::Relaxed);
		self.paused.store(true, Ordering::Relaxed);
		self.close_watch().await;
		self.stop_tasks();

		lock(&self.queue).clear();
		lock(&self.coalesce).clear();

		*lock(&self.state) = SessionState::Closed;
		self.metrics.log_metrics(&self.root.path);
		info!(root = %self.root.path.display(), "Watch session closed");
	}

	#[must_use]
	pub fn status(&self) -> SessionStatus {
		let total = self.total_entries.load(Ordering::Relaxed);
		let processed = self.processed_entries.load(Ordering::Relaxed);
		let pending = lock(&self.queue).len() + lock(&self.coalesce).len();

		SessionStatus {
			path: self.root.path.clone(),
			total_entries: total,
			processed_entries: processed,
			state: self.state(),
			progress_percent: progress_percent(processed, total),
			is_paused: self.paused.load(Ordering::Relaxed),
			initial_scan_complete: self.initial_scan_complete.load(Ordering::Relaxed),
			depth: self.root.depth,
			pending_tasks: pending,
		}
	}

	async fn start_watch_and_scan(self: &Arc<Self>) -> Result<()> {
		let (mut watcher, events_rx) =
			FsWatcher::new(&self.root.path).map_err(|e| self.fail_with(e))?;
		watcher.watch().map_err(|e| self.fail_with(e))?;

		*self.watcher.lock().await = Some(watcher);
		*lock(&self.state) = SessionState::Scanning;

		self.spawn_intake(events_rx);

		let session = Arc::clone(self);
		let scan = tokio::spawn(async move { session.run_initial_scan().await });
		lock(&self.tasks).push(scan);

		Ok(())
	}

	fn fail_with(&self, e: sift_fs_watcher::WatcherError) -> IndexerError {
		error!(root = %self.root.path.display(), %e, "Watch subsystem failure");
		*lock(&self.state) = SessionState::Error;
		IndexerError::WatchFailure(e)
	}

	fn spawn_intake(self: &Arc<Self>, mut events_rx: mpsc::UnboundedReceiver<WatcherMessage>) {
		let session = Arc::clone(self);

		let handle = tokio::spawn(async move {
			let mut coalesce_tick = interval(COALESCE_TICK);

			loop {
				tokio::select! {
					message = events_rx.recv() => match message {
						Some(WatcherMessage::Events(events)) => session.ingest(events),
						Some(WatcherMessage::Error(e)) => {
							if e.is_fatal() {
								session.fail_with(e);
								break;
							}
							warn!(root = %session.root.path.display(), %e, "Non-fatal watch error");
						}
						None => {
							trace!(root = %session.root.path.display(), "Watch event channel closed");
							break;
						}
					},
					_ = coalesce_tick.tick() => session.promote_expired(),
				}
			}
		});

		lock(&self.tasks).push(handle);
	}

	fn ingest(self: &Arc<Self>, events: Vec<FsEvent>) {
		for event in events {
			self.metrics.record_event_received();

			match event.kind {
				FsEventKind::Create => {
					self.queue_event(FileEventKind::Added, event.path, None);
				}
				FsEventKind::Modify => {
					self.queue_event(FileEventKind::Changed, event.path, None);
				}
				FsEventKind::Remove => {
					self.queue_event(FileEventKind::Removed, event.path, None);
				}
				FsEventKind::Rename { from, to } => {
					// Rename keeps the index consistent as a remove of the
					// old path plus an add of the new one.
					self.queue_event(FileEventKind::Removed, from, None);
					self.queue_event(FileEventKind::Added, to, None);
				}
			}
		}
	}

	/// Moves events into the raw queue and engages backpressure at the
	/// ceiling: enqueuing never fails, but the coalesce map is flushed
	/// immediately so the session catches up instead of sitting on a
	/// debounce window.
	fn push_events(&self, events: impl IntoIterator<Item = QueuedEvent>) {
		let len = {
			let mut queue = lock(&self.queue);
			let before = queue.len();
			queue.extend(events);
			self.total_entries
				.fetch_add((queue.len() - before) as u64, Ordering::Relaxed);
			queue.len()
		};

		self.metrics.update_queue_depth(len);

		if len >= QUEUE_OVERFLOW_CEILING && !self.overflowed.swap(true, Ordering::Relaxed) {
			warn!(
				root = %self.root.path.display(),
				queue_depth = len,
				"Event queue overflow, flushing coalesced events to catch up",
			);
			self.metrics.record_overflow_episode();
			self.flush_coalesced();
		}
	}

	fn flush_coalesced(&self) {
		let pending: Vec<QueuedEvent> = lock(&self.coalesce).drain().map(|(_, e)| e).collect();
		if !pending.is_empty() {
			self.push_events(pending);
		}
	}

	/// Promotes coalesced events whose debounce window has elapsed into the
	/// processing queue.
	fn promote_expired(self: &Arc<Self>) {
		let window = self.tuning.debounce_window();

		let expired: Vec<QueuedEvent> = {
			let mut coalesce = lock(&self.coalesce);
			let expired_paths: Vec<PathBuf> = coalesce
				.iter()
				.filter(|(_, event)| event.queued_at.elapsed() >= window)
				.map(|(path, _)| path.clone())
				.collect();

			expired_paths
				.into_iter()
				.filter_map(|path| coalesce.remove(&path))
				.collect()
		};

		if !expired.is_empty() {
			self.push_events(expired);
			self.ensure_drain();
		}
	}

	/// Schedules the drain loop unless one is already running.
	fn ensure_drain(self: &Arc<Self>) {
		if self.paused.load(Ordering::Relaxed) || self.shutdown.load(Ordering::Relaxed) {
			return;
		}

		if self
			.draining
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_ok()
		{
			let session = Arc::clone(self);
			tokio::spawn(async move { session.drain_loop().await });
		}
	}

	async fn drain_loop(self: Arc<Self>) {
		loop {
			if self.paused.load(Ordering::Relaxed) || self.shutdown.load(Ordering::Relaxed) {
				break;
			}

			let batch_size = if self.tuning.batching_enabled()
				&& self.initial_scan_complete.load(Ordering::Relaxed)
			{
				self.tuning.batch_size().max(1)
			} else {
				1
			};

			let batch: Vec<QueuedEvent> = {
				let mut queue = lock(&self.queue);
				let take = batch_size.min(queue.len());
				queue.drain(..take).collect()
			};

			if batch.is_empty() {
				break;
			}

			// Removals first: cheaper, and it avoids reindexing a path that
			// was both changed and removed in the same batch.
			let (removals, upserts): (Vec<_>, Vec<_>) = batch
				.into_iter()
				.partition(|event| event.kind == FileEventKind::Removed);

			for event in removals {
				let result = self.processor.remove_path(&event.path).await;
				self.record_result(&result);
			}

			let results = futures::future::join_all(upserts.into_iter().map(|event| {
				let processor = &self.processor;
				async move { processor.process_path(&event.path, event.snapshot).await }
			}))
			.await;

			for result in &results {
				self.record_result(result);
			}

			if let Err(e) = self.processor.flush().await {
				error!(root = %self.root.path.display(), %e, "Batch flush failed");
				self.metrics.record_error();
			}

			self.metrics.record_batch_processed();
			self.release_backpressure_if_drained();

			tokio::time::sleep(self.tuning.processing_delay()).await;
		}

		self.draining.store(false, Ordering::Release);

		// Events that arrived while we were finishing need a fresh drain.
		let queue_empty = lock(&self.queue).is_empty();
		if !queue_empty {
			self.ensure_drain();
			return;
		}

		self.release_backpressure_if_drained();
		self.settle_into_watching();
	}

	fn record_result(&self, result: &ProcessResult) {
		self.processed_entries.fetch_add(1, Ordering::Relaxed);
		if result.is_failure() {
			self.metrics.record_error();
			trace!(
				path = %result.path.display(),
				outcome = ?result.outcome,
				"Entry failed to process",
			);
		}
	}

	fn release_backpressure_if_drained(&self) {
		if !self.overflowed.load(Ordering::Relaxed) {
			return;
		}

		let len = lock(&self.queue).len();
		if len < QUEUE_OVERFLOW_CEILING / 2 {
			self.overflowed.store(false, Ordering::Relaxed);
			debug!(
				root = %self.root.path.display(),
				queue_depth = len,
				"Backpressure released",
			);
		}
	}

	/// Once the scan is complete and the queue is dry, the session settles
	/// into steady-state watching and drops the processed-path cache to
	/// bound memory.
	fn settle_into_watching(&self) {
		if !self.initial_scan_complete.load(Ordering::Relaxed)
			|| self.paused.load(Ordering::Relaxed)
			|| self.shutdown.load(Ordering::Relaxed)
		{
			return;
		}

		let mut state = lock(&self.state);
		if matches!(*state, SessionState::Scanning | SessionState::Indexing) {
			*state = SessionState::Watching;
			drop(state);

			self.processor.clear_processed();
			debug!(root = %self.root.path.display(), "Session settled into watching");
		}
	}

	/// Discovery-driven initial scan: walks the tree breadth-first within
	/// the configured depth, queueing an add event per entry. Totals grow
	/// as discovery proceeds, so progress converges to 100 without a
	/// pre-count pass.
	async fn run_initial_scan(self: Arc<Self>) {
		let started = Instant::now();
		let mut dirs_to_walk = VecDeque::from([self.root.path.clone()]);

		while let Some(dir) = dirs_to_walk.pop_front() {
			if self.paused.load(Ordering::Relaxed) || self.shutdown.load(Ordering::Relaxed) {
				return;
			}

			let mut read_dir = match tokio::fs::read_dir(&dir).await {
				Ok(read_dir) => read_dir,
				Err(e) => {
					warn!(dir = %dir.display(), %e, "Unable to read directory during scan");
					self.metrics.record_error();
					continue;
				}
			};

			loop {
				match read_dir.next_entry().await {
					Ok(Some(entry)) => {
						let path = entry.path();

						if self.ruler.is_ignored(&path) {
							self.metrics.record_event_ignored();
							continue;
						}

						if !self.root.reaches(&path) {
							continue;
						}

						let snapshot = match entry.metadata().await {
							Ok(metadata) => EntrySnapshot::from_fs_metadata(&metadata),
							Err(e) => {
								debug!(path = %path.display(), %e, "Unable to stat entry during scan");
								self.metrics.record_error();
								continue;
							}
						};

						if snapshot.kind == EntityKind::Directory {
							dirs_to_walk.push_back(path.clone());
						}

						self.queue_event(FileEventKind::Added, path, Some(snapshot));
					}
					Ok(None) => break,
					Err(e) => {
						warn!(dir = %dir.display(), %e, "Directory iteration failed during scan");
						self.metrics.record_error();
						break;
					}
				}
			}
		}

		self.initial_scan_complete.store(true, Ordering::Relaxed);

		let queue_empty = lock(&self.queue).is_empty();
		{
			let mut state = lock(&self.state);
			if *state == SessionState::Scanning {
				*state = if queue_empty {
					SessionState::Watching
				} else {
					SessionState::Indexing
				};
			}
		}

		info!(
			root = %self.root.path.display(),
			discovered = self.total_entries.load(Ordering::Relaxed),
			elapsed_ms = started.elapsed().as_millis() as u64,
			"Initial scan complete",
		);

		self.ensure_drain();
	}

	async fn close_watch(&self) {
		if let Some(mut watcher) = self.watcher.lock().await.take() {
			if let Err(e) = watcher.unwatch() {
				warn!(root = %self.root.path.display(), %e, "Error closing watch");
			}
		}
	}

	fn stop_tasks(&self) {
		for handle in lock(&self.tasks).drain(..) {
			handle.abort();
		}
	}
}

impl Drop for WatchSession {
	fn drop(&mut self) {
		self.stop_tasks();
	}
}
