//! Per-session metrics

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

/// Counters published by a watch session. All relaxed atomics; readers get
/// a statistically consistent view, never a locked one.
#[derive(Debug, Default)]
pub struct SessionMetrics {
	/// Raw events received from the OS watch.
	pub events_received: AtomicU64,
	/// Events absorbed by per-path coalescing.
	pub events_coalesced: AtomicU64,
	/// Events dropped by the path rules.
	pub events_ignored: AtomicU64,
	/// Drain batches completed.
	pub batches_processed: AtomicU64,
	/// Times the raw queue crossed the overflow ceiling.
	pub overflow_episodes: AtomicU64,
	/// High-water mark of the raw queue.
	pub max_queue_depth: AtomicU64,
	/// Per-path failures (not accessible, extraction, store writes).
	pub errors: AtomicU64,
}

impl SessionMetrics {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record_event_received(&self) {
		self.events_received.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_event_coalesced(&self) {
		self.events_coalesced.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_event_ignored(&self) {
		self.events_ignored.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_batch_processed(&self) {
		self.batches_processed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_overflow_episode(&self) {
		self.overflow_episodes.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_error(&self) {
		self.errors.fetch_add(1, Ordering::Relaxed);
	}

	pub fn update_queue_depth(&self, depth: usize) {
		let depth = depth as u64;
		let mut current_max = self.max_queue_depth.load(Ordering::Relaxed);
		while depth > current_max {
			match self.max_queue_depth.compare_exchange_weak(
				current_max,
				depth,
				Ordering::Relaxed,
				Ordering::Relaxed,
			) {
				Ok(_) => break,
				Err(val) => current_max = val,
			}
		}
	}

	pub fn log_metrics(&self, root: &std::path::Path) {
		info!(
			root = %root.display(),
			events_received = self.events_received.load(Ordering::Relaxed),
			events_coalesced = self.events_coalesced.load(Ordering::Relaxed),
			events_ignored = self.events_ignored.load(Ordering::Relaxed),
			batches = self.batches_processed.load(Ordering::Relaxed),
			overflow_episodes = self.overflow_episodes.load(Ordering::Relaxed),
			max_queue_depth = self.max_queue_depth.load(Ordering::Relaxed),
			errors = self.errors.load(Ordering::Relaxed),
			"Session metrics",
		);
	}
}
