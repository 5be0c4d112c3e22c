//! Shared runtime tuning knobs
//!
//! Sessions read these on every drain batch, the controller's adaptive
//! performance task rewrites the effective values, and manual setters write
//! the base values. Plain atomics so no reader ever blocks a writer.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::IndexerConfig;

/// Floor for the adaptive inter-batch delay when every session is merely
/// watching.
pub(crate) const MIN_PROCESSING_DELAY_MS: u64 = 2;

/// Floor for the adaptive batch size under contention.
pub(crate) const MIN_BATCH_SIZE: usize = 10;

#[derive(Debug)]
pub(crate) struct Tuning {
	base_batch_size: AtomicUsize,
	base_delay_ms: AtomicU64,
	effective_batch_size: AtomicUsize,
	effective_delay_ms: AtomicU64,
	debounce_window_ms: AtomicU64,
	enable_batching: AtomicBool,
	auto_performance: AtomicBool,
}

impl Tuning {
	pub(crate) fn new(config: &IndexerConfig) -> Self {
		Self {
			base_batch_size: AtomicUsize::new(config.batch_size),
			base_delay_ms: AtomicU64::new(config.processing_delay_ms),
			effective_batch_size: AtomicUsize::new(config.batch_size),
			effective_delay_ms: AtomicU64::new(config.processing_delay_ms),
			debounce_window_ms: AtomicU64::new(config.debounce_window_ms),
			enable_batching: AtomicBool::new(config.enable_batching),
			auto_performance: AtomicBool::new(config.auto_performance_mode),
		}
	}

	pub(crate) fn batch_size(&self) -> usize {
		self.effective_batch_size.load(Ordering::Relaxed)
	}

	pub(crate) fn processing_delay(&self) -> Duration {
		Duration::from_millis(self.effective_delay_ms.load(Ordering::Relaxed))
	}

	pub(crate) fn debounce_window(&self) -> Duration {
		Duration::from_millis(self.debounce_window_ms.load(Ordering::Relaxed))
	}

	pub(crate) fn batching_enabled(&self) -> bool {
		self.enable_batching.load(Ordering::Relaxed)
	}

	pub(crate) fn auto_performance(&self) -> bool {
		self.auto_performance.load(Ordering::Relaxed)
	}

	/// Manual override: takes effect immediately and becomes the base the
	/// adaptive task scales from.
	pub(crate) fn set_batch_size(&self, batch_size: usize) {
		let batch_size = batch_size.max(1);
		self.base_batch_size.store(batch_size, Ordering::Relaxed);
		self.effective_batch_size.store(batch_size, Ordering::Relaxed);
	}

	pub(crate) fn set_processing_delay_ms(&self, delay_ms: u64) {
		self.base_delay_ms.store(delay_ms, Ordering::Relaxed);
		self.effective_delay_ms.store(delay_ms, Ordering::Relaxed);
	}

	pub(crate) fn set_enable_batching(&self, enabled: bool) {
		self.enable_batching.store(enabled, Ordering::Relaxed);
	}

	pub(crate) fn set_auto_performance(&self, enabled: bool) {
		self.auto_performance.store(enabled, Ordering::Relaxed);
		if !enabled {
			// Drop back to the configured base values
			self.effective_batch_size
				.store(self.base_batch_size.load(Ordering::Relaxed), Ordering::Relaxed);
			self.effective_delay_ms
				.store(self.base_delay_ms.load(Ordering::Relaxed), Ordering::Relaxed);
		}
	}

	/// Recomputes the effective knobs for the given number of sessions
	/// currently scanning or indexing. More than one active session spreads
	/// the disk budget: the delay grows and the batch shrinks
	/// proportionally. With nothing active, the delay decays toward the
	/// responsiveness floor.
	pub(crate) fn retune(&self, actively_indexing: usize) {
		if !self.auto_performance() {
			return;
		}

		let base_batch = self.base_batch_size.load(Ordering::Relaxed);
		let base_delay = self.base_delay_ms.load(Ordering::Relaxed);

		if actively_indexing > 1 {
			let factor = actively_indexing as u64;
			self.effective_delay_ms
				.store(base_delay.saturating_mul(factor), Ordering::Relaxed);
			self.effective_batch_size.store(
				(base_batch / actively_indexing).max(MIN_BATCH_SIZE),
				Ordering::Relaxed,
			);
		} else if actively_indexing == 1 {
			self.effective_delay_ms.store(base_delay, Ordering::Relaxed);
			self.effective_batch_size.store(base_batch, Ordering::Relaxed);
		} else {
			self.effective_delay_ms
				.store(base_delay.min(MIN_PROCESSING_DELAY_MS), Ordering::Relaxed);
			self.effective_batch_size.store(base_batch, Ordering::Relaxed);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_retune_under_contention() {
		let tuning = Tuning::new(&IndexerConfig {
			batch_size: 50,
			processing_delay_ms: 10,
			..Default::default()
		});

		tuning.retune(3);

		assert_eq!(tuning.processing_delay(), Duration::from_millis(30));
		assert_eq!(tuning.batch_size(), 16);
	}

	#[test]
	fn test_retune_idle_decays_delay() {
		let tuning = Tuning::new(&IndexerConfig {
			processing_delay_ms: 10,
			..Default::default()
		});

		tuning.retune(0);

		assert_eq!(
			tuning.processing_delay(),
			Duration::from_millis(MIN_PROCESSING_DELAY_MS)
		);
	}

	#[test]
	fn test_manual_override_wins() {
		let tuning = Tuning::new(&IndexerConfig::default());

		tuning.set_auto_performance(false);
		tuning.set_batch_size(7);
		tuning.retune(4);

		assert_eq!(tuning.batch_size(), 7);
	}

	#[test]
	fn test_batch_size_floor() {
		let tuning = Tuning::new(&IndexerConfig {
			batch_size: 50,
			..Default::default()
		});

		tuning.retune(10);

		assert_eq!(tuning.batch_size(), MIN_BATCH_SIZE);
	}
}
