//! Engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How many buffered file writes trigger a batch flush to the record store.
pub const WRITE_BUFFER_THRESHOLD: usize = 50;

/// Hard ceiling on a session's raw event queue before backpressure engages.
pub const QUEUE_OVERFLOW_CEILING: usize = 10_000;

/// Maximum ancestor hops when indexing parents before a file. Guards
/// against symlink loops below a watch root.
pub const MAX_ANCESTOR_HOPS: usize = 100;

/// TTL safety net for the watch-root resolution cache. The cache is
/// invalidated explicitly on root add/remove; the TTL only covers stores
/// mutated behind the engine's back.
pub const ROOT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Tunable knobs for indexing throughput and responsiveness.
///
/// Everything here can be changed at runtime through the controller; the
/// adaptive performance mode adjusts the effective batch size and delay on
/// top of these base values when several sessions index at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
	/// Entries pulled from the queue per drain batch.
	pub batch_size: usize,
	/// Sleep between drain batches, capping CPU/disk pressure.
	pub processing_delay_ms: u64,
	/// Debounce window for per-path event coalescing after the initial
	/// scan.
	pub debounce_window_ms: u64,
	/// Whether post-scan events are coalesced per path before processing.
	pub enable_batching: bool,
	/// Whether the controller may adjust batch size and delay based on how
	/// many sessions are actively indexing.
	pub auto_performance_mode: bool,
	/// Hash file content during metadata extraction. Off by default; sampled
	/// hashing keeps the cost bounded for large files.
	pub content_hashing: bool,
	/// Files at or below this size are hashed in full; larger files are
	/// sampled.
	pub full_hash_max_bytes: u64,
}

impl Default for IndexerConfig {
	fn default() -> Self {
		Self {
			batch_size: 50,
			processing_delay_ms: 10,
			debounce_window_ms: 250,
			enable_batching: true,
			auto_performance_mode: true,
			content_hashing: false,
			full_hash_max_bytes: 10 * 1024 * 1024,
		}
	}
}

impl IndexerConfig {
	#[must_use]
	pub fn debounce_window(&self) -> Duration {
		Duration::from_millis(self.debounce_window_ms)
	}

	#[must_use]
	pub fn processing_delay(&self) -> Duration {
		Duration::from_millis(self.processing_delay_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_are_sane() {
		let config = IndexerConfig::default();

		assert!(config.batch_size > 0);
		assert!(config.enable_batching);
		assert!(config.debounce_window() < Duration::from_secs(1));
	}

	#[test]
	fn test_serde_round_trip_fills_defaults() {
		let config: IndexerConfig = serde_json::from_str("{\"batch_size\": 10}").unwrap();

		assert_eq!(config.batch_size, 10);
		assert_eq!(
			config.processing_delay_ms,
			IndexerConfig::default().processing_delay_ms
		);
	}
}
