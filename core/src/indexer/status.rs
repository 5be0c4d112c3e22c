//! Status payloads exposed to callers

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a watch session.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
	Initializing,
	Scanning,
	Indexing,
	Watching,
	Paused,
	Error,
	Closed,
}

impl SessionState {
	/// Whether the session is doing heavy work (initial scan or queue
	/// drain), as opposed to idling on the OS watch.
	#[must_use]
	pub fn is_actively_indexing(&self) -> bool {
		matches!(self, Self::Scanning | Self::Indexing)
	}

	#[must_use]
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Closed)
	}
}

/// Point-in-time status of one watch session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
	pub path: PathBuf,
	pub total_entries: u64,
	pub processed_entries: u64,
	pub state: SessionState,
	pub progress_percent: u8,
	pub is_paused: bool,
	pub initial_scan_complete: bool,
	pub depth: Option<u32>,
	/// Queued plus coalesced-but-not-yet-queued events.
	pub pending_tasks: usize,
}

/// Controller-level status across every session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateStatus {
	pub total_entries: u64,
	pub processed_entries: u64,
	pub is_paused: bool,
	pub sessions: Vec<SessionStatus>,
}

/// `min(100, round(processed / total * 100))`, `0` when nothing has been
/// discovered yet.
#[must_use]
pub fn progress_percent(processed: u64, total: u64) -> u8 {
	if total == 0 {
		return 0;
	}

	(((processed as f64 / total as f64) * 100.0).round() as u64).min(100) as u8
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_progress_percent_bounds() {
		assert_eq!(progress_percent(0, 0), 0);
		assert_eq!(progress_percent(0, 10), 0);
		assert_eq!(progress_percent(5, 10), 50);
		assert_eq!(progress_percent(10, 10), 100);
		// processed can transiently exceed discovered totals
		assert_eq!(progress_percent(15, 10), 100);
	}

	#[test]
	fn test_progress_percent_rounds() {
		assert_eq!(progress_percent(1, 3), 33);
		assert_eq!(progress_percent(2, 3), 67);
	}

	#[test]
	fn test_state_serializes_lowercase() {
		assert_eq!(
			serde_json::to_string(&SessionState::Watching).unwrap(),
			"\"watching\""
		);
		assert_eq!(SessionState::Error.to_string(), "error");
	}

	#[test]
	fn test_actively_indexing() {
		assert!(SessionState::Scanning.is_actively_indexing());
		assert!(SessionState::Indexing.is_actively_indexing());
		assert!(!SessionState::Watching.is_actively_indexing());
		assert!(!SessionState::Paused.is_actively_indexing());
	}
}
