use std::path::PathBuf;

use thiserror::Error;

/// Failures the indexing engine can surface.
///
/// Per-path failures (`NotAccessible`, `ExtractionFailed`, a single
/// `StoreWriteFailed` item) are caught at the entry-processor boundary and
/// folded into statistics; they never abort a batch or a session. The
/// remaining variants are surfaced to callers of the controller.
#[derive(Error, Debug)]
pub enum IndexerError {
	#[error("path is not accessible '{}': {source}", path.display())]
	NotAccessible {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("metadata extraction failed for '{}': {message}", path.display())]
	ExtractionFailed { path: PathBuf, message: String },

	#[error("record store write failed: {0}")]
	StoreWriteFailed(String),

	#[error("watch subsystem failure: {0}")]
	WatchFailure(#[from] sift_fs_watcher::WatcherError),

	#[error(
		"watch path '{}' overlaps existing watch root '{}'",
		requested.display(),
		existing.display()
	)]
	OverlapRejected {
		requested: PathBuf,
		existing: PathBuf,
	},

	#[error("watch root '{}' is not a directory", .0.display())]
	NotADirectory(PathBuf),

	#[error("no watch root registered for '{}'", .0.display())]
	UnknownWatchRoot(PathBuf),
}

pub type Result<T> = std::result::Result<T, IndexerError>;
