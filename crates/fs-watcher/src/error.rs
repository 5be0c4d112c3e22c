use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatcherError>;

#[derive(Error, Debug)]
pub enum WatcherError {
	#[error("failed to create filesystem watcher: {0}")]
	CreateWatcher(notify::Error),
	#[error("failed to watch '{}': {source}", path.display())]
	Watch {
		path: PathBuf,
		source: notify::Error,
	},
	#[error("failed to unwatch '{}': {source}", path.display())]
	Unwatch {
		path: PathBuf,
		source: notify::Error,
	},
	#[error("watch subsystem failure: {0}")]
	Subsystem(String),
}

impl WatcherError {
	/// Whether the watch for this root is beyond recovery and the owner
	/// should stop relying on further events.
	#[must_use]
	pub fn is_fatal(&self) -> bool {
		match self {
			Self::CreateWatcher(_) | Self::Watch { .. } => true,
			Self::Unwatch { .. } => false,
			Self::Subsystem(_) => true,
		}
	}
}
