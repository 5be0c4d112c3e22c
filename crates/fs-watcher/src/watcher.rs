//! The per-root watch handle

use std::path::{Path, PathBuf};

use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{error, trace, warn};

use crate::event::normalize;
use crate::{FsEvent, Result, WatcherError};

/// What a watch emits on its channel: either normalized events or a failure
/// of the watch subsystem itself.
#[derive(Debug)]
pub enum WatcherMessage {
	Events(Vec<FsEvent>),
	Error(WatcherError),
}

/// An OS-level recursive watch over a single root directory.
///
/// Construction allocates the backend and the event channel; events only
/// start flowing after [`FsWatcher::watch`] succeeds, which is also the
/// readiness point for consumers.
#[derive(Debug)]
pub struct FsWatcher {
	root: PathBuf,
	watcher: RecommendedWatcher,
	watching: bool,
}

impl FsWatcher {
	pub fn new(
		root: impl Into<PathBuf>,
	) -> Result<(Self, mpsc::UnboundedReceiver<WatcherMessage>)> {
		let root = root.into();
		let (events_tx, events_rx) = mpsc::unbounded_channel();

		let watcher = RecommendedWatcher::new(
			move |result: notify::Result<notify::Event>| {
				let message = match result {
					Ok(event) => {
						let events = normalize(event);
						if events.is_empty() {
							return;
						}
						WatcherMessage::Events(events)
					}
					Err(e) => WatcherMessage::Error(WatcherError::Subsystem(e.to_string())),
				};

				// The receiver half is dropped on session teardown; events
				// arriving after that are expected and ignorable.
				if events_tx.send(message).is_err() {
					trace!("Dropping filesystem event, receiver closed");
				}
			},
			Config::default(),
		)
		.map_err(WatcherError::CreateWatcher)?;

		Ok((
			Self {
				root,
				watcher,
				watching: false,
			},
			events_rx,
		))
	}

	#[must_use]
	pub fn root(&self) -> &Path {
		&self.root
	}

	#[must_use]
	pub fn is_watching(&self) -> bool {
		self.watching
	}

	/// Starts the recursive watch. Once this returns `Ok`, the backend is
	/// delivering events for the root.
	pub fn watch(&mut self) -> Result<()> {
		self.watcher
			.watch(&self.root, RecursiveMode::Recursive)
			.map_err(|source| {
				error!(root = %self.root.display(), %source, "Unable to watch root");
				WatcherError::Watch {
					path: self.root.clone(),
					source,
				}
			})?;

		self.watching = true;
		trace!(root = %self.root.display(), "Now watching root");
		Ok(())
	}

	/// Stops the watch. Events already in flight may still arrive on the
	/// channel afterwards.
	pub fn unwatch(&mut self) -> Result<()> {
		if !self.watching {
			return Ok(());
		}

		self.watching = false;
		self.watcher.unwatch(&self.root).map_err(|source| {
			// Removal of the watched directory itself surfaces here on some
			// platforms; the watch is already dead in that case.
			warn!(root = %self.root.display(), %source, "Unable to unwatch root");
			WatcherError::Unwatch {
				path: self.root.clone(),
				source,
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;
	use tempfile::tempdir;
	use tokio::time::sleep;

	async fn expect_event_for(
		events_rx: &mut mpsc::UnboundedReceiver<WatcherMessage>,
		path: &Path,
	) -> FsEvent {
		let mut tries = 0;
		loop {
			match events_rx.try_recv() {
				Ok(WatcherMessage::Events(events)) => {
					if let Some(event) = events.into_iter().find(|e| e.path == path) {
						return event;
					}
				}
				Ok(WatcherMessage::Error(e)) => panic!("watch failed: {e}"),
				Err(_) => {
					tries += 1;
					sleep(Duration::from_millis(100)).await;
				}
			}

			if tries == 100 {
				panic!("no event for {} after 10s", path.display());
			}
		}
	}

	#[tokio::test]
	async fn test_watch_emits_create_event() {
		let root = tempdir().unwrap();
		let (mut watcher, mut events_rx) = FsWatcher::new(root.path()).unwrap();
		watcher.watch().unwrap();

		let file_path = root.path().join("hello.txt");
		tokio::fs::write(&file_path, b"hello").await.unwrap();

		let event = expect_event_for(&mut events_rx, &file_path).await;
		assert!(event.is_create() || event.is_modify());

		watcher.unwatch().unwrap();
	}

	#[tokio::test]
	async fn test_unwatch_without_watch_is_noop() {
		let root = tempdir().unwrap();
		let (mut watcher, _events_rx) = FsWatcher::new(root.path()).unwrap();

		assert!(!watcher.is_watching());
		watcher.unwatch().unwrap();
	}

	#[tokio::test]
	async fn test_watch_missing_root_fails() {
		let root = tempdir().unwrap();
		let missing = root.path().join("does-not-exist");
		let (mut watcher, _events_rx) = FsWatcher::new(&missing).unwrap();

		let err = watcher.watch().unwrap_err();
		assert!(err.is_fatal());
	}
}
