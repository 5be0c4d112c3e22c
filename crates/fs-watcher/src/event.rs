//! Normalized filesystem events

use std::path::PathBuf;
use std::time::SystemTime;

use notify::{
	event::{CreateKind, ModifyKind, RemoveKind, RenameMode},
	Event as NotifyEvent, EventKind,
};
use serde::{Deserialize, Serialize};

/// A normalized filesystem event for a single path (or path pair, for
/// renames).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsEvent {
	pub kind: FsEventKind,
	pub path: PathBuf,
	/// Whether the path is a directory, when the platform told us. `None`
	/// when the entry no longer exists and the backend didn't say.
	pub is_directory: Option<bool>,
	pub timestamp: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsEventKind {
	Create,
	Modify,
	Remove,
	Rename { from: PathBuf, to: PathBuf },
}

impl FsEvent {
	pub fn create(path: PathBuf) -> Self {
		Self::new(FsEventKind::Create, path)
	}

	pub fn modify(path: PathBuf) -> Self {
		Self::new(FsEventKind::Modify, path)
	}

	pub fn remove(path: PathBuf) -> Self {
		Self::new(FsEventKind::Remove, path)
	}

	pub fn rename(from: PathBuf, to: PathBuf) -> Self {
		Self {
			kind: FsEventKind::Rename {
				from,
				to: to.clone(),
			},
			path: to,
			is_directory: None,
			timestamp: SystemTime::now(),
		}
	}

	fn new(kind: FsEventKind, path: PathBuf) -> Self {
		Self {
			kind,
			path,
			is_directory: None,
			timestamp: SystemTime::now(),
		}
	}

	#[must_use]
	pub fn is_create(&self) -> bool {
		matches!(self.kind, FsEventKind::Create)
	}

	#[must_use]
	pub fn is_modify(&self) -> bool {
		matches!(self.kind, FsEventKind::Modify)
	}

	#[must_use]
	pub fn is_remove(&self) -> bool {
		matches!(self.kind, FsEventKind::Remove)
	}

	#[must_use]
	pub fn is_rename(&self) -> bool {
		matches!(self.kind, FsEventKind::Rename { .. })
	}
}

/// Normalizes a raw notify event into zero or more [`FsEvent`]s.
///
/// Access events carry no index-relevant information and are dropped.
/// Rename handling depends on what the backend reported:
/// - `RenameMode::Both` has both sides in `paths` and maps to one
///   [`FsEventKind::Rename`];
/// - `From`/`To` halves map to remove/create respectively, since the other
///   side may never arrive (moves in or out of the watched tree);
/// - `Any` is resolved by stat: existing path becomes a create, missing path
///   becomes a remove.
pub fn normalize(event: NotifyEvent) -> Vec<FsEvent> {
	match event.kind {
		EventKind::Access(_) => vec![],
		EventKind::Create(kind) => {
			let is_directory = match kind {
				CreateKind::Folder => Some(true),
				CreateKind::File => Some(false),
				_ => None,
			};
			event
				.paths
				.into_iter()
				.map(|path| FsEvent {
					is_directory,
					..FsEvent::create(path)
				})
				.collect()
		}
		EventKind::Remove(kind) => {
			let is_directory = match kind {
				RemoveKind::Folder => Some(true),
				RemoveKind::File => Some(false),
				_ => None,
			};
			event
				.paths
				.into_iter()
				.map(|path| FsEvent {
					is_directory,
					..FsEvent::remove(path)
				})
				.collect()
		}
		EventKind::Modify(ModifyKind::Name(mode)) => normalize_rename(mode, event.paths),
		EventKind::Modify(_) => event.paths.into_iter().map(FsEvent::modify).collect(),
		EventKind::Any | EventKind::Other => {
			event.paths.into_iter().map(FsEvent::modify).collect()
		}
	}
}

fn normalize_rename(mode: RenameMode, mut paths: Vec<PathBuf>) -> Vec<FsEvent> {
	match mode {
		RenameMode::Both if paths.len() >= 2 => {
			let to = paths.remove(1);
			let from = paths.remove(0);
			vec![FsEvent::rename(from, to)]
		}
		RenameMode::From => paths.into_iter().map(FsEvent::remove).collect(),
		RenameMode::To => paths.into_iter().map(FsEvent::create).collect(),
		// `Any` (and a malformed `Both`) gives us a single side with no
		// direction; the filesystem itself disambiguates.
		_ => paths
			.into_iter()
			.map(|path| {
				if path.exists() {
					FsEvent::create(path)
				} else {
					FsEvent::remove(path)
				}
			})
			.collect(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use notify::event::{CreateKind, DataChange, RemoveKind};

	fn notify_event(kind: EventKind, paths: Vec<PathBuf>) -> NotifyEvent {
		NotifyEvent {
			kind,
			paths,
			attrs: Default::default(),
		}
	}

	#[test]
	fn test_create_normalization() {
		let events = normalize(notify_event(
			EventKind::Create(CreateKind::File),
			vec![PathBuf::from("/watched/a.txt")],
		));

		assert_eq!(events.len(), 1);
		assert!(events[0].is_create());
		assert_eq!(events[0].path, PathBuf::from("/watched/a.txt"));
		assert_eq!(events[0].is_directory, Some(false));
	}

	#[test]
	fn test_folder_create_carries_directory_hint() {
		let events = normalize(notify_event(
			EventKind::Create(CreateKind::Folder),
			vec![PathBuf::from("/watched/inner")],
		));

		assert_eq!(events[0].is_directory, Some(true));
	}

	#[test]
	fn test_modify_normalization() {
		let events = normalize(notify_event(
			EventKind::Modify(ModifyKind::Data(DataChange::Content)),
			vec![PathBuf::from("/watched/a.txt")],
		));

		assert_eq!(events.len(), 1);
		assert!(events[0].is_modify());
	}

	#[test]
	fn test_access_events_dropped() {
		let events = normalize(notify_event(
			EventKind::Access(notify::event::AccessKind::Read),
			vec![PathBuf::from("/watched/a.txt")],
		));

		assert!(events.is_empty());
	}

	#[test]
	fn test_remove_normalization() {
		let events = normalize(notify_event(
			EventKind::Remove(RemoveKind::File),
			vec![PathBuf::from("/watched/gone.txt")],
		));

		assert_eq!(events.len(), 1);
		assert!(events[0].is_remove());
	}

	#[test]
	fn test_rename_both_sides() {
		let events = normalize(notify_event(
			EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
			vec![PathBuf::from("/watched/old.txt"), PathBuf::from("/watched/new.txt")],
		));

		assert_eq!(events.len(), 1);
		assert_eq!(
			events[0].kind,
			FsEventKind::Rename {
				from: PathBuf::from("/watched/old.txt"),
				to: PathBuf::from("/watched/new.txt"),
			}
		);
		assert_eq!(events[0].path, PathBuf::from("/watched/new.txt"));
	}

	#[test]
	fn test_rename_from_half_becomes_remove() {
		let events = normalize(notify_event(
			EventKind::Modify(ModifyKind::Name(RenameMode::From)),
			vec![PathBuf::from("/watched/old.txt")],
		));

		assert_eq!(events.len(), 1);
		assert!(events[0].is_remove());
	}

	#[test]
	fn test_rename_to_half_becomes_create() {
		let events = normalize(notify_event(
			EventKind::Modify(ModifyKind::Name(RenameMode::To)),
			vec![PathBuf::from("/watched/new.txt")],
		));

		assert_eq!(events.len(), 1);
		assert!(events[0].is_create());
	}
}
