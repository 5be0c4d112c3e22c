//! Filesystem watching for Sift
//!
//! Wraps [`notify`] behind a small normalized surface: a watched root emits
//! [`FsEvent`]s over an async channel, and watch-subsystem failures arrive on
//! the same channel as typed errors instead of being silently dropped.
//!
//! Platform quirks handled here so consumers don't have to:
//! - access/open/close notifications are discarded;
//! - rename notifications that only carry one side are downgraded to
//!   remove/create events;
//! - two-path rename notifications are forwarded as a single
//!   [`FsEventKind::Rename`].

mod error;
mod event;
mod watcher;

pub use error::{Result, WatcherError};
pub use event::{FsEvent, FsEventKind};
pub use watcher::{FsWatcher, WatcherMessage};
