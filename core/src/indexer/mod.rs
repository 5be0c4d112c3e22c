//! The indexing engine
//!
//! An [`controller::IndexController`] owns one [`session::WatchSession`] per
//! watch root. Each session runs an OS-level recursive watch, queues and
//! coalesces raw events, and drives an [`processor::EntryProcessor`] that
//! turns events into record-store mutations.

pub mod controller;
pub mod metrics;
pub mod processor;
pub mod resolver;
pub mod session;
pub mod status;
pub(crate) mod tuning;

pub use controller::IndexController;
pub use processor::{EntryProcessor, ProcessOutcome, ProcessResult};
pub use resolver::WatchRootResolver;
pub use session::{FileEventKind, WatchSession};
pub use status::{AggregateStatus, SessionState, SessionStatus};
