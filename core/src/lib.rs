//! Sift core: the folder-indexing engine.
//!
//! The engine watches directory trees for filesystem changes, extracts
//! metadata incrementally, and keeps a record store consistent with the
//! live filesystem despite concurrent mutation, restarts, and resource
//! limits.
//!
//! Construction is explicit: build a [`store::RecordStore`] and a
//! [`metadata::MetadataExtractor`] once at startup and hand them to
//! [`indexer::IndexController`], which owns one watch session per watch
//! root.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sift_core::{
//! 	config::IndexerConfig,
//! 	indexer::IndexController,
//! 	metadata::FsMetadataExtractor,
//! 	store::MemoryRecordStore,
//! };
//!
//! # async fn run() -> sift_core::error::Result<()> {
//! let config = IndexerConfig::default();
//! let store = Arc::new(MemoryRecordStore::new());
//! let extractor = Arc::new(FsMetadataExtractor::new(&config));
//!
//! let controller = IndexController::new(store, extractor, &config);
//! controller.initialize().await?;
//! controller.add_watch_path("/home/user/Documents", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod indexer;
pub mod metadata;
pub mod store;

pub use config::IndexerConfig;
pub use error::{IndexerError, Result};
pub use indexer::{
	AggregateStatus, FileEventKind, IndexController, ProcessOutcome, ProcessResult,
	SessionState, SessionStatus, WatchSession,
};
pub use metadata::{
	EntrySnapshot, ExtractError, FileCategory, FileMetadata, FsMetadataExtractor,
	MetadataExtractor,
};
pub use store::{
	BatchWriteReport, FileRecord, FolderRecord, MemoryRecordStore, RecordStore, StoreError,
	WatchRootRecord,
};

// Re-export the rule types embedders need to customize path filtering
pub use sift_indexer_rules::{EntityKind, IndexerRule, IndexerRuler, RulePerKind};
