//! Controller-level indexing tests
//!
//! Drives the engine through the public controller surface against the
//! in-memory store: initial scans, overlap validation, cascading removal,
//! pause/resume broadcast, and status aggregation.

use std::{path::Path, sync::Arc, time::Duration};

use sift_core::{
	config::IndexerConfig,
	indexer::{IndexController, SessionState},
	metadata::FsMetadataExtractor,
	store::MemoryRecordStore,
	IndexerError,
};
use tempfile::TempDir;
use tokio::time::sleep;

fn new_controller(store: Arc<MemoryRecordStore>) -> Arc<IndexController> {
	let config = IndexerConfig::default();
	let extractor = Arc::new(FsMetadataExtractor::new(&config));
	IndexController::new(store, extractor, &config)
}

async fn wait_for_session(
	controller: &Arc<IndexController>,
	root: &Path,
	check: impl Fn(&sift_core::SessionStatus) -> bool,
) {
	for _ in 0..200 {
		if let Ok(status) = controller.watcher_status(root).await {
			if check(&status) {
				return;
			}
		}
		sleep(Duration::from_millis(50)).await;
	}
	let status = controller.watcher_status(root).await;
	panic!("session never settled; last status: {status:?}");
}

#[tokio::test]
async fn test_watch_root_scan_reports_three_entries() {
	let root_dir = TempDir::new().unwrap();
	tokio::fs::write(root_dir.path().join("a.txt"), b"0123456789")
		.await
		.unwrap();
	let sub = root_dir.path().join("sub");
	tokio::fs::create_dir(&sub).await.unwrap();
	tokio::fs::write(sub.join("b.txt"), b"01234567890123456789")
		.await
		.unwrap();

	let store = Arc::new(MemoryRecordStore::new());
	let controller = new_controller(store.clone());
	controller.initialize().await.unwrap();

	let session = controller
		.add_watch_path(root_dir.path(), None)
		.await
		.unwrap();
	let root = session.root_path().to_path_buf();

	wait_for_session(&controller, &root, |status| {
		status.state == SessionState::Watching && status.processed_entries == 3
	})
	.await;

	let status = controller.watcher_status(&root).await.unwrap();
	assert_eq!(status.processed_entries, 3); // two files + the `sub` directory
	assert_eq!(status.progress_percent, 100);
	assert!(status.initial_scan_complete);
	assert!(!status.is_paused);

	assert_eq!(store.file_count().await, 2);
	assert_eq!(store.folder_count().await, 1);

	controller.cleanup().await;
}

#[tokio::test]
async fn test_overlapping_watch_path_is_rejected() {
	let root_dir = TempDir::new().unwrap();
	let sub = root_dir.path().join("docs");
	tokio::fs::create_dir(&sub).await.unwrap();
	let sibling_dir = TempDir::new().unwrap();

	let controller = new_controller(Arc::new(MemoryRecordStore::new()));
	controller.initialize().await.unwrap();

	let session = controller
		.add_watch_path(root_dir.path(), None)
		.await
		.unwrap();
	let root = session.root_path().to_path_buf();

	let err = controller.add_watch_path(&sub, None).await.unwrap_err();
	match err {
		IndexerError::OverlapRejected {
			requested,
			existing,
		} => {
			assert_eq!(existing, root);
			assert!(requested.ends_with("docs"));
		}
		other => panic!("expected OverlapRejected, got {other}"),
	}

	// an unrelated sibling is fine
	controller
		.add_watch_path(sibling_dir.path(), None)
		.await
		.unwrap();

	assert_eq!(controller.status().await.sessions.len(), 2);

	controller.cleanup().await;
}

#[tokio::test]
async fn test_removing_watch_root_cascades_only_its_entries() {
	let root_a = TempDir::new().unwrap();
	tokio::fs::write(root_a.path().join("a1.txt"), b"aaa")
		.await
		.unwrap();
	tokio::fs::write(root_a.path().join("a2.txt"), b"aaaa")
		.await
		.unwrap();

	let root_b = TempDir::new().unwrap();
	tokio::fs::write(root_b.path().join("b1.txt"), b"bbb")
		.await
		.unwrap();

	let store = Arc::new(MemoryRecordStore::new());
	let controller = new_controller(store.clone());
	controller.initialize().await.unwrap();

	let session_a = controller
		.add_watch_path(root_a.path(), None)
		.await
		.unwrap();
	let session_b = controller
		.add_watch_path(root_b.path(), None)
		.await
		.unwrap();
	let path_a = session_a.root_path().to_path_buf();
	let path_b = session_b.root_path().to_path_buf();

	// Watching is only entered after the final batch flush, so the store is
	// fully populated once both sessions settle.
	wait_for_session(&controller, &path_a, |s| {
		s.state == SessionState::Watching && s.processed_entries == 2
	})
	.await;
	wait_for_session(&controller, &path_b, |s| {
		s.state == SessionState::Watching && s.processed_entries == 1
	})
	.await;

	controller.remove_watch_path(&path_a).await.unwrap();

	assert_eq!(store.entries_under_root(&path_a).await, 0);
	assert_eq!(store.entries_under_root(&path_b).await, 1);
	assert!(controller.watcher_status(&path_a).await.is_err());

	controller.cleanup().await;
}

#[tokio::test]
async fn test_file_round_trip_leaves_no_records() {
	let root_dir = TempDir::new().unwrap();

	let store = Arc::new(MemoryRecordStore::new());
	let controller = new_controller(store.clone());
	controller.initialize().await.unwrap();

	let session = controller
		.add_watch_path(root_dir.path(), None)
		.await
		.unwrap();
	let root = session.root_path().to_path_buf();
	wait_for_session(&controller, &root, |s| s.state == SessionState::Watching).await;

	// written, indexed...
	let file_path = root.join("transient.txt");
	tokio::fs::write(&file_path, b"here and gone").await.unwrap();

	let mut tries = 0;
	while !store.contains_file(&file_path).await {
		tries += 1;
		assert!(tries < 100, "file was never indexed");
		sleep(Duration::from_millis(100)).await;
	}

	// ...then deleted, and the remove event processed
	tokio::fs::remove_file(&file_path).await.unwrap();

	let mut tries = 0;
	while store.contains_file(&file_path).await {
		tries += 1;
		assert!(tries < 100, "file record was never removed");
		sleep(Duration::from_millis(100)).await;
	}

	assert_eq!(store.file_count().await, 0);

	controller.cleanup().await;
}

#[tokio::test]
async fn test_pause_all_and_resume_all() {
	let root_dir = TempDir::new().unwrap();
	tokio::fs::write(root_dir.path().join("x.txt"), b"x")
		.await
		.unwrap();

	let controller = new_controller(Arc::new(MemoryRecordStore::new()));
	controller.initialize().await.unwrap();

	let session = controller
		.add_watch_path(root_dir.path(), None)
		.await
		.unwrap();
	let root = session.root_path().to_path_buf();
	wait_for_session(&controller, &root, |s| s.state == SessionState::Watching).await;

	controller.pause_all().await;

	let status = controller.status().await;
	assert!(status.is_paused);
	assert!(status.sessions.iter().all(|s| s.state == SessionState::Paused));

	controller.resume_all().await;

	let status = controller.status().await;
	assert!(!status.is_paused);
	wait_for_session(&controller, &root, |s| s.state == SessionState::Watching).await;

	controller.cleanup().await;
}

#[tokio::test]
async fn test_per_watcher_pause_and_resume() {
	let root_dir = TempDir::new().unwrap();

	let controller = new_controller(Arc::new(MemoryRecordStore::new()));
	controller.initialize().await.unwrap();

	let session = controller
		.add_watch_path(root_dir.path(), None)
		.await
		.unwrap();
	let root = session.root_path().to_path_buf();
	wait_for_session(&controller, &root, |s| s.state == SessionState::Watching).await;

	controller.pause_watcher(&root).await.unwrap();
	assert_eq!(
		controller.watcher_status(&root).await.unwrap().state,
		SessionState::Paused
	);

	controller.resume_watcher(&root).await.unwrap();
	wait_for_session(&controller, &root, |s| s.state == SessionState::Watching).await;

	// other sessions are unaffected by a per-watcher pause
	assert!(!controller.status().await.is_paused);

	controller.cleanup().await;
}

#[tokio::test]
async fn test_runtime_tuning_setters() {
	let root_dir = TempDir::new().unwrap();

	let controller = new_controller(Arc::new(MemoryRecordStore::new()));
	controller.initialize().await.unwrap();

	controller.set_batch_size(10);
	controller.set_processing_delay(25);
	controller.set_enable_batching(false);
	controller.set_auto_performance_mode(false);

	let session = controller
		.add_watch_path(root_dir.path(), None)
		.await
		.unwrap();
	let root = session.root_path().to_path_buf();
	wait_for_session(&controller, &root, |s| s.state == SessionState::Watching).await;

	controller.cleanup().await;
}

#[tokio::test]
async fn test_status_for_unknown_root_errors() {
	let controller = new_controller(Arc::new(MemoryRecordStore::new()));
	controller.initialize().await.unwrap();

	let err = controller
		.watcher_status("/definitely/not/watched")
		.await
		.unwrap_err();

	assert!(matches!(err, IndexerError::UnknownWatchRoot(_)));

	controller.cleanup().await;
}

#[tokio::test]
async fn test_initialize_restores_persisted_roots() {
	let root_dir = TempDir::new().unwrap();
	tokio::fs::write(root_dir.path().join("kept.txt"), b"kept")
		.await
		.unwrap();

	let store = Arc::new(MemoryRecordStore::new());

	// First controller registers the root...
	{
		let controller = new_controller(store.clone());
		controller.initialize().await.unwrap();
		controller
			.add_watch_path(root_dir.path(), None)
			.await
			.unwrap();
		controller.cleanup().await;
	}

	// ...a fresh controller over the same store picks it back up.
	let controller = new_controller(store.clone());
	controller.initialize().await.unwrap();

	let status = controller.status().await;
	assert_eq!(status.sessions.len(), 1);

	let root = status.sessions[0].path.clone();
	wait_for_session(&controller, &root, |s| s.state == SessionState::Watching).await;

	controller.cleanup().await;
}
