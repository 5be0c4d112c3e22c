//! Watch a directory and print indexing progress.
//!
//! ```sh
//! cargo run -p sift-core --example watch -- /path/to/watch
//! ```

use std::{sync::Arc, time::Duration};

use sift_core::{
	config::IndexerConfig,
	indexer::IndexController,
	metadata::FsMetadataExtractor,
	store::MemoryRecordStore,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,sift_core=debug")),
		)
		.init();

	let path = std::env::args()
		.nth(1)
		.unwrap_or_else(|| ".".to_string());

	let config = IndexerConfig::default();
	let store = Arc::new(MemoryRecordStore::new());
	let extractor = Arc::new(FsMetadataExtractor::new(&config));

	let controller = IndexController::new(store.clone(), extractor, &config);
	controller.initialize().await?;
	controller.add_watch_path(&path, None).await?;

	println!("Watching {path} (ctrl-c to stop)");

	loop {
		tokio::time::sleep(Duration::from_secs(2)).await;

		let status = controller.status().await;
		for session in &status.sessions {
			println!(
				"{}: {} [{}%] {}/{} entries, {} pending",
				session.path.display(),
				session.state,
				session.progress_percent,
				session.processed_entries,
				session.total_entries,
				session.pending_tasks,
			);
		}
		println!(
			"store: {} files, {} folders",
			store.file_count().await,
			store.folder_count().await,
		);
	}
}
