//! Owning-watch-root resolution
//!
//! Every entry belongs to the most specific (longest-prefix) watch root
//! containing it. The root list is cached; the cache is invalidated
//! explicitly whenever a root is added or removed, with a TTL kept as a
//! safety net against stores mutated behind the engine's back.

use std::{
	path::Path,
	sync::Arc,
	time::Instant,
};

use tokio::sync::RwLock;
use tracing::trace;

use crate::config::ROOT_CACHE_TTL;
use crate::store::{RecordStore, StoreError, WatchRootRecord};

struct CachedRoots {
	roots: Vec<WatchRootRecord>,
	fetched_at: Instant,
}

pub struct WatchRootResolver {
	store: Arc<dyn RecordStore>,
	cache: RwLock<Option<CachedRoots>>,
}

impl WatchRootResolver {
	#[must_use]
	pub fn new(store: Arc<dyn RecordStore>) -> Self {
		Self {
			store,
			cache: RwLock::new(None),
		}
	}

	/// The most specific watch root containing `path`, if any.
	pub async fn resolve(&self, path: &Path) -> Result<Option<WatchRootRecord>, StoreError> {
		let roots = self.roots().await?;

		Ok(roots
			.into_iter()
			.filter(|root| path.starts_with(&root.path))
			.max_by_key(|root| root.path.components().count()))
	}

	/// Drops the cached root list. Called synchronously on watch-root
	/// add/remove so resolution never attributes entries to a stale root.
	pub async fn invalidate(&self) {
		trace!("Invalidating watch-root resolution cache");
		*self.cache.write().await = None;
	}

	async fn roots(&self) -> Result<Vec<WatchRootRecord>, StoreError> {
		{
			let cache = self.cache.read().await;
			if let Some(cached) = cache.as_ref() {
				if cached.fetched_at.elapsed() < ROOT_CACHE_TTL {
					return Ok(cached.roots.clone());
				}
			}
		}

		let roots = self.store.all_watch_roots().await?;
		*self.cache.write().await = Some(CachedRoots {
			roots: roots.clone(),
			fetched_at: Instant::now(),
		});

		Ok(roots)
	}
}
