//! Metadata extraction
//!
//! Turns a path plus its stat information into the metadata record the
//! store persists. Extraction failures are non-fatal to callers: the entry
//! is skipped, counted, and processing continues.

use std::{
	io::SeekFrom,
	path::Path,
	time::SystemTime,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sift_indexer_rules::EntityKind;
use thiserror::Error;
use tokio::{
	fs::File,
	io::{AsyncReadExt, AsyncSeekExt},
};

use crate::config::IndexerConfig;

static SAMPLE_COUNT: u64 = 4;
static SAMPLE_SIZE: u64 = 10_000;

#[derive(Error, Debug)]
pub enum ExtractError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

/// Broad content category derived from the mime type and extension.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileCategory {
	Image,
	Video,
	Audio,
	Document,
	Text,
	#[default]
	Unknown,
}

impl FileCategory {
	/// Derives a category from a mime essence string like `"image/png"`.
	#[must_use]
	pub fn from_mime(mime: &str) -> Self {
		let (top, sub) = mime.split_once('/').unwrap_or((mime, ""));

		match top {
			"image" => Self::Image,
			"video" => Self::Video,
			"audio" => Self::Audio,
			"text" => Self::Text,
			"application" => match sub {
				"pdf" | "epub+zip" | "rtf" | "msword" | "vnd.ms-excel"
				| "vnd.ms-powerpoint" => Self::Document,
				sub if sub.starts_with("vnd.openxmlformats-officedocument")
					|| sub.starts_with("vnd.oasis.opendocument") =>
				{
					Self::Document
				}
				"json" | "xml" | "toml" | "x-yaml" | "javascript" => Self::Text,
				_ => Self::Unknown,
			},
			_ => Self::Unknown,
		}
	}
}

/// The metadata record produced for a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
	pub size: u64,
	pub mime_type: Option<String>,
	pub category: FileCategory,
	pub modified_at: DateTime<Utc>,
	pub created_at: Option<DateTime<Utc>>,
	pub accessed_at: Option<DateTime<Utc>>,
	pub content_hash: Option<String>,
}

/// Stat information captured once and handed through the pipeline so paths
/// aren't re-statted at every stage.
#[derive(Debug, Clone, Copy)]
pub struct EntrySnapshot {
	pub kind: EntityKind,
	pub size: u64,
	pub modified: Option<SystemTime>,
	pub created: Option<SystemTime>,
	pub accessed: Option<SystemTime>,
}

impl EntrySnapshot {
	#[must_use]
	pub fn from_fs_metadata(metadata: &std::fs::Metadata) -> Self {
		Self {
			kind: if metadata.is_dir() {
				EntityKind::Directory
			} else {
				EntityKind::File
			},
			size: metadata.len(),
			modified: metadata.modified().ok(),
			created: metadata.created().ok(),
			accessed: metadata.accessed().ok(),
		}
	}

	/// The modification timestamp as persisted, for change comparison
	/// against stored records.
	#[must_use]
	pub fn modified_at(&self) -> DateTime<Utc> {
		self.modified
			.map(DateTime::<Utc>::from)
			.unwrap_or_else(Utc::now)
	}
}

/// Produces a [`FileMetadata`] from a path and its stat snapshot.
#[async_trait]
pub trait MetadataExtractor: Send + Sync + 'static {
	async fn extract(
		&self,
		path: &Path,
		snapshot: &EntrySnapshot,
	) -> Result<FileMetadata, ExtractError>;
}

/// Default extractor backed by the local filesystem.
///
/// Mime type comes from the extension; content hashing is optional and
/// sampled for large files so extraction cost stays bounded.
pub struct FsMetadataExtractor {
	content_hashing: bool,
	full_hash_max_bytes: u64,
}

impl FsMetadataExtractor {
	#[must_use]
	pub fn new(config: &IndexerConfig) -> Self {
		Self {
			content_hashing: config.content_hashing,
			full_hash_max_bytes: config.full_hash_max_bytes,
		}
	}
}

#[async_trait]
impl MetadataExtractor for FsMetadataExtractor {
	async fn extract(
		&self,
		path: &Path,
		snapshot: &EntrySnapshot,
	) -> Result<FileMetadata, ExtractError> {
		let mime_type = mime_guess::from_path(path)
			.first()
			.map(|mime| mime.essence_str().to_owned());

		let category = mime_type
			.as_deref()
			.map(FileCategory::from_mime)
			.unwrap_or_default();

		let content_hash = if self.content_hashing && snapshot.kind == EntityKind::File {
			Some(sampled_content_hash(path, snapshot.size, self.full_hash_max_bytes).await?)
		} else {
			None
		};

		Ok(FileMetadata {
			size: snapshot.size,
			mime_type,
			category,
			modified_at: snapshot.modified_at(),
			created_at: snapshot.created.map(DateTime::<Utc>::from),
			accessed_at: snapshot.accessed.map(DateTime::<Utc>::from),
			content_hash,
		})
	}
}

async fn read_at(file: &mut File, offset: u64, size: u64) -> Result<Vec<u8>, std::io::Error> {
	let mut buf = vec![0u8; size as usize];

	file.seek(SeekFrom::Start(offset)).await?;
	file.read_exact(&mut buf).await?;

	Ok(buf)
}

/// Content hash seeded with the file size. Files up to `full_hash_max`
/// bytes are hashed in full; larger files contribute fixed-size samples
/// spread across the file plus the tail, which catches both in-place edits
/// and truncation.
pub async fn sampled_content_hash(
	path: &Path,
	size: u64,
	full_hash_max: u64,
) -> Result<String, std::io::Error> {
	let mut file = File::open(path).await?;
	let mut hasher = blake3::Hasher::new();

	hasher.update(&size.to_le_bytes());

	if size <= full_hash_max.max(SAMPLE_COUNT * SAMPLE_SIZE) {
		let buf = read_at(&mut file, 0, size).await?;
		hasher.update(&buf);
	} else {
		for i in 0..SAMPLE_COUNT {
			let buf = read_at(&mut file, (size / SAMPLE_COUNT) * i, SAMPLE_SIZE).await?;
			hasher.update(&buf);
		}
		// sample end of file
		let buf = read_at(&mut file, size - SAMPLE_SIZE, SAMPLE_SIZE).await?;
		hasher.update(&buf);
	}

	Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn test_category_from_mime() {
		assert_eq!(FileCategory::from_mime("image/png"), FileCategory::Image);
		assert_eq!(FileCategory::from_mime("video/mp4"), FileCategory::Video);
		assert_eq!(FileCategory::from_mime("audio/flac"), FileCategory::Audio);
		assert_eq!(FileCategory::from_mime("text/markdown"), FileCategory::Text);
		assert_eq!(
			FileCategory::from_mime("application/pdf"),
			FileCategory::Document
		);
		assert_eq!(
			FileCategory::from_mime(
				"application/vnd.openxmlformats-officedocument.wordprocessingml.document"
			),
			FileCategory::Document
		);
		assert_eq!(
			FileCategory::from_mime("application/octet-stream"),
			FileCategory::Unknown
		);
	}

	#[tokio::test]
	async fn test_extract_basic_metadata() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("photo.jpg");
		tokio::fs::write(&path, b"not really a jpeg").await.unwrap();

		let snapshot =
			EntrySnapshot::from_fs_metadata(&std::fs::metadata(&path).unwrap());
		let extractor = FsMetadataExtractor::new(&IndexerConfig::default());

		let metadata = extractor.extract(&path, &snapshot).await.unwrap();

		assert_eq!(metadata.size, 17);
		assert_eq!(metadata.mime_type.as_deref(), Some("image/jpeg"));
		assert_eq!(metadata.category, FileCategory::Image);
		assert!(metadata.content_hash.is_none());
	}

	#[tokio::test]
	async fn test_content_hash_is_stable() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("data.bin");
		tokio::fs::write(&path, vec![7u8; 4096]).await.unwrap();

		let first = sampled_content_hash(&path, 4096, 1024 * 1024)
			.await
			.unwrap();
		let second = sampled_content_hash(&path, 4096, 1024 * 1024)
			.await
			.unwrap();

		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn test_content_hash_tracks_content() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("data.bin");

		tokio::fs::write(&path, vec![7u8; 4096]).await.unwrap();
		let before = sampled_content_hash(&path, 4096, 1024 * 1024)
			.await
			.unwrap();

		tokio::fs::write(&path, vec![8u8; 4096]).await.unwrap();
		let after = sampled_content_hash(&path, 4096, 1024 * 1024)
			.await
			.unwrap();

		assert_ne!(before, after);
	}
}
