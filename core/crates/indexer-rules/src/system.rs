//! System rule set shipped with the engine.
//!
//! These are the rejection rules every watch root starts from: source
//! control internals, dependency caches, build output, OS noise, the
//! engine's own database files, and dot-entries. Per-OS globs follow the
//! community gitignore lists for each platform.

use crate::{IndexerRule, RulePerKind};

/// Expands bare directory/file names into globs matching the entry itself
/// and everything beneath it, so a rejected directory also rejects its
/// descendants.
fn reject_segments(names: &[&str]) -> Vec<String> {
	names
		.iter()
		.flat_map(|name| [format!("**/{name}"), format!("**/{name}/**")])
		.collect()
}

#[must_use]
#[allow(clippy::missing_panics_doc)]
pub fn no_vcs() -> IndexerRule {
	IndexerRule::new(
		"No version control",
		true,
		vec![RulePerKind::new_reject_files_by_globs_str(reject_segments(&[
			".git", ".svn", ".hg", ".bzr",
		]))
		.expect("this is hardcoded and should always work")],
	)
}

#[must_use]
#[allow(clippy::missing_panics_doc)]
pub fn no_dependency_caches() -> IndexerRule {
	IndexerRule::new(
		"No dependency caches",
		true,
		vec![RulePerKind::new_reject_files_by_globs_str(reject_segments(&[
			"node_modules",
			"target",
			"__pycache__",
			".venv",
			"venv",
			"vendor",
			".cargo",
			".gradle",
			".m2",
		]))
		.expect("this is hardcoded and should always work")],
	)
}

#[must_use]
#[allow(clippy::missing_panics_doc)]
pub fn no_build_output() -> IndexerRule {
	IndexerRule::new(
		"No build output",
		true,
		vec![RulePerKind::new_reject_files_by_globs_str(reject_segments(&[
			"build",
			"dist",
			"out",
			".next",
			".turbo",
			"DerivedData",
		]))
		.expect("this is hardcoded and should always work")],
	)
}

/// Rejects the engine's own database files so the index never indexes
/// itself.
#[must_use]
#[allow(clippy::missing_panics_doc)]
pub fn no_index_databases() -> IndexerRule {
	IndexerRule::new(
		"No index databases",
		true,
		vec![RulePerKind::new_reject_files_by_globs_str([
			"**/*.sift.db",
			"**/*.sift.db-journal",
			"**/*.sift.db-wal",
			"**/*.sift.db-shm",
			"**/.sift",
			"**/.sift/**",
		])
		.expect("this is hardcoded and should always work")],
	)
}

#[must_use]
#[allow(clippy::missing_panics_doc)]
pub fn no_os_protected() -> IndexerRule {
	IndexerRule::new(
		"No OS protected",
		true,
		vec![RulePerKind::new_reject_files_by_globs_str(
			[
				// Thumbnail caches travel across platforms on shares and
				// removable media, so these are rejected everywhere.
				vec![
					"**/{Thumbs.db,ehthumbs.db}",
					"**/.thumbnails",
					"**/.thumbnails/**",
				],
				// https://github.com/github/gitignore/blob/main/Global/Windows.gitignore
				// Globset, even on Windows, requires the use of / as a separator
				#[cfg(target_os = "windows")]
				vec![
					// Windows thumbnail cache files
					"**/{Thumbs.db,Thumbs.db:encryptable,ehthumbs.db,ehthumbs_vista.db}",
					// Folder config file
					"**/[Dd]esktop.ini",
					// Recycle Bin used on file shares
					"**/$RECYCLE.BIN",
					"**/$RECYCLE.BIN/**",
					// NTFS internal dir, can exist on any drive
					"[A-Z]:/System Volume Information",
					"[A-Z]:/System Volume Information/**",
					// System special folders
					"C:/{$Recycle.Bin,$WinREAgent,Recovery,PerfLogs,Windows,Windows.old}",
					"C:/{$Recycle.Bin,$WinREAgent,Recovery,PerfLogs,Windows,Windows.old}/**",
					// System special files
					"C:/{config,pagefile,hiberfil}.sys",
					"[A-Z]:/swapfile.sys",
				],
				// https://github.com/github/gitignore/blob/main/Global/macOS.gitignore
				#[cfg(any(target_os = "ios", target_os = "macos"))]
				vec![
					"**/.{DS_Store,AppleDouble,LSOverride}",
					// Thumbnails
					"**/._*",
					// Files that might appear in the root of a volume
					"**/.{DocumentRevisions-V100,fseventsd,Spotlight-V100,TemporaryItems,Trashes,VolumeIcon.icns,com.apple.timemachine.donotpresent}",
					// Directories potentially created on remote AFP share
					"**/.{AppleDB,AppleDesktop,apdisk}",
					"**/{Network Trash Folder,Temporary Items}",
				],
				// https://github.com/github/gitignore/blob/main/Global/Linux.gitignore
				#[cfg(target_os = "linux")]
				vec![
					"**/*~",
					// temporary files which can be created if a process still has a handle open of a deleted file
					"**/.fuse_hidden*",
					// KDE directory preferences
					"**/.directory",
					// Linux trash folder which might appear on any partition or disk
					"**/.Trash-*",
					"**/.Trash-*/**",
					// .nfs files are created when an open file is removed but is still being accessed
					"**/.nfs*",
				],
				// https://en.wikipedia.org/wiki/Filesystem_Hierarchy_Standard
				#[cfg(target_family = "unix")]
				vec![
					// Directories containing unix memory/device mapped files/dirs
					"/{dev,sys,proc}",
					"/{dev,sys,proc}/**",
					// Directories containing special files for current running programs
					"/{run,boot}",
					"/{run,boot}/**",
					// ext2-4 recovery directory
					"**/lost+found",
					"**/lost+found/**",
				],
			]
			.into_iter()
			.flatten(),
		)
		.expect("this is hardcoded and should always work")],
	)
}

#[must_use]
#[allow(clippy::missing_panics_doc)]
pub fn no_hidden() -> IndexerRule {
	IndexerRule::new(
		"No hidden",
		true,
		vec![RulePerKind::new_reject_files_by_globs_str(["**/.*", "**/.*/**"])
			.expect("this is hardcoded and should always work")],
	)
}

/// The full default rule set applied to every watch root.
#[must_use]
pub fn system_rules() -> Vec<IndexerRule> {
	vec![
		no_os_protected(),
		no_vcs(),
		no_dependency_caches(),
		no_build_output(),
		no_index_databases(),
		no_hidden(),
	]
}
