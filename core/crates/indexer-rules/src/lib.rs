//! Indexer rules decide which paths the indexing engine touches at all.
//!
//! A rule is a named bundle of glob matchers, either rejecting matching paths
//! or restricting indexing to matching paths. Rules are compiled once into
//! [`globset::GlobSet`]s and are cheap enough to evaluate on every raw
//! filesystem event.

use std::{
	path::Path,
	sync::Arc,
};

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod system;

pub use system::system_rules;

/// Whether path matching should ignore case, decided by the platform's
/// conventional filesystem semantics.
pub const CASE_INSENSITIVE_FS: bool = cfg!(any(
	target_os = "windows",
	target_os = "macos",
	target_os = "ios"
));

#[derive(Error, Debug)]
pub enum IndexerRuleError {
	#[error("glob builder error: {0}")]
	Glob(#[from] globset::Error),
}

/// What kind of filesystem entity a path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
	File,
	Directory,
}

/// Classifies a path into an [`EntityKind`] given what the filesystem said
/// about it.
#[must_use]
pub fn classify(_path: &Path, is_directory: bool) -> EntityKind {
	if is_directory {
		EntityKind::Directory
	} else {
		EntityKind::File
	}
}

/// The kinds of rules the engine understands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum RuleKind {
	AcceptFilesByGlob,
	RejectFilesByGlob,
}

/// A single compiled rule: the source globs plus their pre-built matcher.
#[derive(Debug, Clone)]
pub enum RulePerKind {
	AcceptFilesByGlob(Vec<Glob>, GlobSet),
	RejectFilesByGlob(Vec<Glob>, GlobSet),
}

impl RulePerKind {
	fn new_files_by_globs_str_and_kind(
		globs_str: impl IntoIterator<Item = impl AsRef<str>>,
		kind_fn: impl Fn(Vec<Glob>, GlobSet) -> Self,
	) -> Result<Self, IndexerRuleError> {
		let globs = globs_str
			.into_iter()
			.map(|s| {
				GlobBuilder::new(s.as_ref())
					.case_insensitive(CASE_INSENSITIVE_FS)
					.build()
			})
			.collect::<Result<Vec<_>, _>>()?;

		let glob_set = globs
			.iter()
			.cloned()
			.fold(&mut GlobSetBuilder::new(), |builder, glob| {
				builder.add(glob)
			})
			.build()?;

		Ok(kind_fn(globs, glob_set))
	}

	pub fn new_accept_files_by_globs_str(
		globs_str: impl IntoIterator<Item = impl AsRef<str>>,
	) -> Result<Self, IndexerRuleError> {
		Self::new_files_by_globs_str_and_kind(globs_str, Self::AcceptFilesByGlob)
	}

	pub fn new_reject_files_by_globs_str(
		globs_str: impl IntoIterator<Item = impl AsRef<str>>,
	) -> Result<Self, IndexerRuleError> {
		Self::new_files_by_globs_str_and_kind(globs_str, Self::RejectFilesByGlob)
	}

	#[must_use]
	pub const fn kind(&self) -> RuleKind {
		match self {
			Self::AcceptFilesByGlob(..) => RuleKind::AcceptFilesByGlob,
			Self::RejectFilesByGlob(..) => RuleKind::RejectFilesByGlob,
		}
	}
}

/// A named bundle of rules.
#[derive(Debug, Clone)]
pub struct IndexerRule {
	pub name: String,
	/// Whether this rule ships with the engine as opposed to being
	/// user-supplied.
	pub default: bool,
	pub rules: Vec<RulePerKind>,
}

impl IndexerRule {
	#[must_use]
	pub fn new(name: impl Into<String>, default: bool, rules: Vec<RulePerKind>) -> Self {
		Self {
			name: name.into(),
			default,
			rules,
		}
	}
}

/// The outcome of evaluating a path against a ruler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulerDecision {
	Accept,
	Reject,
}

/// A set of [`IndexerRule`]s evaluated together.
///
/// Rejection always wins: a path matching any reject glob is ignored no
/// matter what. When at least one accept rule is present, paths must match
/// one of its globs to be indexed (rulers without accept rules accept
/// everything not rejected).
#[derive(Debug, Clone)]
pub struct IndexerRuler {
	rules: Arc<Vec<IndexerRule>>,
}

impl IndexerRuler {
	#[must_use]
	pub fn new(rules: Vec<IndexerRule>) -> Self {
		Self {
			rules: Arc::new(rules),
		}
	}

	/// A ruler combining these rules with the platform's system rules.
	#[must_use]
	pub fn with_system_rules(mut extra: Vec<IndexerRule>) -> Self {
		let mut rules = system_rules();
		rules.append(&mut extra);
		Self::new(rules)
	}

	#[must_use]
	pub fn evaluate(&self, path: impl AsRef<Path>) -> RulerDecision {
		let path = path.as_ref();

		let mut has_accept_rules = false;
		let mut accepted = false;

		for rule in self.rules.iter() {
			for per_kind in &rule.rules {
				match per_kind {
					RulePerKind::RejectFilesByGlob(_, glob_set) => {
						if glob_set.is_match(path) {
							return RulerDecision::Reject;
						}
					}
					RulePerKind::AcceptFilesByGlob(_, glob_set) => {
						has_accept_rules = true;
						accepted |= glob_set.is_match(path);
					}
				}
			}
		}

		if has_accept_rules && !accepted {
			RulerDecision::Reject
		} else {
			RulerDecision::Accept
		}
	}

	/// Whether the engine should skip this path entirely.
	#[must_use]
	pub fn is_ignored(&self, path: impl AsRef<Path>) -> bool {
		self.evaluate(path) == RulerDecision::Reject
	}
}

impl Default for IndexerRuler {
	fn default() -> Self {
		Self::new(system_rules())
	}
}
