//! Revision graph access used by the status engine.
//!
//! The engine never talks to version control directly. Everything it needs
//! to know about revisions goes through [`RevisionGraph`]; `git::GitSession`
//! is the live implementation.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// How a file changed between two revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// One entry of a diff between two revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Path relative to the repository root, `/` separated
    pub path: String,
    pub kind: ChangeKind,
}

impl ChangedFile {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// True if the file lies below directory `dir`.
    pub fn is_under(&self, dir: &str) -> bool {
        self.path
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Temporary directory holding exported revision content.
///
/// The directory and everything in it is removed when the value is dropped,
/// on success and error paths alike.
#[derive(Debug)]
pub struct ExportDir {
    dir: TempDir,
}

impl ExportDir {
    /// Create an empty export area.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("rim-export-")
            .tempdir()
            .context("Failed to create export directory")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Location of an exported repository path.
    pub fn join(&self, rel_path: &str) -> PathBuf {
        self.dir.path().join(rel_path)
    }
}

/// Read access to the revision graph of a repository.
pub trait RevisionGraph {
    /// Resolve a reference to its canonical revision id.
    fn resolve(&self, rev: &str) -> Result<String>;

    /// Parent ids of a revision, primary parent first.
    fn parents(&self, rev: &str) -> Result<Vec<String>>;

    /// Files changed in `rev` compared to `against`.
    fn changed_files(&self, rev: &str, against: &str) -> Result<Vec<ChangedFile>>;

    /// All revisions reachable from `rev`, including itself.
    fn reachable(&self, rev: &str) -> Result<HashSet<String>>;

    /// Revisions reachable from `rev` but from no remote-tracking reference.
    fn reachable_non_remote(&self, rev: &str) -> Result<HashSet<String>>;

    /// Revisions reachable from `rev` but from no existing reference at all.
    fn reachable_unknown(&self, rev: &str) -> Result<HashSet<String>>;

    /// Export the given paths of `rev` into a fresh temporary directory,
    /// preserving their relative locations.
    fn export_subtrees(&self, rev: &str, paths: &[String]) -> Result<ExportDir>;

    /// Every file path in the tree of `rev`.
    fn list_tree_paths(&self, rev: &str) -> Result<Vec<String>>;
}
