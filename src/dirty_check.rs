//! Dirty detection for module content.
//!
//! A module is clean when the checksum of its files matches the checksum
//! recorded in its marker at synchronization time. The marker itself and
//! files matching the module's ignore patterns do not contribute.

use crate::rim_info::{self, INFO_FILE_NAME};
use eyre::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Decides whether a module directory differs from its synchronized state.
pub trait DirtyPredicate {
    fn is_dirty(&self, module_dir: &Path) -> Result<bool>;
}

/// Compares module content against the checksum stored in `.riminfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumDirtyCheck;

impl DirtyPredicate for ChecksumDirtyCheck {
    fn is_dirty(&self, module_dir: &Path) -> Result<bool> {
        let metadata = rim_info::from_dir(module_dir)?;
        // never synchronized
        let Some(recorded) = metadata.checksum else {
            return Ok(true);
        };
        let actual = checksum(module_dir, &metadata.ignores)?;
        Ok(actual != recorded)
    }
}

/// Compute the content checksum of a module directory.
pub fn checksum(dir: &Path, ignores: &[String]) -> Result<String> {
    let ignore_set = build_ignore_set(ignores)?;
    let mut hasher = Sha256::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }

        let rel_path = relative_path(dir, entry.path())?;
        if rel_path == INFO_FILE_NAME || is_ignored(&ignore_set, &rel_path) {
            continue;
        }

        let content = if entry.file_type().is_symlink() {
            let target = fs::read_link(entry.path())
                .with_context(|| format!("Failed to read link {}", entry.path().display()))?;
            target.to_string_lossy().into_owned().into_bytes()
        } else {
            fs::read(entry.path()).with_context(|| format!("Failed to read {}", entry.path().display()))?
        };

        hasher.update(rel_path.as_bytes());
        hasher.update([0u8]);
        hasher.update((content.len() as u64).to_le_bytes());
        hasher.update(&content);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn build_ignore_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).with_context(|| format!("Invalid ignore pattern '{}'", pattern))?;
        builder.add(glob);
    }
    builder.build().context("Failed to build ignore patterns")
}

/// A file is ignored if it or one of its parent directories matches.
fn is_ignored(ignore_set: &GlobSet, rel_path: &str) -> bool {
    if ignore_set.is_empty() {
        return false;
    }
    let mut candidate = rel_path;
    loop {
        if ignore_set.is_match(candidate) {
            return true;
        }
        match candidate.rfind('/') {
            Some(idx) => candidate = &candidate[..idx],
            None => return false,
        }
    }
}

/// Path of `path` below `root` with `/` separators.
pub(crate) fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("{} is not below {}", path.display(), root.display()))?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
