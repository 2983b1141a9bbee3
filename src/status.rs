//! Module status computation over revision history.
//!
//! The history walk checks a module only when a revision touches files
//! inside it. Every other module inherits its status from the primary
//! parent, so only the boundary revisions need a full check. For this to
//! work the graph is processed from older to newer revisions, with one
//! cache per call so that merged branches share their common ancestors.

use crate::dirty_check::{DirtyPredicate, relative_path};
use crate::graph::{ChangeKind, ChangedFile, RevisionGraph};
use crate::rim_info::MetadataProvider;
use crate::types::{ModuleStatus, RevStatus};
use eyre::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

/// Operation that failed while computing a status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    ResolveRef { rev: String },
    ListParents { rev: String },
    ChangedFiles { rev: String, against: String },
    Reachable { rev: String },
    ListTree { rev: String },
    Export { rev: String },
    ParseMetadata { dir: String },
    DirtyCheck { dir: String },
    ScanWorkingCopy { dir: String },
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusError::ResolveRef { rev } => write!(f, "failed to resolve revision '{}'", rev),
            StatusError::ListParents { rev } => write!(f, "failed to list parents of {}", rev),
            StatusError::ChangedFiles { rev, against } => {
                write!(f, "failed to diff {} against {}", rev, against)
            }
            StatusError::Reachable { rev } => write!(f, "failed to list revisions reachable from '{}'", rev),
            StatusError::ListTree { rev } => write!(f, "failed to list tree of {}", rev),
            StatusError::Export { rev } => write!(f, "failed to export modules of {}", rev),
            StatusError::ParseMetadata { dir } => write!(f, "failed to read module info of '{}'", dir),
            StatusError::DirtyCheck { dir } => write!(f, "failed to check module '{}'", dir),
            StatusError::ScanWorkingCopy { dir } => write!(f, "failed to scan working copy {}", dir),
        }
    }
}

impl std::error::Error for StatusError {}

/// Where the history walk stops when no stop revision is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopMode {
    /// Stop at revisions reachable from any remote-tracking reference.
    #[default]
    Remote,
    /// Stop at revisions reachable from any reference. Code review servers
    /// have no remote references but do not know revisions being pushed yet.
    Gerrit,
}

/// Options of a history status call.
#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    /// Stop at ancestors of this revision instead of applying `mode`
    pub stop_rev: Option<String>,
    pub mode: StopMode,
    /// Assume all modules of boundary revisions are clean without checking
    pub fast: bool,
}

impl StatusOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_rev(mut self, rev: impl Into<String>) -> Self {
        self.stop_rev = Some(rev.into());
        self
    }

    pub fn mode(mut self, mode: StopMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }
}

/// Decides which revisions the history walk recurses into.
///
/// Revisions that are not relevant become boundary nodes whose status is
/// computed from scratch.
pub trait Boundary {
    fn is_relevant(&self, rev: &str) -> bool;
}

/// Boundary given by an explicit set of relevant revision ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelevantSet {
    revs: HashSet<String>,
}

impl RelevantSet {
    pub fn new(revs: HashSet<String>) -> Self {
        Self { revs }
    }

    pub fn len(&self) -> usize {
        self.revs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revs.is_empty()
    }
}

impl Boundary for RelevantSet {
    fn is_relevant(&self, rev: &str) -> bool {
        self.revs.contains(rev)
    }
}

impl<F: Fn(&str) -> bool> Boundary for F {
    fn is_relevant(&self, rev: &str) -> bool {
        self(rev)
    }
}

/// Computes module status trees from its three collaborators.
pub struct StatusBuilder<'a> {
    graph: &'a dyn RevisionGraph,
    metadata: &'a dyn MetadataProvider,
    dirty_check: &'a dyn DirtyPredicate,
}

impl<'a> StatusBuilder<'a> {
    pub fn new(
        graph: &'a dyn RevisionGraph,
        metadata: &'a dyn MetadataProvider,
        dirty_check: &'a dyn DirtyPredicate,
    ) -> Self {
        Self {
            graph,
            metadata,
            dirty_check,
        }
    }

    /// Status tree for `rev` and its ancestors.
    ///
    /// Parents are followed while revisions are relevant according to
    /// `options`; the first irrelevant revision on each branch and any
    /// parentless revision become leaves. Merged branches share the nodes
    /// of their common ancestors.
    pub fn history(&self, rev: &str, options: &StatusOptions) -> Result<Arc<RevStatus>> {
        let relevant = self.relevant_revs(rev, options)?;
        log::info!(
            "History status of {} ({} relevant revision(s), mode {:?}, stop {:?}, fast {})",
            rev,
            relevant.len(),
            options.mode,
            options.stop_rev,
            options.fast
        );
        self.history_with(rev, &relevant, options.fast)
    }

    /// Status tree for `rev` with a caller supplied boundary.
    pub fn history_with(&self, rev: &str, boundary: &dyn Boundary, fast: bool) -> Result<Arc<RevStatus>> {
        let root = self.resolve(rev)?;
        self.walk_history(&root, boundary, fast)
    }

    /// Revisions the history walk for `rev` recurses into.
    pub fn relevant_revs(&self, rev: &str, options: &StatusOptions) -> Result<RelevantSet> {
        let revs = match (&options.stop_rev, options.mode) {
            (Some(stop_rev), _) => {
                let reachable = self.reachable(rev)?;
                let excluded = self.reachable(stop_rev)?;
                reachable.difference(&excluded).cloned().collect()
            }
            (None, StopMode::Gerrit) => self
                .graph
                .reachable_unknown(rev)
                .with_context(|| StatusError::Reachable { rev: rev.to_string() })?,
            (None, StopMode::Remote) => self
                .graph
                .reachable_non_remote(rev)
                .with_context(|| StatusError::Reachable { rev: rev.to_string() })?,
        };
        Ok(RelevantSet::new(revs))
    }

    /// Fully checked status of `rev` alone, without ancestors.
    pub fn rev_status(&self, rev: &str) -> Result<RevStatus> {
        let id = self.resolve(rev)?;
        self.scratch_status(&id, false)
    }

    /// Status of the module at `local_path` in `rev`, `None` if `rev` has
    /// no such module.
    pub fn module_status(&self, rev: &str, local_path: &str) -> Result<Option<ModuleStatus>> {
        let rev = self.resolve(rev)?;
        let local_path = local_path.trim_end_matches('/');
        let marker_path = format!("{}/{}", local_path, self.metadata.marker_file_name());

        let paths = self
            .graph
            .list_tree_paths(&rev)
            .with_context(|| StatusError::ListTree { rev: rev.clone() })?;
        if !paths.iter().any(|p| *p == marker_path) {
            return Ok(None);
        }

        let export = self
            .graph
            .export_subtrees(&rev, &[local_path.to_string()])
            .with_context(|| StatusError::Export { rev: rev.clone() })?;
        self.check_module(export.path(), local_path).map(Some)
    }

    /// Status of the modules currently on disk below `dir`.
    ///
    /// The result has no revision and no parents; it stands for uncommitted
    /// changes on top of the checked out revision.
    pub fn working_copy(&self, dir: &Path) -> Result<RevStatus> {
        let marker = self.metadata.marker_file_name();
        let mut modules = Vec::new();

        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");
        for entry in walker {
            let entry = entry.with_context(|| StatusError::ScanWorkingCopy {
                dir: dir.display().to_string(),
            })?;
            if !entry.file_type().is_file() || entry.file_name() != marker {
                continue;
            }
            let Some(module_dir) = entry.path().parent() else {
                continue;
            };
            let rel_dir = relative_path(dir, module_dir)?;
            if rel_dir.is_empty() {
                continue;
            }
            modules.push(self.check_module(dir, &rel_dir)?);
        }

        log::debug!("Working copy {}: {} module(s)", dir.display(), modules.len());
        Ok(RevStatus::new(None, modules, Vec::new()))
    }

    fn walk_history(&self, root: &str, boundary: &dyn Boundary, fast: bool) -> Result<Arc<RevStatus>> {
        let mut cache: HashMap<String, Arc<RevStatus>> = HashMap::new();
        let mut parents_of: HashMap<String, Vec<String>> = HashMap::new();
        let mut stack = vec![root.to_string()];

        // post-order: a revision is computed once all its parents are cached
        while let Some(rev) = stack.last().cloned() {
            if cache.contains_key(&rev) {
                stack.pop();
                continue;
            }

            if !boundary.is_relevant(&rev) {
                let status = self.scratch_status(&rev, fast)?;
                stack.pop();
                cache.insert(rev, Arc::new(status));
                continue;
            }

            if !parents_of.contains_key(&rev) {
                let parents = self
                    .graph
                    .parents(&rev)
                    .with_context(|| StatusError::ListParents { rev: rev.clone() })?;
                parents_of.insert(rev.clone(), parents);
            }
            let parents = &parents_of[&rev];

            if parents.is_empty() {
                let status = self.scratch_status(&rev, fast)?;
                stack.pop();
                cache.insert(rev, Arc::new(status));
                continue;
            }

            let pending: Vec<String> = parents.iter().filter(|p| !cache.contains_key(*p)).cloned().collect();
            if !pending.is_empty() {
                // reversed so the primary parent is computed first
                stack.extend(pending.into_iter().rev());
                continue;
            }

            let parent_stats: Vec<Arc<RevStatus>> = parents.iter().map(|p| Arc::clone(&cache[p])).collect();
            let status = self.incremental_status(&rev, &parents[0], parent_stats)?;
            stack.pop();
            cache.insert(rev, Arc::new(status));
        }

        cache
            .remove(root)
            .ok_or_else(|| eyre::eyre!("No status computed for {}", root))
    }

    /// Status of `rev` derived from its parents. Only the diff against the
    /// primary parent decides which modules exist and which get checked.
    fn incremental_status(&self, rev: &str, primary: &str, parent_stats: Vec<Arc<RevStatus>>) -> Result<RevStatus> {
        let base = &parent_stats[0];
        let changed = self
            .graph
            .changed_files(rev, primary)
            .with_context(|| StatusError::ChangedFiles {
                rev: rev.to_string(),
                against: primary.to_string(),
            })?;

        let module_dirs = self.apply_marker_changes(base, &changed);
        let check_dirs: Vec<String> = module_dirs
            .iter()
            .filter(|d| changed.iter().any(|f| f.is_under(d)))
            .cloned()
            .collect();

        let mut checked: HashMap<String, ModuleStatus> = self
            .check_modules(rev, &check_dirs)?
            .into_iter()
            .map(|m| (m.dir.clone(), m))
            .collect();

        let modules = module_dirs
            .iter()
            .map(|dir| match checked.remove(dir) {
                Some(status) => Ok(status),
                None => base
                    .module(dir)
                    .cloned()
                    .ok_or_else(|| eyre::eyre!("Module '{}' missing from parent of {}", dir, rev)),
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "{}: {} module(s), {} checked, {} inherited",
            rev,
            modules.len(),
            check_dirs.len(),
            modules.len() - check_dirs.len()
        );
        Ok(RevStatus::new(Some(rev.to_string()), modules, parent_stats))
    }

    /// Module directories of the primary parent, adjusted by added and
    /// deleted markers.
    fn apply_marker_changes(&self, base: &RevStatus, changed: &[ChangedFile]) -> Vec<String> {
        let marker = self.metadata.marker_file_name();
        let mut module_dirs: Vec<String> = base.modules().iter().map(|m| m.dir.clone()).collect();

        for file in changed {
            let Some(dir) = marker_dir(&file.path, marker) else {
                continue;
            };
            match file.kind {
                ChangeKind::Added => {
                    if !module_dirs.iter().any(|d| d == dir) {
                        module_dirs.push(dir.to_string());
                    }
                }
                ChangeKind::Deleted => module_dirs.retain(|d| d != dir),
                ChangeKind::Modified => {}
            }
        }

        module_dirs
    }

    /// Status of `rev` computed from its tree alone.
    fn scratch_status(&self, rev: &str, fast: bool) -> Result<RevStatus> {
        let module_dirs = self.module_dirs(rev)?;
        let modules = if fast {
            self.modules_assumed_clean(rev, &module_dirs)?
        } else {
            self.check_modules(rev, &module_dirs)?
        };
        log::debug!("{}: {} module(s) from scratch (fast {})", rev, modules.len(), fast);
        Ok(RevStatus::new(Some(rev.to_string()), modules, Vec::new()))
    }

    /// Directories containing a marker in the tree of `rev`.
    fn module_dirs(&self, rev: &str) -> Result<Vec<String>> {
        let marker = self.metadata.marker_file_name();
        let paths = self
            .graph
            .list_tree_paths(rev)
            .with_context(|| StatusError::ListTree { rev: rev.to_string() })?;
        Ok(paths
            .iter()
            .filter_map(|p| marker_dir(p, marker))
            .map(String::from)
            .collect())
    }

    /// Export all given modules at once and check each of them.
    fn check_modules(&self, rev: &str, module_dirs: &[String]) -> Result<Vec<ModuleStatus>> {
        if module_dirs.is_empty() {
            return Ok(Vec::new());
        }
        let export = self
            .graph
            .export_subtrees(rev, module_dirs)
            .with_context(|| StatusError::Export { rev: rev.to_string() })?;
        module_dirs
            .iter()
            .map(|dir| self.check_module(export.path(), dir))
            .collect()
    }

    /// Export only the markers and report every module clean.
    fn modules_assumed_clean(&self, rev: &str, module_dirs: &[String]) -> Result<Vec<ModuleStatus>> {
        if module_dirs.is_empty() {
            return Ok(Vec::new());
        }
        let marker = self.metadata.marker_file_name();
        let marker_paths: Vec<String> = module_dirs.iter().map(|d| format!("{}/{}", d, marker)).collect();
        let export = self
            .graph
            .export_subtrees(rev, &marker_paths)
            .with_context(|| StatusError::Export { rev: rev.to_string() })?;

        module_dirs
            .iter()
            .map(|dir| {
                let metadata = self
                    .metadata
                    .parse(&export.join(dir))
                    .with_context(|| StatusError::ParseMetadata { dir: dir.clone() })?;
                Ok(ModuleStatus::new(dir.as_str(), metadata, false))
            })
            .collect()
    }

    /// Status of the module at `root/dir`.
    fn check_module(&self, root: &Path, dir: &str) -> Result<ModuleStatus> {
        let module_path = root.join(dir);
        let metadata = self
            .metadata
            .parse(&module_path)
            .with_context(|| StatusError::ParseMetadata { dir: dir.to_string() })?;
        let dirty = self
            .dirty_check
            .is_dirty(&module_path)
            .with_context(|| StatusError::DirtyCheck { dir: dir.to_string() })?;
        Ok(ModuleStatus::new(dir, metadata, dirty))
    }

    fn resolve(&self, rev: &str) -> Result<String> {
        self.graph
            .resolve(rev)
            .with_context(|| StatusError::ResolveRef { rev: rev.to_string() })
    }

    fn reachable(&self, rev: &str) -> Result<HashSet<String>> {
        self.graph
            .reachable(rev)
            .with_context(|| StatusError::Reachable { rev: rev.to_string() })
    }
}

/// Module directory of a marker path. Markers at the repository root do
/// not define a module.
fn marker_dir<'p>(path: &'p str, marker: &str) -> Option<&'p str> {
    match path.rsplit_once('/') {
        Some((dir, name)) if name == marker && !dir.is_empty() => Some(dir),
        _ => None,
    }
}
