//! Shared test infrastructure for rim integration tests.
//!
//! Provides an in-memory revision graph and a TestEnv helper wrapping a
//! StatusBuilder over it.

#![allow(dead_code)]

use eyre::Result;
use rim::rim_info;
use rim::{
    ChangeKind, ChangedFile, DirtyPredicate, ExportDir, ModuleMetadata, RevStatus, RevisionGraph, RimInfoProvider,
    StatusBuilder,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// A module whose content contains this file is reported dirty.
pub const LOCAL_CHANGE: &str = "LOCAL_CHANGE";

#[derive(Debug, Clone)]
struct FakeCommit {
    parents: Vec<String>,
    files: BTreeMap<String, String>,
}

/// In-memory revision graph. Commit ids double as revision names.
#[derive(Default)]
pub struct FakeRepo {
    commits: HashMap<String, FakeCommit>,
    refs: HashMap<String, String>,
    remote_refs: HashMap<String, String>,
    pub fail_exports: Cell<bool>,
    pub exports: RefCell<Vec<(String, Vec<String>)>>,
    pub diffs: RefCell<Vec<(String, String)>>,
    pub parent_queries: RefCell<Vec<String>>,
}

impl FakeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a commit whose tree is the primary parent's tree with `changes`
    /// applied. `None` deletes a file.
    pub fn commit(&mut self, id: &str, parents: &[&str], changes: &[(&str, Option<&str>)]) {
        let mut files = parents
            .first()
            .map(|p| self.commits[*p].files.clone())
            .unwrap_or_default();
        for (path, content) in changes {
            match content {
                Some(content) => {
                    files.insert(path.to_string(), content.to_string());
                }
                None => {
                    files.remove(*path);
                }
            }
        }
        self.commits.insert(
            id.to_string(),
            FakeCommit {
                parents: parents.iter().map(|p| p.to_string()).collect(),
                files,
            },
        );
    }

    /// Add a linear chain of commits without file changes.
    pub fn chain(&mut self, prefix: &str, parent: &str, count: usize) -> String {
        let mut prev = parent.to_string();
        for i in 0..count {
            let id = format!("{}{}", prefix, i);
            self.commit(&id, &[prev.as_str()], &[]);
            prev = id;
        }
        prev
    }

    pub fn set_ref(&mut self, name: &str, id: &str) {
        self.refs.insert(name.to_string(), id.to_string());
    }

    pub fn set_remote_ref(&mut self, name: &str, id: &str) {
        self.remote_refs.insert(name.to_string(), id.to_string());
    }

    pub fn diffed(&self, rev: &str, against: &str) -> bool {
        self.diffs.borrow().iter().any(|(r, a)| r == rev && a == against)
    }

    pub fn exported_paths(&self, rev: &str) -> Vec<String> {
        self.exports
            .borrow()
            .iter()
            .filter(|(r, _)| r == rev)
            .flat_map(|(_, paths)| paths.clone())
            .collect()
    }

    fn commit_of(&self, rev: &str) -> Result<&FakeCommit> {
        let id = self.resolve(rev)?;
        Ok(&self.commits[&id])
    }

    fn reachable_from_all(&self, refs: &HashMap<String, String>) -> Result<HashSet<String>> {
        let mut all = HashSet::new();
        for id in refs.values() {
            all.extend(self.reachable(id)?);
        }
        Ok(all)
    }
}

impl RevisionGraph for FakeRepo {
    fn resolve(&self, rev: &str) -> Result<String> {
        if self.commits.contains_key(rev) {
            return Ok(rev.to_string());
        }
        self.refs
            .get(rev)
            .or_else(|| self.remote_refs.get(rev))
            .cloned()
            .ok_or_else(|| eyre::eyre!("unknown revision '{}'", rev))
    }

    fn parents(&self, rev: &str) -> Result<Vec<String>> {
        self.parent_queries.borrow_mut().push(rev.to_string());
        Ok(self.commit_of(rev)?.parents.clone())
    }

    fn changed_files(&self, rev: &str, against: &str) -> Result<Vec<ChangedFile>> {
        self.diffs.borrow_mut().push((rev.to_string(), against.to_string()));
        let new = &self.commit_of(rev)?.files;
        let old = &self.commit_of(against)?.files;

        let mut changed = Vec::new();
        for (path, content) in new {
            match old.get(path) {
                None => changed.push(ChangedFile::new(path.as_str(), ChangeKind::Added)),
                Some(previous) if previous != content => {
                    changed.push(ChangedFile::new(path.as_str(), ChangeKind::Modified))
                }
                Some(_) => {}
            }
        }
        for path in old.keys().filter(|p| !new.contains_key(*p)) {
            changed.push(ChangedFile::new(path.as_str(), ChangeKind::Deleted));
        }
        Ok(changed)
    }

    fn reachable(&self, rev: &str) -> Result<HashSet<String>> {
        let mut seen = HashSet::new();
        let mut stack = vec![self.resolve(rev)?];
        while let Some(id) = stack.pop() {
            if seen.insert(id.clone()) {
                stack.extend(self.commits[&id].parents.iter().cloned());
            }
        }
        Ok(seen)
    }

    fn reachable_non_remote(&self, rev: &str) -> Result<HashSet<String>> {
        let remote = self.reachable_from_all(&self.remote_refs)?;
        Ok(self.reachable(rev)?.difference(&remote).cloned().collect())
    }

    fn reachable_unknown(&self, rev: &str) -> Result<HashSet<String>> {
        let mut known = self.reachable_from_all(&self.refs)?;
        known.extend(self.reachable_from_all(&self.remote_refs)?);
        Ok(self.reachable(rev)?.difference(&known).cloned().collect())
    }

    fn export_subtrees(&self, rev: &str, paths: &[String]) -> Result<ExportDir> {
        self.exports.borrow_mut().push((rev.to_string(), paths.to_vec()));
        if self.fail_exports.get() {
            eyre::bail!("export of {} failed", rev);
        }

        let export = ExportDir::new()?;
        for (path, content) in &self.commit_of(rev)?.files {
            let selected = paths
                .iter()
                .any(|p| path == p || path.strip_prefix(p.as_str()).is_some_and(|r| r.starts_with('/')));
            if selected {
                let target = export.join(path);
                fs::create_dir_all(target.parent().unwrap())?;
                fs::write(target, content)?;
            }
        }
        Ok(export)
    }

    fn list_tree_paths(&self, rev: &str) -> Result<Vec<String>> {
        Ok(self.commit_of(rev)?.files.keys().cloned().collect())
    }
}

/// Dirty predicate recording every directory it is asked about.
#[derive(Default)]
pub struct CountingDirtyCheck {
    pub checked: RefCell<Vec<PathBuf>>,
}

impl CountingDirtyCheck {
    /// Number of checks of module `dir`.
    pub fn count(&self, dir: &str) -> usize {
        self.checked.borrow().iter().filter(|p| p.ends_with(dir)).count()
    }

    pub fn total(&self) -> usize {
        self.checked.borrow().len()
    }
}

impl DirtyPredicate for CountingDirtyCheck {
    fn is_dirty(&self, module_dir: &Path) -> Result<bool> {
        self.checked.borrow_mut().push(module_dir.to_path_buf());
        Ok(module_dir.join(LOCAL_CHANGE).exists())
    }
}

/// Marker content for a module.
pub fn marker(remote: &str) -> String {
    rim_info::render(&ModuleMetadata {
        remote_url: format!("ssh://gerrit/{}", remote),
        target_revision: Some("master".to_string()),
        ..Default::default()
    })
}

/// Write module `dir` below `root` with a marker recording its current
/// checksum, as a fresh synchronization would.
pub fn write_synced_module(root: &Path, dir: &str, files: &[(&str, &str)]) {
    let module_dir = root.join(dir);
    for (name, content) in files {
        let path = module_dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    let checksum = rim::dirty_check::checksum(&module_dir, &[]).unwrap();
    let metadata = ModuleMetadata {
        remote_url: format!("ssh://gerrit/{}", dir),
        target_revision: Some("master".to_string()),
        checksum: Some(checksum),
        ..Default::default()
    };
    rim_info::write_to_dir(&module_dir, &metadata).unwrap();
}

/// Path of the marker of module `dir`.
pub fn marker_path(dir: &str) -> String {
    format!("{}/{}", dir, rim_info::INFO_FILE_NAME)
}

/// Test environment bundling a fake repository with its collaborators.
pub struct TestEnv {
    pub repo: FakeRepo,
    pub dirty_check: CountingDirtyCheck,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            repo: FakeRepo::new(),
            dirty_check: CountingDirtyCheck::default(),
        }
    }

    pub fn builder(&self) -> StatusBuilder<'_> {
        StatusBuilder::new(&self.repo, &RimInfoProvider, &self.dirty_check)
    }

    /// Root commit "c1" with clean modules `a` and `b`.
    pub fn with_two_modules() -> Self {
        let mut env = Self::new();
        env.repo.commit(
            "c1",
            &[],
            &[
                ("README", Some("workspace")),
                ("a/.riminfo", Some(marker("a").as_str())),
                ("a/src.c", Some("a v1")),
                ("b/.riminfo", Some(marker("b").as_str())),
                ("b/src.c", Some("b v1")),
            ],
        );
        env
    }

    /// Revision ids of all nodes, each shared node once.
    pub fn revs(status: &RevStatus) -> Vec<String> {
        status.walk().iter().map(|n| n.rev().unwrap_or("<wc>").to_string()).collect()
    }

    /// Module directories of a node in order.
    pub fn dirs(status: &RevStatus) -> Vec<String> {
        status.modules().iter().map(|m| m.dir.clone()).collect()
    }

    /// Assert that a node has a module at `dir` with the given dirty flag.
    pub fn assert_module(status: &RevStatus, dir: &str, dirty: bool) {
        let module = status.module(dir).unwrap_or_else(|| {
            panic!(
                "Expected module {} in {:?}, modules: {:?}",
                dir,
                status.rev(),
                Self::dirs(status)
            )
        });
        assert_eq!(
            module.dirty,
            dirty,
            "Expected module {} in {:?} to have dirty={}",
            dir,
            status.rev(),
            dirty
        );
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
