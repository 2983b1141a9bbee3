//! Core data types for module status trees.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Structured content of a module's metadata marker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleMetadata {
    /// Remote origin of the module, its identity
    pub remote_url: String,

    /// Upstream branch or tag the module follows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_revision: Option<String>,

    /// Glob patterns excluded from synchronization
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignores: Vec<String>,

    /// Upstream revision the content was last synchronized from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_sha1: Option<String>,

    /// Content checksum recorded at synchronization time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Status of one module within one revision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleStatus {
    /// Module directory relative to the workspace root, `/` separated
    pub dir: String,

    /// Metadata snapshot taken from the module's marker
    pub metadata: ModuleMetadata,

    /// Whether the content diverged from the synchronized state
    pub dirty: bool,
}

impl ModuleStatus {
    pub fn new(dir: impl Into<String>, metadata: ModuleMetadata, dirty: bool) -> Self {
        Self {
            dir: dir.into(),
            metadata,
            dirty,
        }
    }
}

/// A node of the revision status tree.
///
/// A node without a revision stands for the uncommitted working copy.
/// Parent nodes are shared: when two branches of a merge lead to the same
/// ancestor, both hold the same `Arc`.
pub struct RevStatus {
    rev: Option<String>,
    modules: Vec<ModuleStatus>,
    parents: Vec<Arc<RevStatus>>,
}

impl RevStatus {
    /// Create a node. Module directories must be unique.
    pub fn new(rev: Option<String>, modules: Vec<ModuleStatus>, parents: Vec<Arc<RevStatus>>) -> Self {
        debug_assert!(
            {
                let mut seen = HashSet::new();
                modules.iter().all(|m| seen.insert(m.dir.as_str()))
            },
            "duplicate module directory in status node"
        );
        Self { rev, modules, parents }
    }

    /// Revision id, `None` for the working copy.
    pub fn rev(&self) -> Option<&str> {
        self.rev.as_deref()
    }

    pub fn modules(&self) -> &[ModuleStatus] {
        &self.modules
    }

    pub fn parents(&self) -> &[Arc<RevStatus>] {
        &self.parents
    }

    /// True for nodes where traversal stopped (no parent linkage).
    pub fn is_boundary(&self) -> bool {
        self.parents.is_empty()
    }

    /// Look up the module at `dir`.
    pub fn module(&self, dir: &str) -> Option<&ModuleStatus> {
        self.modules.iter().find(|m| m.dir == dir)
    }

    /// True if any module of this node is dirty.
    pub fn is_dirty(&self) -> bool {
        self.modules.iter().any(|m| m.dirty)
    }

    pub fn dirty_modules(&self) -> impl Iterator<Item = &ModuleStatus> {
        self.modules.iter().filter(|m| m.dirty)
    }

    /// True if this node or any ancestor reachable through `parents` is dirty.
    pub fn any_dirty(&self) -> bool {
        self.walk().iter().any(|node| node.is_dirty())
    }

    /// All nodes of the tree, depth-first from this one, each shared node once.
    pub fn walk(&self) -> Vec<&RevStatus> {
        let mut visited: HashSet<*const RevStatus> = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![self];

        while let Some(node) = stack.pop() {
            if visited.insert(node as *const RevStatus) {
                order.push(node);
                // reversed so the primary parent is visited first
                for parent in node.parents.iter().rev() {
                    stack.push(parent.as_ref());
                }
            }
        }

        order
    }

    /// Flatten the tree into records linked by revision id.
    pub fn to_records(&self) -> Vec<StatusRecord> {
        self.walk()
            .into_iter()
            .map(|node| StatusRecord {
                rev: node.rev.clone(),
                dirty: node.is_dirty(),
                parents: node.parents.iter().filter_map(|p| p.rev.clone()).collect(),
                modules: node.modules.clone(),
            })
            .collect()
    }
}

// Two trees are equal when they have the same revisions, modules and parent
// structure. Each pair of shared nodes is compared once.
impl PartialEq for RevStatus {
    fn eq(&self, other: &Self) -> bool {
        let mut visited: HashSet<(*const RevStatus, *const RevStatus)> = HashSet::new();
        let mut stack = vec![(self, other)];

        while let Some((a, b)) = stack.pop() {
            if std::ptr::eq(a, b) || !visited.insert((a as *const RevStatus, b as *const RevStatus)) {
                continue;
            }
            if a.rev != b.rev || a.modules != b.modules || a.parents.len() != b.parents.len() {
                return false;
            }
            for (pa, pb) in a.parents.iter().zip(&b.parents) {
                stack.push((pa.as_ref(), pb.as_ref()));
            }
        }

        true
    }
}

impl Eq for RevStatus {}

impl std::fmt::Debug for RevStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parents: Vec<Option<&str>> = self.parents.iter().map(|p| p.rev()).collect();
        f.debug_struct("RevStatus")
            .field("rev", &self.rev)
            .field("modules", &self.modules)
            .field("parents", &parents)
            .finish()
    }
}

// Parents are unlinked iteratively; long histories would overflow the stack
// with the recursive default.
impl Drop for RevStatus {
    fn drop(&mut self) {
        let mut parents = std::mem::take(&mut self.parents);
        while let Some(parent) = parents.pop() {
            if let Ok(mut node) = Arc::try_unwrap(parent) {
                parents.append(&mut node.parents);
            }
        }
    }
}

/// Serializable form of one status node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusRecord {
    /// Revision id, absent for the working copy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    /// Whether any module of the node is dirty
    pub dirty: bool,

    /// Ids of the parent records
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,

    pub modules: Vec<ModuleStatus>,
}
