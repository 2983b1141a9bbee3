//! Live revision graph backed by the `git` command line.

use crate::graph::{ChangeKind, ChangedFile, ExportDir, RevisionGraph};
use eyre::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A git working copy the status engine runs against.
#[derive(Debug, Clone)]
pub struct GitSession {
    root: PathBuf,
}

impl GitSession {
    /// Open the repository containing `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let session = Self {
            root: root.to_path_buf(),
        };
        session
            .execute(&["rev-parse", "--git-dir"])
            .with_context(|| format!("{} is not inside a git repository", root.display()))?;
        Ok(session)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run a git command in the repository and return its standard output.
    pub fn execute(&self, args: &[&str]) -> Result<String> {
        let command_line = args.join(" ");
        log::debug!("git {}", command_line);

        let output = Command::new("git")
            .current_dir(&self.root)
            .args(args)
            .output()
            .with_context(|| format!("Failed to run git {}", command_line))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            eyre::bail!("git {} failed: {}", command_line, stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// True if the working copy has staged, unstaged or untracked changes.
    pub fn has_uncommitted_changes(&self) -> Result<bool> {
        let out = self.execute(&["status", "--porcelain"])?;
        Ok(!out.trim().is_empty())
    }

    /// Name of the checked out branch.
    pub fn current_branch(&self) -> Result<String> {
        let out = self.execute(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let branch = out.trim();
        if branch == "HEAD" {
            eyre::bail!("Not on a git branch");
        }
        Ok(branch.to_string())
    }

    /// Short id and subject line of a revision.
    pub fn headline(&self, rev: &str) -> Result<String> {
        let out = self.execute(&["log", "-n", "1", "--format=%h %s", rev, "--"])?;
        Ok(out.trim().to_string())
    }

    fn rev_list(&self, args: &[&str]) -> Result<HashSet<String>> {
        let out = self.execute(args)?;
        Ok(out.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
    }
}

impl RevisionGraph for GitSession {
    fn resolve(&self, rev: &str) -> Result<String> {
        let commitish = format!("{}^{{commit}}", rev);
        let out = self.execute(&["rev-parse", "--verify", "--quiet", &commitish])?;
        Ok(out.trim().to_string())
    }

    fn parents(&self, rev: &str) -> Result<Vec<String>> {
        let out = self.execute(&["rev-list", "--parents", "-n", "1", rev, "--"])?;
        Ok(out.split_whitespace().skip(1).map(String::from).collect())
    }

    fn changed_files(&self, rev: &str, against: &str) -> Result<Vec<ChangedFile>> {
        let out = self.execute(&[
            "diff-tree",
            "-r",
            "-z",
            "--no-commit-id",
            "--no-renames",
            "--name-status",
            against,
            rev,
        ])?;
        parse_name_status(&out)
    }

    fn reachable(&self, rev: &str) -> Result<HashSet<String>> {
        self.rev_list(&["rev-list", rev, "--"])
    }

    fn reachable_non_remote(&self, rev: &str) -> Result<HashSet<String>> {
        self.rev_list(&["rev-list", rev, "--not", "--remotes", "--"])
    }

    fn reachable_unknown(&self, rev: &str) -> Result<HashSet<String>> {
        self.rev_list(&["rev-list", rev, "--not", "--all", "--"])
    }

    fn export_subtrees(&self, rev: &str, paths: &[String]) -> Result<ExportDir> {
        let export = ExportDir::new()?;
        if paths.is_empty() {
            return Ok(export);
        }
        log::debug!("Exporting {} path(s) of {}", paths.len(), rev);

        let mut archive = Command::new("git")
            .current_dir(&self.root)
            .args(["archive", "--format=tar", rev, "--"])
            .args(paths)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to run git archive")?;
        let tar_input = archive
            .stdout
            .take()
            .ok_or_else(|| eyre::eyre!("git archive produced no output stream"))?;

        let untar = Command::new("tar")
            .arg("-x")
            .arg("-C")
            .arg(export.path())
            .stdin(tar_input)
            .stderr(Stdio::piped())
            .output()
            .context("Failed to run tar")?;
        let archived = archive.wait_with_output().context("Failed to wait for git archive")?;

        if !archived.status.success() {
            let stderr = String::from_utf8_lossy(&archived.stderr);
            eyre::bail!("git archive {} failed: {}", rev, stderr.trim());
        }
        if !untar.status.success() {
            let stderr = String::from_utf8_lossy(&untar.stderr);
            eyre::bail!("tar extraction failed: {}", stderr.trim());
        }

        Ok(export)
    }

    fn list_tree_paths(&self, rev: &str) -> Result<Vec<String>> {
        let out = self.execute(&["ls-tree", "-r", "-z", "--name-only", rev])?;
        Ok(out.split('\0').filter(|p| !p.is_empty()).map(String::from).collect())
    }
}

/// Parse `git diff-tree -z --name-status` output: `<letter>\0<path>\0...`.
fn parse_name_status(out: &str) -> Result<Vec<ChangedFile>> {
    let mut fields = out.split('\0').filter(|f| !f.is_empty());
    let mut files = Vec::new();

    while let Some(status) = fields.next() {
        let path = fields
            .next()
            .ok_or_else(|| eyre::eyre!("Missing path after status '{}'", status))?;
        let kind = match status.chars().next() {
            Some('A') => ChangeKind::Added,
            Some('D') => ChangeKind::Deleted,
            // modifications, type changes and unmerged entries
            Some(_) => ChangeKind::Modified,
            None => eyre::bail!("Empty change status"),
        };
        files.push(ChangedFile::new(path, kind));
    }

    Ok(files)
}
