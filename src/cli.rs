//! CLI argument parsing for rim.

use clap::{Parser, Subcommand};
use rim::{RevStatus, StatusRecord};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rim",
    about = "Status of repositories embedded in a git workspace",
    version,
    after_help = "Logs are written to: ~/.local/share/rim/logs/rim.log (override with RIM_LOG_DIR)"
)]
pub struct Cli {
    /// Path to the workspace (default: current directory)
    #[arg(short = 'd', long, global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print commits and their module status
    ///
    /// Without a revision checks the working copy, the current branch and
    /// all local ancestors. With <REV> checks that revision and its local
    /// ancestors. With <FROM>..<TO> checks TO and its ancestors which are
    /// not ancestors of FROM.
    Status {
        /// Revision or range to check
        range: Option<String>,

        /// List the dirty modules of each commit
        #[arg(long)]
        detailed: bool,

        /// Exit with status 1 if any commit is dirty
        #[arg(long)]
        verify_clean: bool,

        /// Stop at all known revisions instead of remote ones
        #[arg(long)]
        gerrit: bool,

        /// Assume modules of the oldest checked commits are clean
        #[arg(long)]
        fast: bool,

        /// Print the status tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the status of all modules in a single revision
    Show {
        /// Revision to check
        #[arg(default_value = "HEAD")]
        rev: String,
    },

    /// Show the status of a single module
    Module {
        /// Module directory relative to the workspace root
        path: String,

        /// Revision to check
        #[arg(short, long, default_value = "HEAD")]
        rev: String,
    },
}

/// Split a `FROM..TO` range into its optional stop revision and target.
pub fn parse_range(range: &str) -> (Option<String>, String) {
    match range.split_once("..") {
        Some((from, to)) => {
            let from = (!from.is_empty()).then(|| from.to_string());
            let to = if to.is_empty() { "HEAD" } else { to };
            (from, to.to_string())
        }
        None => (None, range.to_string()),
    }
}

/// Records printed by `status --json`: the working copy first, then every
/// node of the history.
pub fn status_records(working_copy: Option<&RevStatus>, history: &RevStatus) -> Vec<StatusRecord> {
    let mut records = Vec::new();
    if let Some(wc) = working_copy {
        records.extend(wc.to_records());
    }
    records.extend(history.to_records());
    records
}

/// Whether `status --verify-clean` fails. Every node counts, including the
/// leaves that are not printed.
pub fn verify_dirty(working_copy: Option<&RevStatus>, history: &RevStatus) -> bool {
    working_copy.is_some_and(RevStatus::is_dirty) || history.any_dirty()
}
