//! Runtime configuration for the rim CLI.

use crate::status::StopMode;
use std::path::PathBuf;

/// Log file name inside the log directory.
const LOG_FILE: &str = "rim.log";

/// Overrides the log directory.
pub const LOG_DIR_ENV: &str = "RIM_LOG_DIR";

/// Selects gerrit stop mode when set to `1` or `true`.
pub const GERRIT_ENV: &str = "RIM_GERRIT";

/// Configuration for a rim invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Workspace root, the git working copy holding the modules
    pub root: PathBuf,

    /// Directory receiving the log file
    pub log_dir: PathBuf,

    /// Stop mode used when no stop revision is given
    pub stop_mode: StopMode,
}

impl Config {
    /// Create config with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            log_dir: default_log_dir(),
            stop_mode: StopMode::Remote,
        }
    }

    /// Apply overrides from the process environment.
    pub fn from_env(self) -> Self {
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup.
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(LOG_DIR_ENV).filter(|d| !d.is_empty()) {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup(GERRIT_ENV) {
            self.stop_mode = if matches!(value.trim(), "1" | "true" | "yes") {
                StopMode::Gerrit
            } else {
                StopMode::Remote
            };
        }
        self
    }

    /// Get the log file path.
    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE)
    }
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rim")
        .join("logs")
}
