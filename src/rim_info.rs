//! The `.riminfo` metadata marker.
//!
//! Every module root carries a `.riminfo` file. It is a list of
//! `key: value` lines; `#` starts a comment line:
//!
//! ```text
//! # generated by rim, do not edit
//! remote_url: ssh://gerrit/platform/drivers
//! target_revision: master
//! revision_sha1: 4c7a0e1b...
//! ignores: **/*.o, build
//! checksum: 9f86d081...
//! ```

use crate::types::ModuleMetadata;
use eyre::{Context, Result};
use std::fs;
use std::path::Path;

/// Marker file name identifying a module root.
pub const INFO_FILE_NAME: &str = ".riminfo";

const HEADER: &str = "# generated by rim, do not edit";

/// Parses the metadata marker of a module directory.
pub trait MetadataProvider {
    /// File name of the marker identifying a module root.
    fn marker_file_name(&self) -> &str;

    /// Read the marker inside `module_dir`.
    fn parse(&self, module_dir: &Path) -> Result<ModuleMetadata>;
}

/// Provider for `.riminfo` markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RimInfoProvider;

impl MetadataProvider for RimInfoProvider {
    fn marker_file_name(&self) -> &str {
        INFO_FILE_NAME
    }

    fn parse(&self, module_dir: &Path) -> Result<ModuleMetadata> {
        from_dir(module_dir)
    }
}

/// Errors in marker content.
#[derive(Debug, Clone, PartialEq)]
pub enum RimInfoError {
    MalformedLine { line: usize, content: String },
    DuplicateKey(String),
    MissingField(&'static str),
}

impl std::fmt::Display for RimInfoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RimInfoError::MalformedLine { line, content } => {
                write!(f, "line {}: expected 'key: value', got '{}'", line, content)
            }
            RimInfoError::DuplicateKey(key) => write!(f, "duplicate key '{}'", key),
            RimInfoError::MissingField(field) => write!(f, "missing required field '{}'", field),
        }
    }
}

impl std::error::Error for RimInfoError {}

/// Parse marker text.
pub fn parse(text: &str) -> std::result::Result<ModuleMetadata, RimInfoError> {
    let mut metadata = ModuleMetadata::default();
    let mut seen: Vec<String> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or_else(|| RimInfoError::MalformedLine {
            line: idx + 1,
            content: line.to_string(),
        })?;
        let key = key.trim();
        let value = value.trim();

        if key.is_empty() {
            return Err(RimInfoError::MalformedLine {
                line: idx + 1,
                content: line.to_string(),
            });
        }
        if seen.iter().any(|k| k == key) {
            return Err(RimInfoError::DuplicateKey(key.to_string()));
        }
        seen.push(key.to_string());

        let optional = (!value.is_empty()).then(|| value.to_string());
        match key {
            "remote_url" => metadata.remote_url = value.to_string(),
            "target_revision" => metadata.target_revision = optional,
            "revision_sha1" => metadata.revision_sha1 = optional,
            "checksum" => metadata.checksum = optional,
            "ignores" => {
                metadata.ignores = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            other => log::debug!("Ignoring unknown marker key '{}'", other),
        }
    }

    if metadata.remote_url.is_empty() {
        return Err(RimInfoError::MissingField("remote_url"));
    }

    Ok(metadata)
}

/// Render metadata as marker text.
pub fn render(metadata: &ModuleMetadata) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    out.push_str(&format!("remote_url: {}\n", metadata.remote_url));
    if let Some(target) = &metadata.target_revision {
        out.push_str(&format!("target_revision: {}\n", target));
    }
    if let Some(sha1) = &metadata.revision_sha1 {
        out.push_str(&format!("revision_sha1: {}\n", sha1));
    }
    if !metadata.ignores.is_empty() {
        out.push_str(&format!("ignores: {}\n", metadata.ignores.join(", ")));
    }
    if let Some(checksum) = &metadata.checksum {
        out.push_str(&format!("checksum: {}\n", checksum));
    }
    out
}

/// Read the marker of the module at `dir`.
pub fn from_dir(dir: &Path) -> Result<ModuleMetadata> {
    let path = dir.join(INFO_FILE_NAME);
    let text = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse(&text).with_context(|| format!("Invalid module marker {}", path.display()))
}

/// Write the marker of the module at `dir`, creating the directory if needed.
pub fn write_to_dir(dir: &Path, metadata: &ModuleMetadata) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(INFO_FILE_NAME);
    fs::write(&path, render(metadata)).with_context(|| format!("Failed to write {}", path.display()))
}
