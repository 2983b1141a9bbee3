//! Rim: status tracking for repositories embedded in a workspace.
//!
//! Modules are external repositories copied into subdirectories of a git
//! workspace, each marked by a `.riminfo` file. Rim computes, for every
//! revision of the workspace history, which modules were changed locally
//! ("dirty") relative to the state they were synchronized from.
//!
//! # Example
//!
//! ```no_run
//! use rim::{ChecksumDirtyCheck, GitSession, RimInfoProvider, StatusBuilder, StatusOptions};
//! use std::path::Path;
//!
//! let session = GitSession::open(Path::new(".")).unwrap();
//! let builder = StatusBuilder::new(&session, &RimInfoProvider, &ChecksumDirtyCheck);
//!
//! // Local history of HEAD, stopping at remote revisions
//! let status = builder.history("HEAD", &StatusOptions::new()).unwrap();
//! for node in status.walk() {
//!     println!("{:?} dirty={}", node.rev(), node.is_dirty());
//! }
//!
//! // A single module at a single revision
//! let module = builder.module_status("HEAD", "lib/drivers").unwrap();
//! assert!(module.is_some());
//! ```

pub mod config;
pub mod dirty_check;
pub mod git;
pub mod graph;
pub mod rim_info;
pub mod status;
pub mod types;

// Re-export public API
pub use config::Config;
pub use dirty_check::{ChecksumDirtyCheck, DirtyPredicate};
pub use git::GitSession;
pub use graph::{ChangeKind, ChangedFile, ExportDir, RevisionGraph};
pub use rim_info::{MetadataProvider, RimInfoError, RimInfoProvider};
pub use status::{Boundary, RelevantSet, StatusBuilder, StatusError, StatusOptions, StopMode};
pub use types::{ModuleMetadata, ModuleStatus, RevStatus, StatusRecord};
