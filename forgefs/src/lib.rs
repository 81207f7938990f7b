//! forgefs - mount a code-hosting forge as a filesystem of git repositories
//!
//! This library exposes the organizational hierarchy of a forge (GitLab,
//! GitHub or Gitea) as a read-oriented FUSE filesystem. Groups, organizations
//! and users become directories; repositories become symbolic links that
//! resolve to a local clone which is materialized lazily, in the background,
//! the first time the repository is accessed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      fstree (FUSE)                        │
//! │  lookup/readdir -> GitForge   readlink -> GitClient      │
//! ├─────────────────────────────┬────────────────────────────┤
//! │   forges                    │   git                      │
//! │   caching forge client      │   clone/pull materializer  │
//! │   (GitLab/GitHub/Gitea)     │   bounded queue + workers  │
//! └─────────────────────────────┴────────────────────────────┘
//! ```
//!
//! The filesystem layer depends only on the capability contracts defined in
//! [`fstree`] ([`fstree::GroupSource`], [`fstree::RepositorySource`],
//! [`fstree::GitForge`], [`fstree::GitClient`]), never on a concrete forge.

pub mod config;
pub mod forges;
pub mod fstree;
pub mod git;
pub mod logging;

/// Version of the forgefs library and CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
