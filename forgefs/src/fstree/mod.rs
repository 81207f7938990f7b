//! Virtual filesystem tree.
//!
//! Exposes the forge hierarchy as a FUSE filesystem: groups, organizations
//! and users are directories, repositories are symbolic links resolving to a
//! local clone, and every group directory carries a synthetic `.refresh` file
//! whose `open` drops that group's cached content.
//!
//! This module owns the capability contracts it consumes ([`GroupSource`],
//! [`RepositorySource`], [`GitForge`], [`GitClient`]); the forge clients and
//! the git materializer implement them. The tree never depends on a concrete
//! forge type.

mod filesystem;
mod inode;
mod mount;

pub use filesystem::{DirEntry, ForgeFS};
pub use inode::{
    group_inode, refresh_inode, repository_inode, GROUP_INODE_OFFSET, REFRESH_INODE_OFFSET,
    REPOSITORY_INODE_OFFSET, ROOT_INODE,
};
pub use mount::{mount_and_serve, parse_mount_options};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::forges::ForgeError;
use crate::git::GitClientError;

/// Name of the synthetic cache-invalidation entry in every group directory.
pub const REFRESH_ENTRY_NAME: &str = ".refresh";

/// A node of the hierarchy that can contain other nodes: a group, an
/// organization or a user.
pub trait GroupSource: Send + Sync {
    /// Forge-scoped numeric identity.
    fn group_id(&self) -> u64;

    /// Drop this node's memoized children so the next listing re-fetches.
    ///
    /// Safe to call concurrently with in-flight listings; callers observe
    /// either the pre- or post-invalidation content, never a partial state.
    fn invalidate_content_cache(&self);
}

/// A repository exposed as a symbolic link in the tree.
pub trait RepositorySource: Send + Sync {
    /// Forge-scoped numeric identity.
    fn repository_id(&self) -> u64;

    /// URL the materializer clones from.
    fn clone_url(&self) -> &str;

    /// Branch the materializer tracks.
    fn default_branch(&self) -> &str;
}

/// Child groups of a node, keyed by their forge-visible name.
pub type GroupMap = HashMap<String, Arc<dyn GroupSource>>;

/// Child repositories of a node, keyed by their forge-visible name.
pub type RepositoryMap = HashMap<String, Arc<dyn RepositorySource>>;

/// A forge client able to enumerate the hierarchy.
pub trait GitForge: Send + Sync {
    /// Top-level entries of the mount: configured groups and users, plus the
    /// authenticated user when so configured.
    fn fetch_root_group_content(&self) -> Result<GroupMap, ForgeError>;

    /// Immediate children of the group or user identified by `gid`.
    fn fetch_group_content(&self, gid: u64) -> Result<(GroupMap, RepositoryMap), ForgeError>;
}

/// The git materializer as seen from the tree.
pub trait GitClient: Send + Sync {
    /// Deterministic local path for `source`, dispatching background
    /// clone/pull work as needed. Never blocks on the git operation itself.
    fn fetch_local_repository_path(
        &self,
        source: &dyn RepositorySource,
    ) -> Result<PathBuf, GitClientError>;
}

/// Collaborators handed to the tree at mount time.
pub struct FsParam {
    pub git_forge: Arc<dyn GitForge>,
    pub git_client: Arc<dyn GitClient>,
}

/// Errors establishing or running the mount.
#[derive(Debug, Error)]
pub enum FsError {
    /// The root listing failed; the mount cannot start.
    #[error("failed to fetch root group content: {0}")]
    RootListing(#[from] ForgeError),

    /// The FUSE mount itself failed.
    #[error("mount failed: {0}")]
    Mount(#[from] std::io::Error),
}
