//! Forge clients.
//!
//! [`ForgeApi`] is the minimal remote surface a forge has to provide: resolve
//! the authenticated user, resolve a configured root entry, and list one page
//! of a namespace's children. Everything above it - response caching, page
//! walking, archived-repository policy, clone-URL selection - is shared and
//! lives in the generic [`Client`], which implements the
//! [`crate::fstree::GitForge`] contract for every forge.

mod client;
mod gitea;
mod github;
mod gitlab;
mod rest;

pub use client::{Client, ClientOptions, Group, Repository};
pub use gitea::GiteaApi;
pub use github::GithubApi;
pub use gitlab::GitlabApi;

use thiserror::Error;

/// Errors from the remote forge API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport or decoding failure
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status code
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    /// The configured token cannot be sent as a header
    #[error("invalid api token")]
    InvalidToken,

    /// A configured root entry could not be understood
    #[error("invalid root entry {entry:?}: {reason}")]
    InvalidEntry { entry: String, reason: String },
}

/// Errors crossing the `GitForge` boundary.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("forge request failed: {0}")]
    Api(#[from] ApiError),

    /// The group is not (or no longer) known to this client.
    #[error("unknown group id {0}")]
    UnknownGroup(u64),
}

/// What a namespace is on the remote side. Listing semantics differ: users
/// never have child groups, and some forges use different endpoints for user
/// repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceKind {
    Group,
    User,
}

/// A group, organization or user as reported by the forge.
#[derive(Debug, Clone)]
pub struct RemoteGroup {
    pub id: u64,
    /// Path segment used as the directory name.
    pub name: String,
    pub kind: NamespaceKind,
}

/// A repository as reported by the forge, before policy conversion.
#[derive(Debug, Clone)]
pub struct RemoteRepository {
    pub id: u64,
    /// Path segment used as the link name.
    pub path: String,
    pub clone_url_http: String,
    pub clone_url_ssh: String,
    /// `None` or empty when the forge reports no default branch.
    pub default_branch: Option<String>,
    pub archived: bool,
}

/// One page of a paginated listing.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Next page number, `None` when the walk is complete.
    pub next: Option<u32>,
}

impl<T> Page<T> {
    /// A page with nothing in it, ending the walk.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next: None,
        }
    }
}

/// The per-forge remote API surface.
///
/// Implementations perform exactly one remote call per method; pagination
/// walking and caching are the caller's concern.
pub trait ForgeApi: Send + Sync {
    /// The authenticated user, used when `include_current_user` is set.
    fn current_user(&self) -> Result<RemoteGroup, ApiError>;

    /// Resolve a configured root group/organization entry (numeric ID or
    /// name, depending on the forge).
    fn root_group(&self, entry: &str) -> Result<RemoteGroup, ApiError>;

    /// Resolve a configured root user entry.
    fn root_user(&self, entry: &str) -> Result<RemoteGroup, ApiError>;

    /// Re-resolve a group by ID, for forges that support it. Used when a
    /// nested group was evicted from the cache by an invalidation.
    fn group_by_id(&self, _gid: u64) -> Result<Option<RemoteGroup>, ApiError> {
        Ok(None)
    }

    /// One page of `group`'s child groups.
    fn child_groups(&self, group: &RemoteGroup, page: u32) -> Result<Page<RemoteGroup>, ApiError>;

    /// One page of `group`'s repositories.
    fn repositories(
        &self,
        group: &RemoteGroup,
        page: u32,
    ) -> Result<Page<RemoteRepository>, ApiError>;
}
