//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file. These are
//! pure data types; parsing and validation live in [`super::file`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Complete application configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Filesystem settings
    pub fs: FsSettings,
    /// Git materializer settings
    pub git: GitSettings,
    /// GitLab forge settings
    pub gitlab: GitlabSettings,
    /// GitHub forge settings
    pub github: GithubSettings,
    /// Gitea forge settings
    pub gitea: GiteaSettings,
}

/// Which forge the mount talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForgeKind {
    #[default]
    Gitlab,
    Github,
    Gitea,
}

impl FromStr for ForgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gitlab" => Ok(Self::Gitlab),
            "github" => Ok(Self::Github),
            "gitea" => Ok(Self::Gitea),
            _ => Err(String::from("must be one of \"gitlab\", \"github\" or \"gitea\"")),
        }
    }
}

impl fmt::Display for ForgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gitlab => write!(f, "gitlab"),
            Self::Github => write!(f, "github"),
            Self::Gitea => write!(f, "gitea"),
        }
    }
}

/// Protocol used for clone URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullMethod {
    #[default]
    Http,
    Ssh,
}

impl FromStr for PullMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Self::Http),
            "ssh" => Ok(Self::Ssh),
            _ => Err(String::from("must be either \"http\" or \"ssh\"")),
        }
    }
}

impl fmt::Display for PullMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Ssh => write!(f, "ssh"),
        }
    }
}

/// How a repository is first materialized on disk.
///
/// `Init` configures an empty local repository pointing at the remote without
/// fetching any objects; `Clone` performs a real clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloneMode {
    #[default]
    Init,
    Clone,
}

impl FromStr for CloneMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "clone" => Ok(Self::Clone),
            _ => Err(String::from("must be either \"init\" or \"clone\"")),
        }
    }
}

impl fmt::Display for CloneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Clone => write!(f, "clone"),
        }
    }
}

/// How archived repositories appear in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchivedHandling {
    /// List under the unmodified name.
    Show,
    /// List under a `.`-prefixed name so conventional listings skip it.
    #[default]
    Hide,
    /// Drop from listings and lookups entirely.
    Ignore,
}

impl FromStr for ArchivedHandling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "show" => Ok(Self::Show),
            "hide" => Ok(Self::Hide),
            "ignore" => Ok(Self::Ignore),
            _ => Err(String::from("must be one of \"show\", \"hide\" or \"ignore\"")),
        }
    }
}

impl fmt::Display for ArchivedHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Show => write!(f, "show"),
            Self::Hide => write!(f, "hide"),
            Self::Ignore => write!(f, "ignore"),
        }
    }
}

/// Filesystem configuration.
#[derive(Debug, Clone)]
pub struct FsSettings {
    /// Where the filesystem is mounted. The CLI argument takes precedence.
    pub mountpoint: Option<PathBuf>,
    /// Comma-separated mount options, see mount.fuse(8).
    pub mount_options: String,
    /// Which forge client to construct.
    pub forge: ForgeKind,
}

impl Default for FsSettings {
    fn default() -> Self {
        Self {
            mountpoint: None,
            mount_options: String::from("nodev,nosuid"),
            forge: ForgeKind::default(),
        }
    }
}

/// Git materializer configuration.
#[derive(Debug, Clone)]
pub struct GitSettings {
    /// Root directory for local clones.
    pub clone_location: PathBuf,
    /// Name of the remote configured in local clones.
    pub remote: String,
    /// Strategy used when a repository is first materialized.
    pub on_clone: CloneMode,
    /// Pull already-present repositories on access.
    pub auto_pull: bool,
    /// Clone/pull depth, 0 for full history.
    pub depth: u32,
    /// Capacity of the git job queue.
    pub queue_size: usize,
    /// Number of concurrent git workers.
    pub worker_count: usize,
}

impl Default for GitSettings {
    fn default() -> Self {
        let clone_location = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("forgefs");

        Self {
            clone_location,
            remote: String::from("origin"),
            on_clone: CloneMode::default(),
            auto_pull: false,
            depth: 0,
            queue_size: 200,
            worker_count: 5,
        }
    }
}

/// GitLab forge configuration.
#[derive(Debug, Clone)]
pub struct GitlabSettings {
    /// Base URL of the GitLab instance.
    pub url: String,
    /// API token, empty for anonymous access.
    pub token: String,
    /// Numeric IDs of the groups listed at the mount root.
    pub group_ids: Vec<u64>,
    /// Numeric IDs of the users listed at the mount root.
    pub user_ids: Vec<u64>,
    /// Also list the authenticated user at the mount root.
    pub include_current_user: bool,
    /// Protocol of the clone URLs handed to the materializer.
    pub pull_method: PullMethod,
    /// How archived projects appear in the tree.
    pub archived_handling: ArchivedHandling,
}

impl Default for GitlabSettings {
    fn default() -> Self {
        Self {
            url: String::from("https://gitlab.com"),
            token: String::new(),
            group_ids: Vec::new(),
            user_ids: Vec::new(),
            include_current_user: true,
            pull_method: PullMethod::default(),
            archived_handling: ArchivedHandling::default(),
        }
    }
}

/// GitHub forge configuration.
#[derive(Debug, Clone)]
pub struct GithubSettings {
    /// Base URL of the REST API, override for GitHub Enterprise.
    pub api_url: String,
    /// API token, empty for anonymous access.
    pub token: String,
    /// Logins of the organizations listed at the mount root.
    pub org_names: Vec<String>,
    /// Logins of the users listed at the mount root.
    pub user_names: Vec<String>,
    /// Also list the authenticated user at the mount root.
    pub include_current_user: bool,
    /// Protocol of the clone URLs handed to the materializer.
    pub pull_method: PullMethod,
    /// How archived repositories appear in the tree.
    pub archived_handling: ArchivedHandling,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_url: String::from("https://api.github.com"),
            token: String::new(),
            org_names: Vec::new(),
            user_names: Vec::new(),
            include_current_user: true,
            pull_method: PullMethod::default(),
            archived_handling: ArchivedHandling::default(),
        }
    }
}

/// Gitea forge configuration.
#[derive(Debug, Clone)]
pub struct GiteaSettings {
    /// Base URL of the Gitea instance.
    pub url: String,
    /// API token, empty for anonymous access.
    pub token: String,
    /// Names of the organizations listed at the mount root.
    pub org_names: Vec<String>,
    /// Names of the users listed at the mount root.
    pub user_names: Vec<String>,
    /// Also list the authenticated user at the mount root.
    pub include_current_user: bool,
    /// Protocol of the clone URLs handed to the materializer.
    pub pull_method: PullMethod,
    /// How archived repositories appear in the tree.
    pub archived_handling: ArchivedHandling,
}

impl Default for GiteaSettings {
    fn default() -> Self {
        Self {
            url: String::from("https://gitea.com"),
            token: String::new(),
            org_names: Vec::new(),
            user_names: Vec::new(),
            include_current_user: true,
            pull_method: PullMethod::default(),
            archived_handling: ArchivedHandling::default(),
        }
    }
}
