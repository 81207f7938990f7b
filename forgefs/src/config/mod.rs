//! Configuration for the forgefs mount process.
//!
//! Settings are grouped by the component they configure: one `[section]` of
//! the INI config file per struct. [`file`] handles loading and validation,
//! [`settings`] holds the pure data types and their defaults.

mod file;
mod settings;

pub use file::{config_file_path, ConfigError};
pub use settings::{
    ArchivedHandling, CloneMode, Config, ForgeKind, FsSettings, GitSettings, GiteaSettings,
    GithubSettings, GitlabSettings, PullMethod,
};
