//! Configuration file loading for ~/.forgefs/config.ini.
//!
//! A missing file yields pure defaults; an unreadable or invalid file is a
//! startup error. Every enum-valued key (`forge`, `pull_method`, `on_clone`,
//! `archived_handling`) is validated here so bad values are reported before
//! anything is mounted.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::{Ini, Properties};
use thiserror::Error;

use super::settings::*;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or parse the config file
    #[error("failed to read config file: {0}")]
    Read(#[from] ini::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {section}.{key} = {value:?} - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl Config {
    /// Load configuration from the default path (~/.forgefs/config.ini).
    ///
    /// Returns defaults if the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path)?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("fs")) {
            let reader = SectionReader::new("fs", section);
            if let Some(mountpoint) = reader.string("mountpoint") {
                config.fs.mountpoint = Some(PathBuf::from(mountpoint));
            }
            if let Some(options) = reader.string("mountoptions") {
                config.fs.mount_options = options;
            }
            reader.parsed("forge", &mut config.fs.forge)?;
        }

        if let Some(section) = ini.section(Some("git")) {
            let reader = SectionReader::new("git", section);
            if let Some(location) = reader.string("clone_location") {
                config.git.clone_location = PathBuf::from(location);
            }
            if let Some(remote) = reader.string("remote") {
                config.git.remote = remote;
            }
            reader.parsed("on_clone", &mut config.git.on_clone)?;
            reader.boolean("auto_pull", &mut config.git.auto_pull)?;
            reader.number("depth", &mut config.git.depth)?;
            reader.number("queue_size", &mut config.git.queue_size)?;
            reader.number("worker_count", &mut config.git.worker_count)?;
        }

        if let Some(section) = ini.section(Some("gitlab")) {
            let reader = SectionReader::new("gitlab", section);
            if let Some(url) = reader.string("url") {
                config.gitlab.url = url;
            }
            if let Some(token) = reader.string("token") {
                config.gitlab.token = token;
            }
            config.gitlab.group_ids = reader.number_list("group_ids")?;
            config.gitlab.user_ids = reader.number_list("user_ids")?;
            reader.boolean("include_current_user", &mut config.gitlab.include_current_user)?;
            reader.parsed("pull_method", &mut config.gitlab.pull_method)?;
            reader.parsed("archived_handling", &mut config.gitlab.archived_handling)?;
        }

        if let Some(section) = ini.section(Some("github")) {
            let reader = SectionReader::new("github", section);
            if let Some(url) = reader.string("api_url") {
                config.github.api_url = url;
            }
            if let Some(token) = reader.string("token") {
                config.github.token = token;
            }
            config.github.org_names = reader.string_list("org_names");
            config.github.user_names = reader.string_list("user_names");
            reader.boolean("include_current_user", &mut config.github.include_current_user)?;
            reader.parsed("pull_method", &mut config.github.pull_method)?;
            reader.parsed("archived_handling", &mut config.github.archived_handling)?;
        }

        if let Some(section) = ini.section(Some("gitea")) {
            let reader = SectionReader::new("gitea", section);
            if let Some(url) = reader.string("url") {
                config.gitea.url = url;
            }
            if let Some(token) = reader.string("token") {
                config.gitea.token = token;
            }
            config.gitea.org_names = reader.string_list("org_names");
            config.gitea.user_names = reader.string_list("user_names");
            reader.boolean("include_current_user", &mut config.gitea.include_current_user)?;
            reader.parsed("pull_method", &mut config.gitea.pull_method)?;
            reader.parsed("archived_handling", &mut config.gitea.archived_handling)?;
        }

        Ok(config)
    }
}

/// Path of the default config file (~/.forgefs/config.ini).
pub fn config_file_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".forgefs")
        .join("config.ini")
}

/// Typed access to the keys of one INI section.
struct SectionReader<'a> {
    section: &'a str,
    properties: &'a Properties,
}

impl<'a> SectionReader<'a> {
    fn new(section: &'a str, properties: &'a Properties) -> Self {
        Self { section, properties }
    }

    fn invalid(&self, key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn string(&self, key: &str) -> Option<String> {
        self.properties
            .get(key)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// Comma-separated list of strings; empty items are skipped.
    fn string_list(&self, key: &str) -> Vec<String> {
        self.string(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn number_list<T: FromStr>(&self, key: &str) -> Result<Vec<T>, ConfigError> {
        self.string_list(key)
            .into_iter()
            .map(|item| {
                item.parse::<T>()
                    .map_err(|_| self.invalid(key, &item, "expected a number"))
            })
            .collect()
    }

    fn parsed<T: FromStr<Err = String>>(&self, key: &str, out: &mut T) -> Result<(), ConfigError> {
        if let Some(value) = self.string(key) {
            *out = value
                .parse::<T>()
                .map_err(|reason| self.invalid(key, &value, reason))?;
        }
        Ok(())
    }

    fn boolean(&self, key: &str, out: &mut bool) -> Result<(), ConfigError> {
        if let Some(value) = self.string(key) {
            *out = match value.as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(self.invalid(key, &value, "expected \"true\" or \"false\"")),
            };
        }
        Ok(())
    }

    fn number<T: FromStr>(&self, key: &str, out: &mut T) -> Result<(), ConfigError> {
        if let Some(value) = self.string(key) {
            *out = value
                .parse::<T>()
                .map_err(|_| self.invalid(key, &value, "expected a number"))?;
        }
        Ok(())
    }
}
