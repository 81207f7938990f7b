//! Path resolution and job dispatch.
//!
//! [`Client`] is the materializer's public face: it computes the
//! deterministic local path for a repository synchronously and dispatches the
//! clone or pull that makes that path real into the worker pool, without ever
//! blocking the caller on git or the network.

use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::coalesce::DispatchCoalescer;
use super::job::{CloneJob, GitJob, PullJob};
use super::worker;
use crate::config::GitSettings;
use crate::fstree::{GitClient, RepositorySource};

/// Hostnames embedded in HTTP and SSH clone URLs alike.
const HOSTNAME_PATTERN: &str = r"([a-z0-9-]+\.)+[a-z0-9-]+";

/// Dispatches for the same repository inside this window coalesce into one.
const DISPATCH_WINDOW: Duration = Duration::from_secs(1);

/// Errors from path resolution and dispatch.
#[derive(Debug, Error)]
pub enum GitClientError {
    /// No hostname could be extracted, so the repository has no place in the
    /// local path namespace.
    #[error("failed to match a valid hostname from {0:?}")]
    InvalidCloneUrl(String),

    /// The job queue is saturated. The path is still valid and returned
    /// alongside; the job is simply not queued this round.
    #[error("git job queue is full, dropped dispatch for {path:?}")]
    QueueFull { path: PathBuf },

    /// The git binary is missing or unusable.
    #[error("git is not usable: {0}")]
    GitUnavailable(String),

    /// Client construction failed.
    #[error("failed to set up git client: {0}")]
    Setup(String),
}

/// The git materializer client.
pub struct Client {
    settings: GitSettings,
    hostname_pattern: Regex,
    coalescer: DispatchCoalescer,
    queue: mpsc::Sender<GitJob>,
}

impl Client {
    /// Build the client and start its worker pool.
    ///
    /// Probes `git --version` so a missing binary fails at startup instead of
    /// inside the first background job. Must be called within a tokio
    /// runtime.
    pub fn new(settings: GitSettings) -> Result<Arc<Self>, GitClientError> {
        probe_git_version()?;

        let (queue, jobs) = mpsc::channel(settings.queue_size.max(1));
        worker::spawn_dispatcher(jobs, settings.worker_count.max(1));

        Ok(Arc::new(Self::from_parts(settings, queue)?))
    }

    fn from_parts(
        settings: GitSettings,
        queue: mpsc::Sender<GitJob>,
    ) -> Result<Self, GitClientError> {
        let hostname_pattern =
            Regex::new(HOSTNAME_PATTERN).map_err(|error| GitClientError::Setup(error.to_string()))?;
        Ok(Self {
            settings,
            hostname_pattern,
            coalescer: DispatchCoalescer::new(DISPATCH_WINDOW),
            queue,
        })
    }

    fn dispatch(
        &self,
        repository_id: u64,
        job: GitJob,
        local_path: &std::path::Path,
    ) -> Result<(), GitClientError> {
        if self.queue.try_send(job).is_err() {
            // Reopen the coalescer slot so the next access retries.
            self.coalescer.clear(repository_id);
            return Err(GitClientError::QueueFull {
                path: local_path.to_path_buf(),
            });
        }
        Ok(())
    }
}

impl GitClient for Client {
    fn fetch_local_repository_path(
        &self,
        source: &dyn RepositorySource,
    ) -> Result<PathBuf, GitClientError> {
        let repository_id = source.repository_id();
        let clone_url = source.clone_url();
        let default_branch = source.default_branch();

        let hostname = self
            .hostname_pattern
            .find(clone_url)
            .ok_or_else(|| GitClientError::InvalidCloneUrl(clone_url.to_string()))?
            .as_str();

        let local_path = self
            .settings
            .clone_location
            .join(hostname)
            .join(repository_id.to_string());

        if !local_path.exists() {
            if self.coalescer.should_dispatch(repository_id) {
                let job = GitJob::Clone(CloneJob {
                    clone_url: clone_url.to_string(),
                    default_branch: default_branch.to_string(),
                    dst: local_path.clone(),
                    mode: self.settings.on_clone,
                    remote: self.settings.remote.clone(),
                    depth: self.settings.depth,
                });
                self.dispatch(repository_id, job, &local_path)?;
            }
        } else if self.settings.auto_pull && self.coalescer.should_dispatch(repository_id) {
            let job = GitJob::Pull(PullJob {
                repo_path: local_path.clone(),
                default_branch: default_branch.to_string(),
                remote: self.settings.remote.clone(),
                depth: self.settings.depth,
            });
            self.dispatch(repository_id, job, &local_path)?;
        }

        Ok(local_path)
    }
}

/// Check that the git binary runs, logging the detected version.
fn probe_git_version() -> Result<(), GitClientError> {
    let output = std::process::Command::new("git")
        .arg("--version")
        .output()
        .map_err(|error| GitClientError::GitUnavailable(error.to_string()))?;
    if !output.status.success() {
        return Err(GitClientError::GitUnavailable(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    match parse_git_version(raw.trim()) {
        Some((major, minor, patch)) => info!(major, minor, patch = %patch, "detected git version"),
        None => warn!(output = %raw.trim(), "failed to parse git version"),
    }
    Ok(())
}

fn parse_git_version(raw: &str) -> Option<(u32, u32, String)> {
    let pattern = Regex::new(r"([0-9]+)\.([0-9]+)\.(\S+)").ok()?;
    let captures = pattern.captures(raw)?;
    let major = captures.get(1)?.as_str().parse().ok()?;
    let minor = captures.get(2)?.as_str().parse().ok()?;
    let patch = captures.get(3)?.as_str().to_string();
    Some((major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CloneMode;

    struct FakeRepository {
        id: u64,
        clone_url: String,
    }

    impl FakeRepository {
        fn new(id: u64, clone_url: &str) -> Self {
            Self {
                id,
                clone_url: clone_url.to_string(),
            }
        }
    }

    impl RepositorySource for FakeRepository {
        fn repository_id(&self) -> u64 {
            self.id
        }

        fn clone_url(&self) -> &str {
            &self.clone_url
        }

        fn default_branch(&self) -> &str {
            "master"
        }
    }

    fn client_with_queue(
        settings: GitSettings,
        capacity: usize,
    ) -> (Client, mpsc::Receiver<GitJob>) {
        let (queue, jobs) = mpsc::channel(capacity);
        (Client::from_parts(settings, queue).unwrap(), jobs)
    }

    fn settings_in(dir: &tempfile::TempDir) -> GitSettings {
        GitSettings {
            clone_location: dir.path().to_path_buf(),
            ..GitSettings::default()
        }
    }

    #[test]
    fn test_path_is_deterministic_and_hostname_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _jobs) = client_with_queue(settings_in(&dir), 8);

        let repository = FakeRepository::new(7, "https://git.example.com/team/svc.git");
        let path = client.fetch_local_repository_path(&repository).unwrap();
        assert_eq!(path, dir.path().join("git.example.com").join("7"));

        // Same input, same path.
        let again = client.fetch_local_repository_path(&repository).unwrap();
        assert_eq!(path, again);
    }

    #[test]
    fn test_ssh_clone_url_hostname_is_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _jobs) = client_with_queue(settings_in(&dir), 8);

        let repository = FakeRepository::new(7, "git@gitlab.example.net:team/svc.git");
        let path = client.fetch_local_repository_path(&repository).unwrap();
        assert_eq!(path, dir.path().join("gitlab.example.net").join("7"));
    }

    #[test]
    fn test_unparseable_clone_url_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (client, mut jobs) = client_with_queue(settings_in(&dir), 8);

        let repository = FakeRepository::new(7, "garbage");
        let error = client.fetch_local_repository_path(&repository).unwrap_err();
        assert!(matches!(error, GitClientError::InvalidCloneUrl(_)));
        assert!(jobs.try_recv().is_err(), "no job may be dispatched");
    }

    #[test]
    fn test_burst_of_resolutions_enqueues_one_clone() {
        let dir = tempfile::tempdir().unwrap();
        let (client, mut jobs) = client_with_queue(settings_in(&dir), 8);

        let repository = FakeRepository::new(7, "https://git.example.com/team/svc.git");
        for _ in 0..5 {
            client.fetch_local_repository_path(&repository).unwrap();
        }

        assert!(matches!(jobs.try_recv(), Ok(GitJob::Clone(_))));
        assert!(jobs.try_recv().is_err(), "duplicates must coalesce");
    }

    #[test]
    fn test_clone_job_carries_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(&dir);
        settings.on_clone = CloneMode::Clone;
        settings.remote = String::from("upstream");
        settings.depth = 3;
        let (client, mut jobs) = client_with_queue(settings, 8);

        let repository = FakeRepository::new(7, "https://git.example.com/team/svc.git");
        client.fetch_local_repository_path(&repository).unwrap();

        let Ok(GitJob::Clone(job)) = jobs.try_recv() else {
            panic!("expected a clone job");
        };
        assert_eq!(job.clone_url, "https://git.example.com/team/svc.git");
        assert_eq!(job.default_branch, "master");
        assert_eq!(job.mode, CloneMode::Clone);
        assert_eq!(job.remote, "upstream");
        assert_eq!(job.depth, 3);
        assert_eq!(job.dst, dir.path().join("git.example.com").join("7"));
    }

    #[test]
    fn test_existing_path_without_auto_pull_dispatches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (client, mut jobs) = client_with_queue(settings_in(&dir), 8);

        std::fs::create_dir_all(dir.path().join("git.example.com").join("7")).unwrap();
        let repository = FakeRepository::new(7, "https://git.example.com/team/svc.git");
        client.fetch_local_repository_path(&repository).unwrap();
        assert!(jobs.try_recv().is_err());
    }

    #[test]
    fn test_existing_path_with_auto_pull_dispatches_pull() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(&dir);
        settings.auto_pull = true;
        let (client, mut jobs) = client_with_queue(settings, 8);

        std::fs::create_dir_all(dir.path().join("git.example.com").join("7")).unwrap();
        let repository = FakeRepository::new(7, "https://git.example.com/team/svc.git");
        client.fetch_local_repository_path(&repository).unwrap();

        let Ok(GitJob::Pull(job)) = jobs.try_recv() else {
            panic!("expected a pull job");
        };
        assert_eq!(job.repo_path, dir.path().join("git.example.com").join("7"));
        assert!(jobs.try_recv().is_err(), "duplicates must coalesce");
    }

    #[test]
    fn test_queue_saturation_returns_path_in_error_and_retries() {
        let dir = tempfile::tempdir().unwrap();
        let (client, mut jobs) = client_with_queue(settings_in(&dir), 1);

        let first = FakeRepository::new(7, "https://git.example.com/team/a.git");
        let second = FakeRepository::new(8, "https://git.example.com/team/b.git");

        client.fetch_local_repository_path(&first).unwrap();
        let error = client.fetch_local_repository_path(&second).unwrap_err();
        let GitClientError::QueueFull { path } = error else {
            panic!("expected queue saturation");
        };
        assert_eq!(path, dir.path().join("git.example.com").join("8"));

        // Drain the queue; the dropped dispatch must be retried on the next
        // access because saturation cleared its coalescer slot.
        assert!(jobs.try_recv().is_ok());
        client.fetch_local_repository_path(&second).unwrap();
        assert!(matches!(jobs.try_recv(), Ok(GitJob::Clone(_))));
    }

    #[test]
    fn test_git_version_parsing() {
        assert_eq!(
            parse_git_version("git version 2.43.0"),
            Some((2, 43, String::from("0")))
        );
        assert_eq!(
            parse_git_version("git version 2.39.3 (Apple Git-146)"),
            Some((2, 39, String::from("3")))
        );
        assert_eq!(parse_git_version("not a version"), None);
    }
}
