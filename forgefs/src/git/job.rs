//! Clone and pull jobs.
//!
//! Local-only operations (repository init, remote and branch wiring, HEAD
//! inspection) go through libgit2 so init mode provably never talks to the
//! network; operations that do contact the remote (clone, pull) shell out to
//! the git binary. Every job gets a single retry; a second failure is logged
//! and dropped, never surfaced to the filesystem caller.

use std::path::PathBuf;

use thiserror::Error;
use tokio::process::Command;
use tokio::task;
use tracing::{debug, error, info, warn};

use crate::config::CloneMode;

/// Errors from executing a clone or pull.
#[derive(Debug, Error)]
pub enum GitJobError {
    /// The git binary reported a failure
    #[error("{command} failed: {stderr}")]
    Command { command: String, stderr: String },

    /// A libgit2 operation failed
    #[error(transparent)]
    Repository(#[from] git2::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking helper task was cancelled or panicked
    #[error("git worker task failed: {0}")]
    Task(#[from] task::JoinError),
}

/// What a finished job actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Real clone completed.
    Cloned,
    /// Init-mode clone: repository, remote and branch wired up, no objects
    /// fetched.
    Initialized,
    /// Pull completed.
    Pulled,
    /// Pull skipped because the local clone is not on the default branch.
    Skipped,
    /// Clone target already existed when the job ran.
    AlreadyPresent,
}

/// A unit of work for the materializer's worker pool.
pub enum GitJob {
    Clone(CloneJob),
    Pull(PullJob),
}

impl GitJob {
    /// Execute with the single-retry policy. Failures never escape: the path
    /// was already handed to the caller optimistically, so a broken job only
    /// means the path stays absent or stale until a future access retries.
    pub async fn run(&self) {
        for attempt in 0..2 {
            match self.execute().await {
                Ok(outcome) => {
                    info!(job = %self.describe(), ?outcome, "git job finished");
                    return;
                }
                Err(error) if attempt == 0 => {
                    warn!(job = %self.describe(), %error, "git job failed, retrying");
                }
                Err(error) => {
                    error!(job = %self.describe(), %error, "git job failed after retry, dropping");
                }
            }
        }
    }

    pub async fn execute(&self) -> Result<JobOutcome, GitJobError> {
        match self {
            Self::Clone(job) => job.execute().await,
            Self::Pull(job) => job.execute().await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Clone(job) => format!("clone {}", job.dst.display()),
            Self::Pull(job) => format!("pull {}", job.repo_path.display()),
        }
    }
}

/// Materialize a repository that does not exist locally yet.
pub struct CloneJob {
    pub clone_url: String,
    pub default_branch: String,
    pub dst: PathBuf,
    pub mode: CloneMode,
    pub remote: String,
    /// 0 for full history.
    pub depth: u32,
}

impl CloneJob {
    pub async fn execute(&self) -> Result<JobOutcome, GitJobError> {
        // Re-check at execution time: an earlier job or a previous run of the
        // process may already have materialized the path.
        if self.dst.exists() {
            debug!(dst = %self.dst.display(), "clone target already present");
            return Ok(JobOutcome::AlreadyPresent);
        }
        if let Some(parent) = self.dst.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match self.mode {
            CloneMode::Init => self.init_repository().await,
            CloneMode::Clone => self.clone_repository().await,
        }
    }

    /// Wire up an empty repository without fetching anything: remote, branch
    /// tracking configuration, and HEAD pointing at the (unborn) default
    /// branch. The clone stays content-free until a pull happens.
    async fn init_repository(&self) -> Result<JobOutcome, GitJobError> {
        info!(url = %self.clone_url, dst = %self.dst.display(), "initializing local repository");

        let dst = self.dst.clone();
        let clone_url = self.clone_url.clone();
        let remote = self.remote.clone();
        let branch = self.default_branch.clone();

        task::spawn_blocking(move || -> Result<JobOutcome, GitJobError> {
            let repository = git2::Repository::init(&dst)?;
            repository.remote(&remote, &clone_url)?;

            let mut config = repository.config()?;
            config.set_str(&format!("branch.{branch}.remote"), &remote)?;
            config.set_str(&format!("branch.{branch}.merge"), &format!("refs/heads/{branch}"))?;

            repository.set_head(&format!("refs/heads/{branch}"))?;
            Ok(JobOutcome::Initialized)
        })
        .await?
    }

    async fn clone_repository(&self) -> Result<JobOutcome, GitJobError> {
        info!(url = %self.clone_url, dst = %self.dst.display(), "cloning repository");

        let mut command = Command::new("git");
        command.arg("clone").arg("--origin").arg(&self.remote);
        if self.depth > 0 {
            command.arg("--depth").arg(self.depth.to_string());
        }
        command.arg("--branch").arg(&self.default_branch);
        command.arg("--").arg(&self.clone_url).arg(&self.dst);

        run_git(command).await?;
        Ok(JobOutcome::Cloned)
    }
}

/// Refresh a repository that already exists locally.
pub struct PullJob {
    pub repo_path: PathBuf,
    pub default_branch: String,
    pub remote: String,
    /// 0 for full history.
    pub depth: u32,
}

impl PullJob {
    pub async fn execute(&self) -> Result<JobOutcome, GitJobError> {
        // A clone that was manually moved to another branch must not be
        // force-synced back.
        match self.current_branch().await? {
            Some(branch) if branch == self.default_branch => {}
            current => {
                info!(
                    repo = %self.repo_path.display(),
                    current = current.as_deref().unwrap_or("<none>"),
                    default = %self.default_branch,
                    "skipping pull: local repository is not on the default branch"
                );
                return Ok(JobOutcome::Skipped);
            }
        }

        info!(repo = %self.repo_path.display(), "pulling repository");
        let mut command = Command::new("git");
        command.current_dir(&self.repo_path);
        command.arg("pull");
        if self.depth > 0 {
            command.arg("--depth").arg(self.depth.to_string());
        }
        command.arg("--").arg(&self.remote).arg(&self.default_branch);

        run_git(command).await?;
        Ok(JobOutcome::Pulled)
    }

    /// Name of the checked-out branch, or `None` for a detached or unborn
    /// HEAD.
    async fn current_branch(&self) -> Result<Option<String>, GitJobError> {
        let path = self.repo_path.clone();
        task::spawn_blocking(move || -> Result<Option<String>, GitJobError> {
            let repository = git2::Repository::open(&path)?;
            let branch = match repository.head() {
                Ok(head) if head.is_branch() => head.shorthand().map(str::to_string),
                _ => None,
            };
            Ok(branch)
        })
        .await?
    }
}

/// Run a git command, turning a non-zero exit into an error carrying stderr.
async fn run_git(mut command: Command) -> Result<String, GitJobError> {
    let rendered = render(&command);
    debug!(command = %rendered, "running git");

    let output = command.output().await?;
    if !output.status.success() {
        return Err(GitJobError::Command {
            command: rendered,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn render(command: &Command) -> String {
    let std_command = command.as_std();
    let mut rendered = std_command.get_program().to_string_lossy().into_owned();
    for arg in std_command.get_args() {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clone_job_short_circuits_on_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let job = CloneJob {
            clone_url: String::from("https://invalid.example.com/repo.git"),
            default_branch: String::from("master"),
            dst: dir.path().to_path_buf(),
            mode: CloneMode::Clone,
            remote: String::from("origin"),
            depth: 0,
        };
        // The URL is bogus; the job must not even try to use it.
        assert_eq!(job.execute().await.unwrap(), JobOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn test_init_mode_wires_remote_and_branch() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("git.example.com").join("7");
        let job = CloneJob {
            clone_url: String::from("https://git.example.com/team/svc.git"),
            default_branch: String::from("main"),
            dst: dst.clone(),
            mode: CloneMode::Init,
            remote: String::from("origin"),
            depth: 0,
        };
        assert_eq!(job.execute().await.unwrap(), JobOutcome::Initialized);

        let repository = git2::Repository::open(&dst).unwrap();
        let remote = repository.find_remote("origin").unwrap();
        assert_eq!(remote.url(), Some("https://git.example.com/team/svc.git"));

        let config = repository.config().unwrap().snapshot().unwrap();
        assert_eq!(config.get_str("branch.main.remote").unwrap(), "origin");
        assert_eq!(config.get_str("branch.main.merge").unwrap(), "refs/heads/main");

        let head = repository.find_reference("HEAD").unwrap();
        assert_eq!(head.symbolic_target(), Some("refs/heads/main"));
    }

    #[tokio::test]
    async fn test_init_mode_is_idempotent_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("repo");
        let job = CloneJob {
            clone_url: String::from("https://git.example.com/team/svc.git"),
            default_branch: String::from("main"),
            dst,
            mode: CloneMode::Init,
            remote: String::from("origin"),
            depth: 0,
        };
        assert_eq!(job.execute().await.unwrap(), JobOutcome::Initialized);
        assert_eq!(job.execute().await.unwrap(), JobOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn test_pull_skips_when_head_is_not_on_default_branch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo");
        // Freshly initialized repository: HEAD is unborn, which counts as
        // "not on the default branch".
        git2::Repository::init(&path).unwrap();

        let job = PullJob {
            repo_path: path,
            default_branch: String::from("production"),
            remote: String::from("origin"),
            depth: 0,
        };
        assert_eq!(job.execute().await.unwrap(), JobOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_pull_on_missing_repository_is_an_error() {
        let job = PullJob {
            repo_path: PathBuf::from("/nonexistent/forgefs/repo"),
            default_branch: String::from("master"),
            remote: String::from("origin"),
            depth: 0,
        };
        assert!(job.execute().await.is_err());
    }

    #[tokio::test]
    async fn test_run_surfaces_nothing_on_repeated_failure() {
        // A job with an unreachable repository fails twice and is dropped;
        // run() must not panic or propagate.
        let job = GitJob::Pull(PullJob {
            repo_path: PathBuf::from("/nonexistent/forgefs/repo"),
            default_branch: String::from("master"),
            remote: String::from("origin"),
            depth: 0,
        });
        job.run().await;
    }
}
