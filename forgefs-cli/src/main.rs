//! forgefs CLI - mount a code-hosting forge as a filesystem.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::error;

use forgefs::config::{Config, ForgeKind};
use forgefs::forges::{self, GiteaApi, GithubApi, GitlabApi};
use forgefs::fstree::{self, ForgeFS, FsParam, GitForge};
use forgefs::{git, logging};

#[derive(Parser)]
#[command(name = "forgefs", version = forgefs::VERSION)]
#[command(about = "Mount a code-hosting forge as a filesystem of git repositories", long_about = None)]
struct Args {
    /// Path where the filesystem is mounted. Overrides the config file.
    mountpoint: Option<PathBuf>,

    /// Path to the config file (default: ~/.forgefs/config.ini)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Filesystem mount options, comma-separated. See mount.fuse(8)
    #[arg(short = 'o', long = "options")]
    mount_options: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() {
    let args = Args::parse();
    logging::init(args.debug);

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            process::exit(1);
        }
    };

    let Some(mountpoint) = args.mountpoint.or_else(|| config.fs.mountpoint.clone()) else {
        eprintln!(
            "Mountpoint is not configured in the config file and missing from the command line"
        );
        eprintln!("USAGE:\n    forgefs [OPTIONS] [MOUNTPOINT]");
        process::exit(2);
    };
    let mount_options = args
        .mount_options
        .unwrap_or_else(|| config.fs.mount_options.clone());

    // The git worker pool lives on the runtime; everything that talks to the
    // forge over blocking HTTP (client construction, root listing) stays on
    // this thread.
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to start runtime: {error}");
            process::exit(1);
        }
    };

    let git_client = {
        let _runtime = runtime.enter();
        match git::Client::new(config.git.clone()) {
            Ok(client) => client,
            Err(error) => {
                eprintln!("{error}");
                process::exit(1);
            }
        }
    };

    let git_forge = match build_forge(&config) {
        Ok(forge) => forge,
        Err(error) => {
            eprintln!("{error}");
            process::exit(1);
        }
    };

    let filesystem = match ForgeFS::new(FsParam {
        git_forge,
        git_client,
    }) {
        Ok(filesystem) => filesystem,
        Err(error) => {
            eprintln!("{error}");
            process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(fstree::mount_and_serve(
        &mountpoint,
        &mount_options,
        filesystem,
    )) {
        error!(error = %err, "mount failed");
        process::exit(1);
    }
}

/// Construct the forge client selected by `fs.forge`.
fn build_forge(config: &Config) -> Result<Arc<dyn GitForge>, forges::ApiError> {
    match config.fs.forge {
        ForgeKind::Gitlab => {
            let settings = &config.gitlab;
            let api = GitlabApi::new(settings)?;
            let options = forges::ClientOptions {
                pull_method: settings.pull_method,
                archived_handling: settings.archived_handling,
                root_groups: settings.group_ids.iter().map(u64::to_string).collect(),
                root_users: settings.user_ids.iter().map(u64::to_string).collect(),
                include_current_user: settings.include_current_user,
            };
            Ok(Arc::new(forges::Client::new(api, options)))
        }
        ForgeKind::Github => {
            let settings = &config.github;
            let api = GithubApi::new(settings)?;
            let options = forges::ClientOptions {
                pull_method: settings.pull_method,
                archived_handling: settings.archived_handling,
                root_groups: settings.org_names.clone(),
                root_users: settings.user_names.clone(),
                include_current_user: settings.include_current_user,
            };
            Ok(Arc::new(forges::Client::new(api, options)))
        }
        ForgeKind::Gitea => {
            let settings = &config.gitea;
            let api = GiteaApi::new(settings)?;
            let options = forges::ClientOptions {
                pull_method: settings.pull_method,
                archived_handling: settings.archived_handling,
                root_groups: settings.org_names.clone(),
                root_users: settings.user_names.clone(),
                include_current_user: settings.include_current_user,
            };
            Ok(Arc::new(forges::Client::new(api, options)))
        }
    }
}
