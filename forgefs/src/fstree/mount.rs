//! Mount lifecycle: option parsing, session start, signal-driven teardown.

use std::path::Path;

use fuser::MountOption;
use tracing::{error, info};

use super::{ForgeFS, FsError};

/// Parse a comma-separated mount option string into fuser options.
///
/// Unrecognized options pass through verbatim so filesystem-agnostic flags
/// from mount.fuse(8) keep working.
pub fn parse_mount_options(raw: &str) -> Vec<MountOption> {
    raw.split(',')
        .map(str::trim)
        .filter(|option| !option.is_empty())
        .map(|option| match option {
            "dev" => MountOption::Dev,
            "nodev" => MountOption::NoDev,
            "suid" => MountOption::Suid,
            "nosuid" => MountOption::NoSuid,
            "ro" => MountOption::RO,
            "rw" => MountOption::RW,
            "exec" => MountOption::Exec,
            "noexec" => MountOption::NoExec,
            "atime" => MountOption::Atime,
            "noatime" => MountOption::NoAtime,
            "dirsync" => MountOption::DirSync,
            "sync" => MountOption::Sync,
            "async" => MountOption::Async,
            "allow_other" => MountOption::AllowOther,
            "allow_root" => MountOption::AllowRoot,
            "auto_unmount" => MountOption::AutoUnmount,
            "default_permissions" => MountOption::DefaultPermissions,
            other => MountOption::CUSTOM(other.to_string()),
        })
        .collect()
}

/// Mount the tree at `mountpoint` and serve until SIGINT or SIGTERM.
///
/// The filesystem is built by the caller ([`ForgeFS::new`] performs the
/// root listing, which talks to the forge and must not run on a runtime
/// thread). Outstanding git jobs are abandoned at teardown.
pub async fn mount_and_serve(
    mountpoint: &Path,
    options: &str,
    filesystem: ForgeFS,
) -> Result<(), FsError> {
    info!(mountpoint = %mountpoint.display(), "mounting");

    let mut mount_options = vec![MountOption::FSName(String::from("forgefs"))];
    mount_options.extend(parse_mount_options(options));

    let session = fuser::spawn_mount2(filesystem, mountpoint, &mount_options)?;
    info!("mounted and ready to use");

    wait_for_shutdown().await;

    info!("unmounting");
    drop(session);
    Ok(())
}

async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(error) => {
            error!(%error, "failed to install SIGTERM handler, serving until interrupt");
            if let Err(error) = tokio::signal::ctrl_c().await {
                error!(%error, "failed to listen for interrupt");
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("caught interrupt signal"),
                Err(error) => error!(%error, "failed to listen for interrupt"),
            }
        }
        _ = terminate.recv() => info!("caught terminate signal"),
    }
}
