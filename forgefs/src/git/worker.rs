//! Fixed-size worker pool over the bounded job queue.
//!
//! One dispatcher task drains the queue; each job runs in its own task
//! holding a semaphore permit, so at most `worker_count` jobs execute
//! concurrently while the queue bounds the backlog.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::info;

use super::GitJob;

/// Spawn the dispatcher. It runs until every queue sender is dropped.
pub(crate) fn spawn_dispatcher(
    mut queue: mpsc::Receiver<GitJob>,
    worker_count: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(worker_count, "git worker pool started");
        let workers = Arc::new(Semaphore::new(worker_count));

        while let Some(job) = queue.recv().await {
            let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
                break;
            };
            tokio::spawn(async move {
                job.run().await;
                drop(permit);
            });
        }

        info!("git worker pool stopped");
    })
}
