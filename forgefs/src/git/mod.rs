//! Git materializer.
//!
//! Turns a repository identity into a deterministic local clone path and
//! keeps that path converging toward a usable clone, asynchronously: path
//! resolution enqueues clone/pull jobs into a bounded queue consumed by a
//! fixed-size worker pool, and the filesystem caller never waits on git.

mod client;
mod coalesce;
mod job;
mod worker;

pub use client::{Client, GitClientError};
pub use coalesce::DispatchCoalescer;
pub use job::{CloneJob, GitJob, GitJobError, JobOutcome, PullJob};
