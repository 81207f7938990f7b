//! Dispatch coalescing for git jobs.
//!
//! A burst of concurrent `readlink` calls on the same repository must produce
//! one clone attempt, not N. The coalescer tracks the last dispatch instant
//! per repository and suppresses duplicates inside a short window; the
//! `DashMap` entry API makes the check-and-stamp step atomic under
//! concurrent registration.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Suppresses duplicate job dispatches for the same repository identity.
pub struct DispatchCoalescer {
    window: Duration,
    last_dispatch: DashMap<u64, Instant>,
}

impl DispatchCoalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_dispatch: DashMap::new(),
        }
    }

    /// Whether a job for `repository_id` may be dispatched now.
    ///
    /// Returns true and stamps the slot when no dispatch happened inside the
    /// window; returns false when a recent dispatch already covers this
    /// access.
    pub fn should_dispatch(&self, repository_id: u64) -> bool {
        match self.last_dispatch.entry(repository_id) {
            Entry::Occupied(mut entry) => {
                if entry.get().elapsed() < self.window {
                    false
                } else {
                    entry.insert(Instant::now());
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
                true
            }
        }
    }

    /// Forget a dispatch that never made it into the queue, so the next
    /// access retries immediately.
    pub fn clear(&self, repository_id: u64) {
        self.last_dispatch.remove(&repository_id);
    }
}
