//! Single-flight coordination for fallible shared-state updates.
//!
//! Both the backend token refresh and the lazy template build follow the same
//! pattern: many requests may notice at once that some shared value is
//! missing or stale, but only one of them should do the work. The others wait
//! for that attempt and adopt its outcome.
//!
//! Every completed attempt bumps an epoch counter. A caller snapshots the
//! epoch *before* checking its fast path, so an attempt that finishes in
//! between is still visible to it:
//!
//! ```rust,ignore
//! let seen = flight.epoch();
//! if let Some(value) = cache.get() {
//!     return Ok(value);
//! }
//! flight.run(seen, || async { rebuild(&cache).await }).await?;
//! ```
//!
//! Failures are shared with callers that were already waiting, but are not
//! remembered for later arrivals: the next request after a failed attempt
//! starts a fresh one.

use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
};

use tokio::sync::Mutex;

/// Failure of a coalesced attempt, shared by every caller that waited on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct FlightError(String);

#[derive(Debug)]
struct Attempt {
    epoch: u64,
    outcome: Result<(), FlightError>,
}

/// Coalesces concurrent runs of one fallible operation.
#[derive(Debug, Default)]
pub struct SingleFlight {
    epoch: AtomicU64,
    last: Mutex<Option<Attempt>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attempts completed so far.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Run `op` unless an attempt newer than `seen` has already completed, in
    /// which case that attempt's outcome is returned instead.
    ///
    /// At most one `op` executes at a time; concurrent callers queue on the
    /// internal lock.
    pub async fn run<F, Fut, E>(&self, seen: u64, op: F) -> Result<(), FlightError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let mut last = self.last.lock().await;

        if let Some(attempt) = last.as_ref().filter(|a| a.epoch > seen) {
            return attempt.outcome.clone();
        }

        let outcome = op().await.map_err(|e| FlightError(format!("{e:#}")));
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        *last = Some(Attempt {
            epoch,
            outcome: outcome.clone(),
        });

        outcome
    }
}
