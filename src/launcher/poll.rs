//! Bounded polling with exponential backoff.

use crate::error::{HarnessError, Result};
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

/// Polls a condition until it yields a value or the timeout elapses.
///
/// The sleep between probes starts at `initial` and doubles up to `max`.
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    pub initial: Duration,
    pub max: Duration,
    pub timeout: Duration,
}

impl Poller {
    /// Probe `check` until it returns `Some`.
    ///
    /// Errors from `check` end the wait immediately. Running out of time
    /// fails with `RendezvousTimeout` naming `what`.
    pub fn wait_for<T, F>(&self, what: &'static str, mut check: F) -> Result<T>
    where
        F: FnMut() -> Result<Option<T>>,
    {
        let start = Instant::now();
        let mut interval = self.initial.max(Duration::from_micros(1));
        let mut probes = 0u64;

        loop {
            probes += 1;
            if let Some(value) = check()? {
                trace!(what, probes, "Poll satisfied");
                return Ok(value);
            }

            let waited = start.elapsed();
            if waited >= self.timeout {
                return Err(HarnessError::RendezvousTimeout { what, waited });
            }

            thread::sleep(interval.min(self.timeout - waited));
            interval = (interval * 2).min(self.max.max(interval));
        }
    }
}
