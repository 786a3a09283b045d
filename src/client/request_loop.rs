//! Deadline-bounded request loop.
//!
//! Repeatedly sends `stats cachedump 1 0 0` and checks that the reply starts
//! with `END`, until the deadline fires. Then sends `shutdown` and verifies
//! that the server closed the connection.
//!
//! ## States
//!
//! ```text
//! Running --(deadline seen between iterations)--> DeadlineReached
//! DeadlineReached --> ShuttingDown --(EOF after shutdown)--> done
//! ```
//!
//! Any unexpected reply aborts the loop before another request goes out.

use crate::client::{Connection, Deadline};
use crate::error::{HarnessError, Result};
use chrono::{DateTime, Utc};
use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Request issued on every iteration.
pub const STATS_REQUEST: &[u8] = b"stats cachedump 1 0 0\r\n";

/// Request issued once the deadline is reached.
pub const SHUTDOWN_REQUEST: &[u8] = b"shutdown\r\n";

/// Every stats reply must start with this token.
pub const EXPECTED_PREFIX: &[u8] = b"END";

/// Current phase of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    DeadlineReached,
    ShuttingDown,
}

/// Tunables for the loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    /// Pause after each successful iteration.
    pub delay: Duration,
    /// Line buffer capacity for replies.
    pub max_line: usize,
    /// Log progress every N iterations (0 disables).
    pub progress_every: u64,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct LoopReport {
    pub iterations: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Drives one connection through the request/shutdown sequence.
pub struct RequestLoop<'a, T> {
    conn: &'a mut Connection<T>,
    deadline: Deadline,
    settings: LoopSettings,
    state: LoopState,
    iterations: u64,
}

impl<'a, T: Read + Write> RequestLoop<'a, T> {
    pub fn new(conn: &'a mut Connection<T>, deadline: Deadline, settings: LoopSettings) -> Self {
        Self {
            conn,
            deadline,
            settings,
            state: LoopState::Running,
            iterations: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Completed iterations so far.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Run until the deadline, then shut the server down.
    ///
    /// On success the connection is closed. On error the loop stops
    /// immediately and the error is returned.
    pub fn run(&mut self) -> Result<LoopReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        while self.state == LoopState::Running {
            if self.deadline.is_reached() {
                debug!(iterations = self.iterations, "Deadline reached");
                self.state = LoopState::DeadlineReached;
                break;
            }
            self.iterate()?;
        }

        self.state = LoopState::ShuttingDown;
        self.shutdown()?;

        Ok(LoopReport {
            iterations: self.iterations,
            started_at,
            elapsed: start.elapsed(),
        })
    }

    fn iterate(&mut self) -> Result<()> {
        self.conn.write_all(STATS_REQUEST)?;
        let line = self.conn.read_line(self.settings.max_line)?;
        if !line.starts_with(EXPECTED_PREFIX) {
            return Err(HarnessError::UnexpectedResponse(
                String::from_utf8_lossy(&line).into_owned(),
            ));
        }

        self.iterations += 1;
        trace!(count = self.iterations, "Stats cachedump request processed");
        if self.settings.progress_every > 0 && self.iterations % self.settings.progress_every == 0
        {
            info!(count = self.iterations, "Stats cachedump requests processed");
        }

        if !self.settings.delay.is_zero() {
            thread::sleep(self.settings.delay);
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.conn.write_all(SHUTDOWN_REQUEST)?;

        // Only "nothing" versus "something" matters here.
        let mut buf = [0u8; 64];
        let n = self.conn.read_raw(&mut buf)?;
        if n != 0 {
            return Err(HarnessError::ShutdownRefused(n));
        }

        debug!("Server closed the connection after shutdown");
        self.conn.close();
        Ok(())
    }
}
