//! Deadline signalling for the request loop.
//!
//! A `Deadline` is a one-shot cancellation flag shared between the loop and
//! whatever fires it. The loop only looks at it between iterations.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Shared "deadline reached" flag.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    reached: Arc<AtomicBool>,
}

impl Deadline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the deadline as reached. Further calls have no effect.
    pub fn fire(&self) {
        self.reached.store(true, Ordering::Release);
    }

    /// Whether the deadline has been reached.
    pub fn is_reached(&self) -> bool {
        self.reached.load(Ordering::Acquire)
    }
}

/// Something that fires a deadline after a delay.
pub trait DeadlineSource {
    /// Arrange for `deadline` to fire once `after` has elapsed.
    fn arm(&self, deadline: &Deadline, after: Duration) -> io::Result<()>;
}

/// Wall-clock timer backed by a detached sleeper thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadTimer;

impl DeadlineSource for ThreadTimer {
    fn arm(&self, deadline: &Deadline, after: Duration) -> io::Result<()> {
        if after.is_zero() {
            deadline.fire();
            return Ok(());
        }

        let deadline = deadline.clone();
        thread::Builder::new()
            .name("deadline-timer".to_string())
            .spawn(move || {
                thread::sleep(after);
                debug!(after_ms = after.as_millis() as u64, "Deadline reached");
                deadline.fire();
            })?;
        Ok(())
    }
}
