//! Load client for the cache server's text protocol.
//!
//! - `Connection`: blocking full writes and line reads over any byte stream
//! - `RequestLoop`: deadline-bounded `stats cachedump` loop plus shutdown
//! - `Deadline`: cancellation flag fired by a `DeadlineSource`

mod connection;
mod deadline;
mod request_loop;
mod tcp;

pub use connection::Connection;
pub use deadline::{Deadline, DeadlineSource, ThreadTimer};
pub use request_loop::{
    LoopReport, LoopSettings, LoopState, RequestLoop, EXPECTED_PREFIX, SHUTDOWN_REQUEST,
    STATS_REQUEST,
};
pub use tcp::{connect, ConnectOptions};

use crate::config::ClientConfig;
use crate::error::{HarnessError, Result};
use tracing::info;

/// Arm the deadline, connect, and drive the request loop to completion.
///
/// The deadline is armed before connecting, so slow connects eat into the
/// run time.
pub fn run(config: &ClientConfig, timer: &impl DeadlineSource) -> Result<LoopReport> {
    let deadline = Deadline::new();
    timer
        .arm(&deadline, config.runtime)
        .map_err(HarnessError::Timer)?;

    let mut conn = connect(
        &config.host,
        config.port,
        ConnectOptions {
            timeout: config.connect_timeout,
            nodelay: config.nodelay,
        },
    )?;

    info!(
        host = %config.host,
        port = config.port,
        runtime_secs = config.runtime.as_secs(),
        delay_us = config.delay.as_micros() as u64,
        "Starting request loop"
    );

    let settings = LoopSettings {
        delay: config.delay,
        max_line: config.max_line,
        progress_every: config.progress_every,
    };
    let report = RequestLoop::new(&mut conn, deadline, settings).run()?;
    Ok(report)
}
