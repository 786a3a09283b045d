//! Server process invocation.

use crate::config::LaunchConfig;
use crate::error::{HarnessError, Result};
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// A process to start, with one extra environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Program followed by its arguments.
    pub argv: Vec<OsString>,
    pub env_key: String,
    pub env_value: OsString,
}

impl SpawnRequest {
    /// Program name, for diagnostics.
    pub fn program(&self) -> String {
        self.argv
            .first()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Starts child processes.
pub trait ProcessLauncher {
    /// Start the process and return its pid.
    ///
    /// Failing to execute the program is an error here, not in the child.
    fn spawn(&mut self, request: &SpawnRequest) -> Result<u32>;
}

/// Spawns real processes with `std::process::Command`.
#[derive(Debug, Default)]
pub struct OsProcessLauncher;

impl ProcessLauncher for OsProcessLauncher {
    fn spawn(&mut self, request: &SpawnRequest) -> Result<u32> {
        let (program, args) = request.argv.split_first().ok_or_else(|| HarnessError::Spawn {
            program: String::new(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty argument vector"),
        })?;

        let child = Command::new(program)
            .args(args)
            .env(&request.env_key, &request.env_value)
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                program: request.program(),
                source,
            })?;

        debug!(pid = child.id(), program = %request.program(), "Spawned server process");
        // The child is left running unreaped; the harness exits right after launch.
        Ok(child.id())
    }
}

/// Build the server argument vector.
///
/// ```text
/// [<wrapper> <ttl>] <server> -A -p -1 -U 0 [-t <threads>] [-u root] [-d -P <pid-file>]
/// ```
///
/// The time-limit wrapper is only used for foreground servers; a daemon
/// outlives its parent anyway.
pub fn build_argv(config: &LaunchConfig, pid_file: &Path, as_root: bool) -> Vec<OsString> {
    let mut argv: Vec<OsString> = Vec::with_capacity(16);

    if !config.daemon {
        if let Some(wrapper) = &config.timeout_wrapper {
            argv.push(wrapper.into());
            argv.push(config.ttl_secs.to_string().into());
        }
    }

    argv.push(config.server_binary.clone().into());
    for arg in ["-A", "-p", "-1", "-U", "0"] {
        argv.push(arg.into());
    }

    if let Some(threads) = config.threads {
        argv.push("-t".into());
        argv.push(threads.to_string().into());
    }

    // Servers refuse to run as root unless told which user to stay.
    if as_root {
        argv.push("-u".into());
        argv.push("root".into());
    }

    if config.daemon {
        argv.push("-d".into());
        argv.push("-P".into());
        argv.push(pid_file.into());
    }

    argv
}

/// Whether the harness runs with uid 0.
pub fn running_as_root() -> bool {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() == 0 }
}

/// Check that `pid` names a live process we may signal.
pub fn probe_alive(pid: u32) -> Result<()> {
    let raw = libc::pid_t::try_from(pid).map_err(|_| HarnessError::NotAlive {
        pid: -1,
        source: io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"),
    })?;

    // SAFETY: signal 0 only performs the existence and permission checks.
    if unsafe { libc::kill(raw, 0) } == 0 {
        Ok(())
    } else {
        Err(HarnessError::NotAlive {
            pid: raw,
            source: io::Error::last_os_error(),
        })
    }
}
