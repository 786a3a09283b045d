//! Server bootstrapper.
//!
//! Starts a cache server on an ephemeral port and learns which port it bound
//! (and, for daemons, which pid it ended up with) through rendezvous files.
//! There is no other channel between parent and child.
//!
//! ## Sequence
//!
//! 1. Remove leftover rendezvous files for this pid.
//! 2. Spawn the server with the announcement variable pointing at the port file.
//! 3. Poll until the port file exists, parse the last `TCP INET:` line, delete it.
//! 4. Daemon mode: poll for the pid file, retry until its first line is
//!    readable, and report that pid instead of the spawned one.

mod poll;
mod process;
mod rendezvous;

pub use poll::Poller;
pub use process::{
    build_argv, probe_alive, running_as_root, OsProcessLauncher, ProcessLauncher, SpawnRequest,
};
pub use rendezvous::{
    parse_pid_line, parse_port_announcement, remove_stale, OsFs, RendezvousFs, RendezvousPaths,
    PORT_PREFIX,
};

use crate::config::LaunchConfig;
use crate::error::{HarnessError, Result};
use std::thread;
use tracing::{debug, info};

/// A server that has announced itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchedServer {
    /// TCP port the server is listening on.
    pub port: u16,
    /// Pid to signal: the spawned process, or the daemon's own pid.
    pub pid: u32,
}

/// Launches a server and performs the rendezvous.
pub struct Launcher<P, F> {
    config: LaunchConfig,
    paths: RendezvousPaths,
    processes: P,
    fs: F,
    as_root: bool,
}

impl Launcher<OsProcessLauncher, OsFs> {
    /// Launcher using real processes, the real filesystem and this process's pid.
    pub fn from_config(config: LaunchConfig) -> Self {
        let paths = RendezvousPaths::new(&config.rendezvous_dir, std::process::id());
        Self::new(config, paths, OsProcessLauncher, OsFs, running_as_root())
    }
}

impl<P: ProcessLauncher, F: RendezvousFs> Launcher<P, F> {
    pub fn new(
        config: LaunchConfig,
        paths: RendezvousPaths,
        processes: P,
        fs: F,
        as_root: bool,
    ) -> Self {
        Self {
            config,
            paths,
            processes,
            fs,
            as_root,
        }
    }

    /// Rendezvous file locations used by this launcher.
    pub fn paths(&self) -> &RendezvousPaths {
        &self.paths
    }

    fn poller(&self) -> Poller {
        Poller {
            initial: self.config.poll_initial,
            max: self.config.poll_max,
            timeout: self.config.wait_timeout,
        }
    }

    /// Start the server and wait for it to announce its port (and pid).
    pub fn start_server(&mut self) -> Result<LaunchedServer> {
        remove_stale(&self.fs, &self.paths.port_file)?;
        remove_stale(&self.fs, &self.paths.pid_file)?;

        let request = SpawnRequest {
            argv: build_argv(&self.config, &self.paths.pid_file, self.as_root),
            env_key: self.config.port_env.clone(),
            env_value: self.paths.port_file.clone().into_os_string(),
        };
        debug!(argv = ?request.argv, env = %request.env_key, "Launching server");
        let spawned_pid = self.processes.spawn(&request)?;

        let port = self.read_port()?;
        info!(port, pid = spawned_pid, "Server announced its port");

        let pid = if self.config.daemon {
            let daemon_pid = self.read_daemon_pid()?;
            info!(spawned_pid, daemon_pid, "Server daemonized");
            daemon_pid
        } else {
            spawned_pid
        };

        Ok(LaunchedServer { port, pid })
    }

    fn read_port(&self) -> Result<u16> {
        let path = &self.paths.port_file;
        self.poller()
            .wait_for("port announcement file", || Ok(self.fs.exists(path).then_some(())))?;

        let contents = self
            .fs
            .read_to_string(path)
            .map_err(|source| HarnessError::RendezvousIo {
                action: "read",
                path: path.clone(),
                source,
            })?;
        let port = parse_port_announcement(&contents, path)?;

        self.fs
            .remove_file(path)
            .map_err(|source| HarnessError::RendezvousIo {
                action: "remove",
                path: path.clone(),
                source,
            })?;
        Ok(port)
    }

    fn read_daemon_pid(&self) -> Result<u32> {
        let path = &self.paths.pid_file;
        self.poller()
            .wait_for("pid file", || Ok(self.fs.exists(path).then_some(())))?;

        // The file can exist before its contents are flushed.
        let attempts = self.config.pid_read_retries.max(1);
        for attempt in 1..=attempts {
            let contents =
                self.fs
                    .read_to_string(path)
                    .map_err(|source| HarnessError::RendezvousIo {
                        action: "read",
                        path: path.clone(),
                        source,
                    })?;
            if let Some(pid) = parse_pid_line(&contents, path)? {
                return Ok(pid);
            }
            debug!(attempt, "Pid file still empty");
            thread::sleep(self.config.poll_initial);
        }

        Err(HarnessError::EmptyPidFile {
            path: path.clone(),
            attempts,
        })
    }
}

/// Launch a server per `config` using real processes and files.
pub fn start_server(config: LaunchConfig) -> Result<LaunchedServer> {
    Launcher::from_config(config).start_server()
}
