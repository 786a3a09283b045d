//! Filesystem rendezvous with a freshly launched server.
//!
//! The server writes its bound port to the file named by the announcement
//! environment variable, one `TCP INET: <port>` line per listener. In daemon
//! mode it also writes its pid to the `-P` pid file. Both paths embed the
//! launching process's pid so concurrent harness runs never share them.
//!
//! ```text
//! /tmp/ports.<pid>:  TCP INET: 41027\nUDP INET: 0\n
//! /tmp/pid.<pid>:    41031\n
//! ```

use crate::error::{HarnessError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Line prefix of a TCP port announcement.
pub const PORT_PREFIX: &str = "TCP INET: ";

/// Rendezvous file locations for one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendezvousPaths {
    pub port_file: PathBuf,
    pub pid_file: PathBuf,
}

impl RendezvousPaths {
    /// Paths under `dir` keyed by `owner_pid`.
    pub fn new(dir: &Path, owner_pid: u32) -> Self {
        Self {
            port_file: dir.join(format!("ports.{owner_pid}")),
            pid_file: dir.join(format!("pid.{owner_pid}")),
        }
    }
}

/// File access used by the launcher.
pub trait RendezvousFs {
    fn exists(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl RendezvousFs for OsFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// Remove a leftover rendezvous file. A missing file is fine.
pub fn remove_stale(fs: &impl RendezvousFs, path: &Path) -> Result<()> {
    match fs.remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(HarnessError::RendezvousIo {
            action: "remove stale",
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Extract the port from announcement file contents.
///
/// The last `TCP INET: ` line wins. No such line, or a value that is not a
/// port number, is an error.
pub fn parse_port_announcement(contents: &str, path: &Path) -> Result<u16> {
    let value = contents
        .lines()
        .filter_map(|line| line.strip_prefix(PORT_PREFIX))
        .last()
        .ok_or_else(|| HarnessError::MissingPort {
            path: path.to_path_buf(),
        })?;

    value.trim().parse().map_err(|_| HarnessError::InvalidPort {
        path: path.to_path_buf(),
        value: value.to_string(),
    })
}

/// Parse the first line of a pid file.
///
/// Returns `Ok(None)` while the line is still empty (the writer has created
/// the file but not flushed it yet).
pub fn parse_pid_line(contents: &str, path: &Path) -> Result<Option<u32>> {
    let Some(line) = contents.lines().next() else {
        return Ok(None);
    };
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    match line.parse::<u32>() {
        Ok(pid) if pid > 0 => Ok(Some(pid)),
        _ => Err(HarnessError::InvalidPid {
            path: path.to_path_buf(),
            value: line.to_string(),
        }),
    }
}
