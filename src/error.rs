//! Error types for the harness.
//!
//! Every failure is fatal: errors are propagated as `Result`s up to `main`,
//! which logs them once and exits with a non-zero status.

use crate::config::ConfigError;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Shared result type.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Broad failure class, used when reporting a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Socket I/O failed.
    Transport,
    /// The peer did not speak the expected protocol.
    Protocol,
    /// The test environment could not be brought up.
    Bootstrap,
    /// A response did not fit in the line buffer.
    ResourceExhausted,
    /// Configuration could not be loaded.
    Config,
}

/// Harness errors.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: io::Error,
    },

    #[error("unable to connect to {host} on port {port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: io::Error,
    },

    #[error("failed to write: {0}")]
    Write(io::Error),

    #[error("failed to read: {0}")]
    Read(io::Error),

    #[error("connection is already closed")]
    Closed,

    #[error("invalid number of bytes read: peer closed the connection")]
    PeerClosed,

    #[error("line buffer capacity must be at least 2 bytes, got {0}")]
    InvalidCapacity(usize),

    #[error("response exceeds the line buffer limit of {capacity} bytes")]
    BufferExceeded { capacity: usize },

    #[error("received invalid stats from cachedump: {0:?}")]
    UnexpectedResponse(String),

    #[error("unable to shutdown the server: {0} more bytes received")]
    ShutdownRefused(usize),

    #[error("failed to arm deadline timer: {0}")]
    Timer(io::Error),

    #[error("failed to execute {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("timed out after {waited:?} waiting for {what}")]
    RendezvousTimeout { what: &'static str, waited: Duration },

    #[error("failed to {action} {}: {source}", .path.display())]
    RendezvousIo {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("no port announcement found in {}", .path.display())]
    MissingPort { path: PathBuf },

    #[error("invalid port announcement {value:?} in {}", .path.display())]
    InvalidPort { path: PathBuf, value: String },

    #[error("pid file {} stayed empty after {attempts} reads", .path.display())]
    EmptyPidFile { path: PathBuf, attempts: u32 },

    #[error("invalid pid {value:?} in {}", .path.display())]
    InvalidPid { path: PathBuf, value: String },

    #[error("server process {pid} is not alive: {source}")]
    NotAlive { pid: i32, source: io::Error },
}

impl HarnessError {
    /// Failure class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Config(_) => ErrorClass::Config,
            Self::Resolve { .. } | Self::Connect { .. } | Self::Write(_) | Self::Read(_) => {
                ErrorClass::Transport
            }
            Self::Closed | Self::PeerClosed | Self::UnexpectedResponse(_) | Self::ShutdownRefused(_) => {
                ErrorClass::Protocol
            }
            Self::InvalidCapacity(_) | Self::BufferExceeded { .. } => ErrorClass::ResourceExhausted,
            Self::Timer(_)
            | Self::Spawn { .. }
            | Self::RendezvousTimeout { .. }
            | Self::RendezvousIo { .. }
            | Self::MissingPort { .. }
            | Self::InvalidPort { .. }
            | Self::EmptyPidFile { .. }
            | Self::InvalidPid { .. }
            | Self::NotAlive { .. } => ErrorClass::Bootstrap,
        }
    }
}
