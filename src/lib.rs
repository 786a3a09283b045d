//! cache-harness: load harness and bootstrapper for memcached-compatible servers
//!
//! - `client`: blocking connection plus a deadline-bounded `stats cachedump`
//!   request loop that finishes with a `shutdown` handshake
//! - `launcher`: spawns a server on an ephemeral port and discovers the port
//!   (and daemon pid) through filesystem rendezvous files
//!
//! Every failure is fatal and surfaces as a [`HarnessError`].

pub mod client;
pub mod config;
pub mod error;
pub mod launcher;

pub use error::{ErrorClass, HarnessError, Result};
