//! TCP transport setup.

use crate::client::Connection;
use crate::error::{HarnessError, Result};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, warn};

/// Socket options for an outbound connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    /// Upper bound on each connect attempt.
    pub timeout: Duration,
    /// Set `TCP_NODELAY` on the socket.
    pub nodelay: bool,
}

/// Resolve `host:port` and connect a blocking TCP stream.
///
/// Every resolved address is tried in order; the first that connects wins.
pub fn connect(host: &str, port: u16, options: ConnectOptions) -> Result<Connection<TcpStream>> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| HarnessError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?
        .collect();

    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no addresses resolved");
    for addr in addrs {
        match connect_addr(addr, options) {
            Ok(stream) => {
                debug!(peer = %addr, "Connected");
                return Ok(Connection::new(stream));
            }
            Err(e) => {
                warn!(peer = %addr, error = %e, "Connect attempt failed");
                last_err = e;
            }
        }
    }

    Err(HarnessError::Connect {
        host: host.to_string(),
        port,
        source: last_err,
    })
}

fn connect_addr(addr: SocketAddr, options: ConnectOptions) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    if options.timeout.is_zero() {
        socket.connect(&SockAddr::from(addr))?;
    } else {
        socket.connect_timeout(&SockAddr::from(addr), options.timeout)?;
    }
    socket.set_nodelay(options.nodelay)?;
    Ok(socket.into())
}
