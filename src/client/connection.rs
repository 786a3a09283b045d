//! Blocking connection over a pluggable byte stream.
//!
//! A `Connection` owns exactly one transport. Writes always send the whole
//! buffer; reads deliver one `\n`-terminated line at a time. Any failure other
//! than `Interrupted` is returned to the caller and leaves the connection in
//! an unknown state, so callers are expected to give up on it.

use crate::error::{HarnessError, Result};
use bytes::{Bytes, BytesMut};
use std::io::{self, Read, Write};
use tracing::trace;

/// A single client session over transport `T`.
///
/// `T` is any blocking byte stream: a `TcpStream` in production, an
/// in-memory stream in tests.
#[derive(Debug)]
pub struct Connection<T> {
    /// `None` once closed. A closed connection is never reopened.
    transport: Option<T>,
    /// Scratch space for the line being assembled.
    line: BytesMut,
}

impl<T: Read + Write> Connection<T> {
    /// Wrap an already-connected transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
            line: BytesMut::new(),
        }
    }

    /// Whether the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    /// Borrow the underlying transport, if still open.
    pub fn get_ref(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    fn transport(&mut self) -> Result<&mut T> {
        self.transport.as_mut().ok_or(HarnessError::Closed)
    }

    /// Write the entire buffer, retrying short writes.
    ///
    /// `Interrupted` is retried. A write that accepts zero bytes is reported
    /// as `WriteZero`.
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let transport = self.transport()?;
        let mut offset = 0;

        while offset < buf.len() {
            match transport.write(&buf[offset..]) {
                Ok(0) => {
                    return Err(HarnessError::Write(io::Error::from(
                        io::ErrorKind::WriteZero,
                    )))
                }
                Ok(n) => offset += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HarnessError::Write(e)),
            }
        }

        trace!(bytes = buf.len(), "Wrote request");
        Ok(())
    }

    /// Read a single line, one byte at a time, up to `capacity`.
    ///
    /// The returned bytes always end with `\n`. At most `capacity - 1` bytes
    /// are accepted; reaching that many without a newline fails with
    /// `BufferExceeded`. End of stream before the newline fails with
    /// `PeerClosed`.
    pub fn read_line(&mut self, capacity: usize) -> Result<Bytes> {
        if capacity < 2 {
            return Err(HarnessError::InvalidCapacity(capacity));
        }

        let Self { transport, line } = self;
        let transport = transport.as_mut().ok_or(HarnessError::Closed)?;
        line.clear();

        let mut byte = [0u8; 1];
        loop {
            match transport.read(&mut byte) {
                Ok(0) => return Err(HarnessError::PeerClosed),
                Ok(_) => {
                    line.extend_from_slice(&byte);
                    if byte[0] == b'\n' {
                        break;
                    }
                    if line.len() >= capacity - 1 {
                        return Err(HarnessError::BufferExceeded { capacity });
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HarnessError::Read(e)),
            }
        }

        trace!(bytes = line.len(), "Read response line");
        Ok(line.split().freeze())
    }

    /// Perform a single read into `buf`, retrying `Interrupted`.
    ///
    /// Returns the number of bytes read; zero means the peer closed.
    pub fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        let transport = self.transport()?;
        loop {
            match transport.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HarnessError::Read(e)),
            }
        }
    }

    /// Release the transport. Safe to call more than once.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            trace!("Connection closed");
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory transport for exercising connections without sockets.

    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::rc::Rc;

    /// Scripted read outcome.
    #[derive(Debug)]
    pub enum ReadStep {
        Data(Vec<u8>),
        Error(io::ErrorKind),
    }

    /// Scripted stream. Reads replay `reads` in order (then EOF); writes are
    /// captured into `written`, optionally capped at `max_write` bytes per call
    /// and preceded by injected errors. `tap` mirrors writes so they stay
    /// visible after the connection drops the stream.
    #[derive(Debug, Default)]
    pub struct MockStream {
        pub reads: VecDeque<ReadStep>,
        pub written: Vec<u8>,
        pub tap: Option<Rc<RefCell<Vec<u8>>>>,
        pub write_errors: VecDeque<io::ErrorKind>,
        pub max_write: Option<usize>,
        pub write_calls: usize,
    }

    impl MockStream {
        pub fn with_input(input: &[u8]) -> Self {
            let mut stream = Self::default();
            stream.push_data(input);
            stream
        }

        pub fn push_data(&mut self, data: &[u8]) {
            self.reads.push_back(ReadStep::Data(data.to_vec()));
        }

        pub fn push_error(&mut self, kind: io::ErrorKind) {
            self.reads.push_back(ReadStep::Error(kind));
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                None => Ok(0),
                Some(ReadStep::Error(kind)) => Err(io::Error::from(kind)),
                Some(ReadStep::Data(mut data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.reads.push_front(ReadStep::Data(data.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.write_calls += 1;
            if let Some(kind) = self.write_errors.pop_front() {
                return Err(io::Error::from(kind));
            }
            let n = self.max_write.map_or(buf.len(), |max| max.min(buf.len()));
            self.written.extend_from_slice(&buf[..n]);
            if let Some(tap) = &self.tap {
                tap.borrow_mut().extend_from_slice(&buf[..n]);
            }
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
