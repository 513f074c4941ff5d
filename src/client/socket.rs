//! TCP connection to the chat server.
//!
//! [`connect`] establishes the stream; [`Transport`] is the narrow surface the
//! framer and session use, so an in-memory transport can stand in for tests.

use crate::error::ClientError;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

#[cfg(not(unix))]
compile_error!("chatwire supports unix targets only: readiness polling uses poll(2)");

/// Byte-stream operations needed for one request/response exchange.
///
/// Every method takes `&self` so a shared handle can be released from the
/// task that watches for termination while an exchange is blocked in a read.
pub trait Transport: Send + Sync + 'static {
    /// Write once, returning the number of bytes accepted.
    fn send(&self, buf: &[u8]) -> io::Result<usize>;

    /// Read once. `Ok(0)` means the peer closed the stream.
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Switch between blocking and non-blocking reads.
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;

    /// Wait up to `timeout` for incoming data. `Ok(false)` on timeout.
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool>;

    /// Shut down both directions, waking any blocked reader.
    fn release(&self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        let mut stream = self;
        let written = stream.write(buf)?;
        stream.flush()?;
        Ok(written)
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream = self;
        stream.read(buf)
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        use std::os::unix::io::AsRawFd;
        poll_readable(self.as_raw_fd(), timeout)
    }

    fn release(&self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Block in `poll(2)` until `fd` is readable or `timeout` elapses.
///
/// Hang-ups and socket errors count as readable; the following read reports
/// them.
fn poll_readable(fd: libc::c_int, timeout: Duration) -> io::Result<bool> {
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let mut poll_fd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    loop {
        // SAFETY: `poll_fd` lives on the stack for the whole call and exactly
        // one entry is passed.
        let rc = unsafe { libc::poll(&mut poll_fd, 1, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        return Ok(rc > 0);
    }
}

/// Resolve `host` and open a TCP stream to the first address that accepts.
pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream, ClientError> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| ClientError::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(ClientError::Resolve {
            host: host.to_string(),
            source: io::Error::new(ErrorKind::NotFound, "no addresses found"),
        });
    }
    debug!("Resolved {} to {:?}", host, addrs);

    let mut last_err = None;
    for addr in &addrs {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                info!("Connected to {}", addr);
                return Ok(stream);
            }
            Err(e) => {
                debug!("Connection to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }

    Err(ClientError::Connect {
        addr: format!("{}:{}", host, port),
        source: last_err
            .unwrap_or_else(|| io::Error::new(ErrorKind::NotConnected, "no address attempted")),
    })
}
