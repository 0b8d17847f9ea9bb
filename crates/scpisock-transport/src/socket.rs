use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

const INITIAL_LINE_CAPACITY: usize = 1024;
const RECV_CHUNK_SIZE: usize = 1024;

/// One TCP connection to an instrument.
///
/// Owns the stream and the configured read timeout. All receive primitives
/// loop over partial reads internally and translate socket-level timeouts
/// into [`TransportError::TimedOut`].
///
/// The socket is not safe for concurrent use; callers sharing a connection
/// across threads must hold external mutual exclusion for the full duration
/// of one logical operation.
pub struct ScpiSocket {
    stream: TcpStream,
    host: IpAddr,
    port: u16,
    read_timeout: Duration,
}

impl ScpiSocket {
    /// Connect to `host:port` with the given timeout.
    ///
    /// `host` must be a syntactically valid IPv4 or IPv6 literal. The
    /// timeout bounds both the connect attempt and subsequent receives.
    /// When `no_delay` is set, Nagle's algorithm is disabled so each send
    /// reaches the wire without coalescing delay.
    pub fn connect(host: &str, port: u16, timeout: Duration, no_delay: bool) -> Result<Self> {
        let addr: IpAddr = host
            .parse()
            .map_err(|_| TransportError::InvalidAddress {
                host: host.to_string(),
            })?;

        let sock_addr = SocketAddr::new(addr, port);
        let stream =
            TcpStream::connect_timeout(&sock_addr, timeout).map_err(|e| TransportError::Connect {
                host: host.to_string(),
                port,
                source: e,
            })?;

        stream.set_nodelay(no_delay)?;
        stream.set_read_timeout(Some(timeout))?;

        info!(%addr, port, ?timeout, no_delay, "connected to instrument");

        Ok(Self {
            stream,
            host: addr,
            port,
            read_timeout: timeout,
        })
    }

    /// Send the entire buffer, looping over partial writes.
    pub fn send_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < buf.len() {
            match self.stream.write(&buf[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        self.stream.flush()?;
        Ok(())
    }

    /// Receive exactly one byte.
    pub fn recv_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.recv_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// Fill `buf` completely, looping because a single receive may return
    /// fewer bytes than requested.
    pub fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(map_recv_error(err)),
            }
        }
        Ok(())
    }

    /// Receive until the buffer's trailing byte is a newline.
    ///
    /// Returns the raw bytes including the terminator. Blocks until data
    /// arrives or the read timeout elapses.
    pub fn recv_line(&mut self) -> Result<Bytes> {
        let mut line = BytesMut::with_capacity(INITIAL_LINE_CAPACITY);
        loop {
            let mut chunk = [0u8; RECV_CHUNK_SIZE];
            let read = match self.stream.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(map_recv_error(err)),
            };
            line.extend_from_slice(&chunk[..read]);
            if line.last() == Some(&b'\n') {
                return Ok(line.freeze());
            }
        }
    }

    /// Override the read timeout for subsequent receives.
    ///
    /// Used to bound a single protocol step more tightly than the
    /// connection's normal timeout; callers must restore the previous value
    /// afterward on every exit path.
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.read_timeout = timeout;
        Ok(())
    }

    /// The currently configured read timeout.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// The connected peer address.
    pub fn peer(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Shut down both directions of the connection.
    ///
    /// Any receive still blocked on the connection aborts with an error.
    /// The socket is released when the value is dropped.
    pub fn shutdown(&mut self) -> Result<()> {
        debug!(host = %self.host, port = self.port, "shutting down connection");
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // The peer may already have closed; there is nothing left to
            // shut down in that case.
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

impl Read for ScpiSocket {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl std::fmt::Debug for ScpiSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScpiSocket")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

fn map_recv_error(err: std::io::Error) -> TransportError {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => TransportError::TimedOut,
        _ => TransportError::Io(err),
    }
}
