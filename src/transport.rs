//! Blocking byte-stream transport.
//!
//! The record layer consumes a [`Transport`] and the serving loop a
//! [`Listener`]; both are implemented over `std::net` TCP sockets.
//!
//! 阻塞式字节流传输层。

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::Result;

/// A connected byte stream.
pub trait Transport {
    /// Writes some bytes, returning how many were accepted.
    fn send(&mut self, buf: &[u8]) -> Result<usize>;
    /// Reads up to `buf.len()` bytes. `Ok(0)` means the peer closed the stream.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;
    /// Bounds how long `receive` may block; `None` blocks indefinitely.
    fn set_receive_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;
    /// Releases the stream. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// A bound socket handing out connected streams.
pub trait Listener {
    type Stream: Transport;

    fn accept(&self) -> Result<(Self::Stream, SocketAddr)>;
    fn local_addr(&self) -> Result<SocketAddr>;
}

#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    closed: bool,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// The underlying socket, for callers that need non-blocking mode.
    pub fn get_ref(&self) -> &TcpStream {
        &self.stream
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.stream.write(buf)?)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.stream.read(buf)?)
    }

    fn set_receive_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.stream.set_read_timeout(timeout)?)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // The peer may already be gone; shutting down a dead socket is not an error here.
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!(error = %e, "shutdown after peer close");
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct TcpTransportListener {
    listener: TcpListener,
}

impl Listener for TcpTransportListener {
    type Stream = TcpTransport;

    fn accept(&self) -> Result<(TcpTransport, SocketAddr)> {
        let (stream, peer) = self.listener.accept()?;
        stream.set_nodelay(true)?;
        Ok((TcpTransport::new(stream), peer))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Binds a TCP listener on `addr`.
pub fn bind(addr: impl ToSocketAddrs) -> Result<TcpTransportListener> {
    let listener = TcpListener::bind(addr)?;
    Ok(TcpTransportListener { listener })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_send_receive_and_double_close() {
        let listener = bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpTransport::connect(addr).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        assert_eq!(client.send(b"ping").unwrap(), 4);
        let mut buf = [0u8; 8];
        let n = server.receive(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");

        client.close().unwrap();
        client.close().unwrap();
        assert_eq!(server.receive(&mut buf).unwrap(), 0);
    }
}
