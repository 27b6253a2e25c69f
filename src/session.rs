//! The application byte stream after a completed handshake.
//!
//! 握手完成后的应用层字节流。

use std::time::Duration;

use tracing::{debug, trace};

use crate::crypto::suite::Ciphersuite;
use crate::error::{Error, Result};
use crate::protocol::alert::Alert;
use crate::stream::{Message, RecordStream};
use crate::transport::Transport;

const DEFAULT_CLOSE_NOTIFY_TIMEOUT: Duration = Duration::from_secs(1);

/// A protected duplex byte stream.
///
/// 受保护的双工字节流。
pub struct Session<T: Transport> {
    stream: RecordStream<T>,
    suite: &'static Ciphersuite,
    /// Bytes of the last application record not yet handed out.
    pending: Vec<u8>,
    close_notify_timeout: Duration,
    peer_closed: bool,
    failed: bool,
    closed: bool,
}

impl<T: Transport> Session<T> {
    pub(crate) fn new(stream: RecordStream<T>, suite: &'static Ciphersuite) -> Self {
        Self {
            stream,
            suite,
            pending: Vec::new(),
            close_notify_timeout: DEFAULT_CLOSE_NOTIFY_TIMEOUT,
            peer_closed: false,
            failed: false,
            closed: false,
        }
    }

    pub fn suite(&self) -> &'static Ciphersuite {
        self.suite
    }

    /// How long [`close`](Self::close) waits for the peer's close_notify.
    pub fn set_close_notify_timeout(&mut self, timeout: Duration) {
        self.close_notify_timeout = timeout;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Reads at most `max_len` bytes of application data.
    ///
    /// Blocks until a non-empty application record arrives. Returns
    /// [`Error::PeerClosed`] once the peer's close_notify is received, and
    /// [`Error::ConnectionReset`] if the transport ends without one.
    ///
    /// 读取至多 `max_len` 字节的应用数据。收到 close_notify 后返回
    /// [`Error::PeerClosed`]，传输层意外关闭时返回 [`Error::ConnectionReset`]。
    pub fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        if self.closed || self.failed {
            return Err(Error::InvalidState);
        }
        while self.pending.is_empty() {
            if self.peer_closed {
                return Err(Error::PeerClosed);
            }
            match self.stream.read_message() {
                Ok(Message::ApplicationData(data)) => self.pending = data,
                Ok(Message::Alert(alert)) if alert.is_close_notify() => {
                    debug!("peer sent close_notify");
                    self.peer_closed = true;
                }
                Ok(Message::Alert(alert)) if !alert.is_fatal() => {
                    trace!(description = %alert.description, "ignoring warning alert");
                }
                Ok(Message::Alert(alert)) => {
                    self.failed = true;
                    return Err(alert.into_error());
                }
                Ok(Message::Handshake(_) | Message::ChangeCipherSpec) => {
                    return Err(self.abort(Error::UnexpectedMessage("handshake traffic after completion")));
                }
                Err(e) => return Err(self.abort(e)),
            }
        }

        let n = max_len.min(self.pending.len());
        Ok(self.pending.drain(..n).collect())
    }

    /// Seals `data` into as many records as needed and sends them.
    ///
    /// If the transport would block, the sealed records stay queued and go
    /// out with the next [`flush`](Self::flush); the data counts as written.
    ///
    /// 将数据封装为若干记录并发送。
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.closed || self.failed {
            return Err(Error::InvalidState);
        }
        self.stream.write_application_data(data)?;
        match self.stream.flush() {
            Ok(()) | Err(Error::WouldBlock) => Ok(data.len()),
            Err(e) => Err(self.abort(e)),
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.stream.flush()
    }

    /// Sends close_notify, waits a bounded time for the peer's, and releases
    /// the transport.
    ///
    /// A peer that never answers is not an error. Closing again is a no-op.
    ///
    /// 发送 close_notify，在限定时间内等待对端的 close_notify，然后释放传输层。
    /// 重复关闭不做任何事。
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if !self.failed {
            let sent = self
                .stream
                .write_alert(Alert::close_notify())
                .and_then(|()| self.stream.flush());
            match sent {
                Err(e) => debug!(error = %e, "close_notify not delivered"),
                Ok(()) if !self.peer_closed => self.await_close_notify(),
                Ok(()) => {}
            }
        }
        self.stream.close()
    }

    fn await_close_notify(&mut self) {
        if let Err(e) = self.stream.set_timeout(Some(self.close_notify_timeout)) {
            debug!(error = %e, "cannot bound the close_notify wait");
            return;
        }
        loop {
            match self.stream.read_message() {
                Ok(Message::Alert(alert)) if alert.is_close_notify() => {
                    debug!("peer acknowledged close_notify");
                    break;
                }
                Ok(Message::Alert(alert)) if alert.is_fatal() => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!(error = %e, "stopped waiting for close_notify");
                    break;
                }
            }
        }
        self.peer_closed = true;
    }

    /// Reports a fatal error to the peer, best effort.
    fn abort(&mut self, err: Error) -> Error {
        if let Some(description) = err.alert() {
            self.failed = true;
            let sent = self
                .stream
                .write_alert(Alert::fatal(description))
                .and_then(|()| self.stream.flush());
            if let Err(e) = sent {
                debug!(error = %e, "fatal alert not delivered");
            }
        } else if !matches!(err, Error::WouldBlock | Error::Timeout) {
            self.failed = true;
        }
        err
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.stream.close() {
                debug!(error = %e, "transport close on drop");
            }
        }
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("suite", &self.suite.name)
            .field("peer_closed", &self.peer_closed)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
