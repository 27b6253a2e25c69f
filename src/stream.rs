//! Buffered record I/O over a [`Transport`].
//!
//! [`RecordStream`] keeps partially received records, reassembles handshake
//! messages that span records, and queues sealed records until the transport
//! takes them. All of that state survives a `WouldBlock`, so a caller can
//! simply retry the same operation once the transport is ready again.
//!
//! 基于 [`Transport`] 的缓冲记录读写。部分接收的记录、跨记录的握手消息以及
//! 尚未发送的记录都会被保留，因此遇到 `WouldBlock` 后调用方可以直接重试。

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::alert::Alert;
use crate::protocol::message::HandshakeMessage;
use crate::record::{ContentType, HEADER_LEN, MAX_PLAINTEXT, RecordLayer, parse_header};
use crate::transport::Transport;

const RECEIVE_CHUNK: usize = 4096;

/// One unit handed up from the record layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Handshake(HandshakeMessage),
    ChangeCipherSpec,
    Alert(Alert),
    ApplicationData(Vec<u8>),
}

#[derive(Debug)]
pub struct RecordStream<T: Transport> {
    transport: T,
    layer: RecordLayer,
    inbound: Vec<u8>,
    handshake: Vec<u8>,
    outbound: Vec<u8>,
    deadline: Option<Instant>,
}

impl<T: Transport> RecordStream<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            layer: RecordLayer::new(),
            inbound: Vec::new(),
            handshake: Vec::new(),
            outbound: Vec::new(),
            deadline: None,
        }
    }

    pub fn layer(&self) -> &RecordLayer {
        &self.layer
    }

    pub fn layer_mut(&mut self) -> &mut RecordLayer {
        &mut self.layer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Sets an absolute deadline for receives.
    ///
    /// While a deadline is set, the transport's receive timeout tracks the
    /// time remaining, and a receive that comes back with `WouldBlock` or
    /// `TimedOut` is reported as [`Error::Timeout`].
    ///
    /// 设置接收的绝对截止时间。截止时间内超时的接收会报告为 [`Error::Timeout`]。
    pub fn set_deadline(&mut self, deadline: Option<Instant>) -> Result<()> {
        self.deadline = deadline;
        if deadline.is_none() {
            self.transport.set_receive_timeout(None)?;
        }
        Ok(())
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.set_deadline(timeout.map(|t| Instant::now() + t))
    }

    /// Reads the next message, pulling from the transport as needed.
    ///
    /// 读取下一条消息，必要时从传输层拉取数据。
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some((message, used)) = HandshakeMessage::parse_framed(&self.handshake)? {
                self.handshake.drain(..used);
                trace!(message = message.name(), "handshake message");
                return Ok(Message::Handshake(message));
            }

            if let Some(message) = self.next_record()? {
                return Ok(message);
            }
        }
    }

    /// Opens the next buffered record. Handshake fragments are moved into the
    /// reassembly buffer and yield `None`.
    fn next_record(&mut self) -> Result<Option<Message>> {
        while self.inbound.len() < HEADER_LEN || {
            let header = parse_header(&self.inbound)?;
            self.inbound.len() < header.record_len()
        } {
            self.fill()?;
        }

        let header = parse_header(&self.inbound)?;
        let record: Vec<u8> = self.inbound.drain(..header.record_len()).collect();
        let (content_type, plaintext) = self.layer.open(&record)?;

        if content_type != ContentType::Handshake && !self.handshake.is_empty() {
            return Err(Error::UnexpectedMessage("record interleaved with a partial handshake message"));
        }
        match content_type {
            ContentType::Handshake => {
                if plaintext.is_empty() {
                    return Err(Error::UnexpectedMessage("empty handshake fragment"));
                }
                self.handshake.extend_from_slice(&plaintext);
                Ok(None)
            }
            ContentType::ChangeCipherSpec => {
                if plaintext != [1u8] {
                    return Err(Error::UnexpectedMessage("malformed change_cipher_spec"));
                }
                Ok(Some(Message::ChangeCipherSpec))
            }
            ContentType::Alert => Ok(Some(Message::Alert(Alert::decode(&plaintext)?))),
            ContentType::ApplicationData => Ok(Some(Message::ApplicationData(plaintext))),
        }
    }

    fn fill(&mut self) -> Result<()> {
        let bounded = match self.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(Error::Timeout);
                }
                self.transport.set_receive_timeout(Some(remaining))?;
                true
            }
            None => false,
        };

        let mut chunk = [0u8; RECEIVE_CHUNK];
        let n = match self.transport.receive(&mut chunk) {
            Ok(n) => n,
            Err(Error::WouldBlock) if bounded => return Err(Error::Timeout),
            Err(Error::Transport(e)) if bounded && e.kind() == std::io::ErrorKind::TimedOut => {
                return Err(Error::Timeout);
            }
            Err(e) => return Err(e.into_reset()),
        };
        if n == 0 {
            debug!(buffered = self.inbound.len(), "transport closed by peer");
            return Err(Error::ConnectionReset);
        }
        self.inbound.extend_from_slice(&chunk[..n]);
        Ok(())
    }

    /// Queues a handshake message, split across as many records as needed.
    pub fn write_handshake(&mut self, message: &HandshakeMessage) -> Result<()> {
        trace!(message = message.name(), "queue handshake message");
        let bytes = message.encode()?;
        self.queue(ContentType::Handshake, &bytes)
    }

    pub fn write_change_cipher_spec(&mut self) -> Result<()> {
        self.queue(ContentType::ChangeCipherSpec, &[1])
    }

    pub fn write_alert(&mut self, alert: Alert) -> Result<()> {
        self.queue(ContentType::Alert, &alert.encode())
    }

    pub fn write_application_data(&mut self, data: &[u8]) -> Result<()> {
        self.queue(ContentType::ApplicationData, data)
    }

    fn queue(&mut self, content_type: ContentType, data: &[u8]) -> Result<()> {
        for chunk in data.chunks(MAX_PLAINTEXT) {
            let record = self.layer.seal(content_type, chunk)?;
            self.outbound.extend_from_slice(&record);
        }
        Ok(())
    }

    pub fn has_pending_output(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Writes queued records to the transport. Bytes the transport did not
    /// take stay queued.
    ///
    /// 将排队的记录写入传输层，未写出的字节保持排队。
    pub fn flush(&mut self) -> Result<()> {
        while !self.outbound.is_empty() {
            let n = self
                .transport
                .send(&self.outbound)
                .map_err(Error::into_reset)?;
            if n == 0 {
                return Err(Error::ConnectionReset);
            }
            self.outbound.drain(..n);
        }
        Ok(())
    }

    /// Releases the transport.
    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::Finished;
    use std::collections::VecDeque;

    /// Feeds bytes out in fixed-size slices and reports `WouldBlock` when empty.
    #[derive(Default)]
    struct Trickle {
        input: VecDeque<u8>,
        output: Vec<u8>,
        slice: usize,
    }

    impl Transport for Trickle {
        fn send(&mut self, buf: &[u8]) -> Result<usize> {
            let n = buf.len().min(3);
            self.output.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
            if self.input.is_empty() {
                return Err(Error::WouldBlock);
            }
            let n = buf.len().min(self.slice).min(self.input.len());
            for b in buf.iter_mut().take(n) {
                *b = self.input.pop_front().unwrap_or_default();
            }
            Ok(n)
        }

        fn set_receive_timeout(&mut self, _: Option<Duration>) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn finished() -> HandshakeMessage {
        HandshakeMessage::Finished(Finished {
            verify_data: vec![0x5A; 12],
        })
    }

    #[test]
    fn partial_writes_are_completed_by_flush() {
        let mut stream = RecordStream::new(Trickle::default());
        stream.write_handshake(&finished()).unwrap();
        stream.write_alert(Alert::close_notify()).unwrap();
        stream.flush().unwrap();
        assert!(!stream.has_pending_output());

        let wire = stream.transport().output.clone();
        let mut reader = RecordStream::new(Trickle {
            input: wire.into_iter().collect(),
            slice: 2,
            ..Default::default()
        });
        assert_eq!(reader.read_message().unwrap(), Message::Handshake(finished()));
        assert_eq!(reader.read_message().unwrap(), Message::Alert(Alert::close_notify()));
    }

    #[test]
    fn would_block_keeps_partial_record() {
        let mut writer = RecordStream::new(Trickle::default());
        writer.write_application_data(b"hello").unwrap();
        writer.flush().unwrap();
        let wire = writer.transport().output.clone();

        let mut reader = RecordStream::new(Trickle {
            input: wire[..4].iter().copied().collect(),
            slice: 64,
            ..Default::default()
        });
        assert!(matches!(reader.read_message(), Err(Error::WouldBlock)));
        reader.transport_mut().input.extend(wire[4..].iter().copied());
        assert_eq!(
            reader.read_message().unwrap(),
            Message::ApplicationData(b"hello".to_vec())
        );
    }

    #[test]
    fn handshake_message_spanning_records_is_reassembled() {
        let bytes = finished().encode().unwrap();
        let mut writer = RecordStream::new(Trickle::default());
        writer.queue(ContentType::Handshake, &bytes[..5]).unwrap();
        writer.queue(ContentType::Handshake, &bytes[5..]).unwrap();
        writer.flush().unwrap();

        let wire = writer.transport().output.clone();
        let mut reader = RecordStream::new(Trickle {
            input: wire.into_iter().collect(),
            slice: 4096,
            ..Default::default()
        });
        assert_eq!(reader.read_message().unwrap(), Message::Handshake(finished()));
    }

    #[test]
    fn deadline_turns_would_block_into_timeout() {
        let mut reader = RecordStream::new(Trickle {
            slice: 1,
            ..Default::default()
        });
        reader.set_timeout(Some(Duration::from_secs(5))).unwrap();
        assert!(matches!(reader.read_message(), Err(Error::Timeout)));
    }

    #[test]
    fn large_payload_is_fragmented() {
        let mut writer = RecordStream::new(Trickle::default());
        writer.write_application_data(&vec![7u8; MAX_PLAINTEXT + 10]).unwrap();
        assert_eq!(writer.layer().write_sequence(), 2);
    }
}
