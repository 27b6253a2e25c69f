//! Server-side connection: drives the handshake machine over a record stream.
//!
//! [`Connection::handshake`] may be called repeatedly. A `WouldBlock` from the
//! transport leaves every buffer and the machine untouched, so the next call
//! resumes where the last one stopped. Any other error is fatal: the matching
//! alert is sent (best effort) and the connection moves to
//! [`HandshakeState::Failed`].
//!
//! 服务器端连接：在记录流上驱动握手状态机。遇到 `WouldBlock` 时可重复调用
//! [`Connection::handshake`] 以继续；其他错误都是致命的。

use std::mem;
use std::time::Duration;

use tracing::{debug, info, trace};

use crate::crypto::keys::Role;
use crate::crypto::suite::Ciphersuite;
use crate::error::{Error, Result};
use crate::handshake::server::HandshakeServer;
use crate::protocol::alert::Alert;
use crate::protocol::message::HandshakeMessage;
use crate::protocol::state::{
    AwaitingPeerKeyMaterial, HandshakeComplete, HandshakeState, KeysDerived, ServerAwaitingKeyExchange,
    ServerComplete, ServerKeysDerived, ServerStart, Start,
};
use crate::session::Session;
use crate::stream::{Message, RecordStream};
use crate::transport::Transport;

/// The machine in whichever state it is waiting in.
enum ServerFlow {
    Start(HandshakeServer<Start, ServerStart>),
    AwaitingPeer(HandshakeServer<AwaitingPeerKeyMaterial, ServerAwaitingKeyExchange>),
    KeysDerived(HandshakeServer<KeysDerived, ServerKeysDerived>),
    Complete(HandshakeServer<HandshakeComplete, ServerComplete>),
    Failed,
}

/// One accepted transport stream and its handshake.
///
/// 一个已接受的传输流及其握手过程。
pub struct Connection<T: Transport> {
    stream: RecordStream<T>,
    flow: ServerFlow,
    state: HandshakeState,
    handshake_timeout: Option<Duration>,
    deadline_armed: bool,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T, machine: HandshakeServer<Start, ServerStart>) -> Self {
        Self {
            stream: RecordStream::new(transport),
            flow: ServerFlow::Start(machine),
            state: HandshakeState::Start,
            handshake_timeout: None,
            deadline_armed: false,
        }
    }

    /// Bounds the whole handshake, measured from the first call to
    /// [`handshake`](Self::handshake). Exceeding it fails with [`Error::Timeout`].
    ///
    /// The deadline is enforced through the transport's receive timeout, so it
    /// is meant for blocking transports. Non-blocking drivers leave it unset.
    pub fn set_handshake_timeout(&mut self, timeout: Option<Duration>) {
        self.handshake_timeout = timeout;
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The negotiated suite, once the handshake is complete.
    pub fn suite(&self) -> Option<&'static Ciphersuite> {
        match &self.flow {
            ServerFlow::Complete(machine) => Some(machine.suite()),
            _ => None,
        }
    }

    /// Runs the handshake until it completes, fails, or the transport would block.
    ///
    /// 运行握手，直到完成、失败或传输层阻塞。
    pub fn handshake(&mut self) -> Result<()> {
        match self.state {
            HandshakeState::Failed => return Err(Error::InvalidState),
            HandshakeState::HandshakeComplete if !self.stream.has_pending_output() => return Ok(()),
            _ => {}
        }
        if !self.deadline_armed {
            self.stream.set_timeout(self.handshake_timeout)?;
            self.deadline_armed = true;
        }

        match self.drive() {
            Ok(()) => {
                self.stream.set_deadline(None)?;
                if let Some(suite) = self.suite() {
                    info!(suite = suite.name, "handshake complete");
                }
                Ok(())
            }
            Err(Error::WouldBlock) => Err(Error::WouldBlock),
            Err(err) => {
                let err = err.into_transport();
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn drive(&mut self) -> Result<()> {
        loop {
            self.stream.flush()?;
            if matches!(self.flow, ServerFlow::Complete(_)) {
                return Ok(());
            }
            let message = self.stream.read_message()?;
            let flow = mem::replace(&mut self.flow, ServerFlow::Failed);
            self.flow = self.step(flow, message)?;
        }
    }

    fn step(&mut self, flow: ServerFlow, message: Message) -> Result<ServerFlow> {
        let message = match message {
            Message::Handshake(message) => Some(message),
            Message::ChangeCipherSpec => None,
            Message::Alert(alert) => return Err(alert.into_error()),
            Message::ApplicationData(_) => {
                return Err(Error::UnexpectedMessage("application data during handshake"));
            }
        };

        match (flow, message) {
            (ServerFlow::Start(machine), Some(hello)) => self.answer_hello(machine, hello),
            (ServerFlow::AwaitingPeer(machine), Some(key_exchange)) => {
                let machine = machine.process_client_key_exchange(key_exchange)?;
                self.enter(HandshakeState::KeysDerived);
                Ok(ServerFlow::KeysDerived(machine))
            }
            (ServerFlow::KeysDerived(machine), None) => {
                if self.stream.layer().is_read_protected() {
                    return Err(Error::UnexpectedMessage("duplicate change_cipher_spec"));
                }
                let (_, read) = machine.session_keys().for_role(Role::Server);
                self.stream.layer_mut().install_read_keys(machine.suite(), read)?;
                trace!("peer cipher active");
                Ok(ServerFlow::KeysDerived(machine))
            }
            (ServerFlow::KeysDerived(machine), Some(finished)) => {
                if !self.stream.layer().is_read_protected() {
                    return Err(Error::UnexpectedMessage("Finished before change_cipher_spec"));
                }
                let (reply, machine) = machine.process_client_finished(finished)?;
                self.stream.write_change_cipher_spec()?;
                let (write, _) = machine.session_keys().for_role(Role::Server);
                self.stream.layer_mut().install_write_keys(machine.suite(), write)?;
                self.stream.write_handshake(&reply)?;
                self.enter(HandshakeState::HandshakeComplete);
                Ok(ServerFlow::Complete(machine))
            }
            (ServerFlow::Start(_) | ServerFlow::AwaitingPeer(_), None) => {
                Err(Error::UnexpectedMessage("change_cipher_spec before key exchange"))
            }
            (ServerFlow::Complete(_) | ServerFlow::Failed, _) => Err(Error::InvalidState),
        }
    }

    /// Runs the hello through to the queued server flight.
    fn answer_hello(
        &mut self,
        machine: HandshakeServer<Start, ServerStart>,
        hello: HandshakeMessage,
    ) -> Result<ServerFlow> {
        let machine = machine.process_client_hello(hello)?;
        self.enter(HandshakeState::ReceivedClientGreeting);
        let machine = machine.negotiate()?;
        self.enter(HandshakeState::NegotiatedParameters);
        let (flight, machine) = machine.send_key_exchange()?;
        for message in &flight {
            self.stream.write_handshake(message)?;
        }
        self.enter(HandshakeState::KeyExchangeSent);
        let machine = machine.await_peer();
        self.enter(HandshakeState::AwaitingPeerKeyMaterial);
        Ok(ServerFlow::AwaitingPeer(machine))
    }

    fn enter(&mut self, state: HandshakeState) {
        debug!(from = %self.state, to = %state, "handshake state");
        self.state = state;
    }

    fn fail(&mut self, err: &Error) {
        self.enter(HandshakeState::Failed);
        self.flow = ServerFlow::Failed;
        if let Some(description) = err.alert() {
            let sent = self
                .stream
                .write_alert(Alert::fatal(description))
                .and_then(|()| self.stream.flush());
            if let Err(e) = sent {
                debug!(error = %e, "fatal alert not delivered");
            }
        }
    }

    /// Hands the protected stream over to the application.
    ///
    /// Fails with [`Error::InvalidState`] unless the handshake is complete.
    ///
    /// 将受保护的流交给应用层；握手未完成时返回 [`Error::InvalidState`]。
    pub fn into_session(self) -> Result<Session<T>> {
        match self.flow {
            ServerFlow::Complete(machine) if !self.stream.has_pending_output() => {
                let (suite, _) = machine.into_session_parts();
                Ok(Session::new(self.stream, suite))
            }
            _ => Err(Error::InvalidState),
        }
    }

    /// Releases the transport without a close_notify.
    pub fn close(&mut self) -> Result<()> {
        self.stream.close()
    }
}

impl<T: Transport> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("suite", &self.suite().map(|s| s.name))
            .finish_non_exhaustive()
    }
}
