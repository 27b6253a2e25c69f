//! Blocking client driver.
//!
//! Used by the `tls-echo-client` binary and by the loopback tests to talk to
//! the server; it runs [`HandshakeClient`] over a [`RecordStream`].
//!
//! 阻塞式客户端驱动。

use std::time::Duration;

use tracing::debug;

use crate::crypto::keys::Role;
use crate::crypto::suite::Ciphersuite;
use crate::error::{Error, Result};
use crate::handshake::client::HandshakeClient;
use crate::protocol::alert::Alert;
use crate::protocol::message::HandshakeMessage;
use crate::protocol::state::{ClientReady, Ready};
use crate::session::Session;
use crate::stream::{Message, RecordStream};
use crate::transport::Transport;

/// Performs the client handshake over `transport` and returns the session.
///
/// `timeout` bounds the whole handshake. On failure the matching fatal alert
/// is sent (best effort) and the transport is closed.
///
/// 在 `transport` 上执行客户端握手并返回会话。
pub fn connect<T: Transport>(
    transport: T,
    machine: HandshakeClient<Ready, ClientReady>,
    timeout: Option<Duration>,
) -> Result<Session<T>> {
    let mut stream = RecordStream::new(transport);
    match run_handshake(&mut stream, machine, timeout) {
        Ok(suite) => Ok(Session::new(stream, suite)),
        Err(err) => {
            let err = err.into_transport();
            if let Some(description) = err.alert() {
                let sent = stream
                    .write_alert(Alert::fatal(description))
                    .and_then(|()| stream.flush());
                if let Err(e) = sent {
                    debug!(error = %e, "fatal alert not delivered");
                }
            }
            if let Err(e) = stream.close() {
                debug!(error = %e, "close after failed handshake");
            }
            Err(err)
        }
    }
}

fn run_handshake<T: Transport>(
    stream: &mut RecordStream<T>,
    machine: HandshakeClient<Ready, ClientReady>,
    timeout: Option<Duration>,
) -> Result<&'static Ciphersuite> {
    stream.set_timeout(timeout)?;

    let (hello, machine) = machine.start_handshake()?;
    stream.write_handshake(&hello)?;
    stream.flush()?;

    let mut flight = Vec::new();
    loop {
        let message = read_handshake(stream)?;
        let done = matches!(message, HandshakeMessage::ServerHelloDone);
        flight.push(message);
        if done {
            break;
        }
    }

    let (reply, machine) = machine.process_server_flight(flight)?;
    let suite = machine.suite();
    let (write, read) = machine.session_keys().for_role(Role::Client);

    stream.write_handshake(&reply.key_exchange)?;
    stream.write_change_cipher_spec()?;
    stream.layer_mut().install_write_keys(suite, write)?;
    stream.write_handshake(&reply.finished)?;
    stream.flush()?;

    match stream.read_message()? {
        Message::ChangeCipherSpec => stream.layer_mut().install_read_keys(suite, read)?,
        Message::Alert(alert) => return Err(alert.into_error()),
        _ => return Err(Error::UnexpectedMessage("expected change_cipher_spec")),
    }
    let finished = read_handshake(stream)?;
    let machine = machine.process_server_finished(finished)?;

    stream.set_deadline(None)?;
    debug!(suite = machine.suite().name, "client handshake complete");
    Ok(machine.suite())
}

fn read_handshake<T: Transport>(stream: &mut RecordStream<T>) -> Result<HandshakeMessage> {
    match stream.read_message()? {
        Message::Handshake(message) => Ok(message),
        Message::Alert(alert) => Err(alert.into_error()),
        _ => Err(Error::UnexpectedMessage("expected a handshake message")),
    }
}
