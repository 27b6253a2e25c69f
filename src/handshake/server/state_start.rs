use super::{HandshakeServer, HandshakeServerBuilder, Missing};
use crate::error::{Error, RecordError, Result};
use crate::protocol::message::{COMPRESSION_NULL, HandshakeMessage, PROTOCOL_VERSION};
use crate::protocol::state::{
    NegotiatedParameters, ReceivedClientGreeting, ServerNegotiated, ServerReceivedGreeting,
    ServerStart, Start,
};
use tracing::debug;

impl HandshakeServer<Start, ServerStart> {
    pub fn builder() -> HandshakeServerBuilder<Missing, Missing> {
        HandshakeServerBuilder::new()
    }

    /// Accepts the client's greeting.
    ///
    /// The offered suites are intersected with the permitted ones. An empty
    /// intersection fails with [`Error::NoCommonCiphersuite`]; a hello that
    /// does not offer the null compression method fails with
    /// [`RecordError::DecompressionUnsupported`].
    ///
    /// 处理客户端的问候消息，并将其提供的套件与允许的套件求交集。
    pub fn process_client_hello(
        mut self,
        message: HandshakeMessage,
    ) -> Result<HandshakeServer<ReceivedClientGreeting, ServerReceivedGreeting>> {
        let hello = match &message {
            HandshakeMessage::ClientHello(hello) => hello,
            _ => return Err(Error::UnexpectedMessage("expected ClientHello")),
        };

        if hello.version < PROTOCOL_VERSION {
            return Err(Error::UnexpectedMessage("client does not speak TLS 1.2"));
        }
        if !hello.compression_methods.contains(&COMPRESSION_NULL) {
            return Err(RecordError::DecompressionUnsupported.into());
        }

        let shared_suites: Vec<_> = self
            .permitted
            .iter()
            .copied()
            .filter(|suite| hello.cipher_suites.contains(&suite.id))
            .collect();
        debug!(offered = ?hello.cipher_suites, shared = shared_suites.len(), "client hello");
        if shared_suites.is_empty() {
            return Err(Error::NoCommonCiphersuite);
        }

        let client_random = hello.random;
        self.transcript.update(&message)?;

        Ok(self.transition(ServerReceivedGreeting {
            client_random,
            shared_suites,
        }))
    }
}

impl HandshakeServer<ReceivedClientGreeting, ServerReceivedGreeting> {
    /// Fixes the suite and the credential.
    ///
    /// The first shared suite, in server preference order, for which a
    /// credential of the right kind is loaded wins.
    ///
    /// 按服务器偏好选择第一个有对应凭据的共享套件。
    pub fn negotiate(self) -> Result<HandshakeServer<NegotiatedParameters, ServerNegotiated>> {
        let ServerReceivedGreeting {
            client_random,
            shared_suites,
        } = &self.state_data;

        let selected = shared_suites
            .iter()
            .find_map(|suite| {
                self.credentials
                    .select(suite.key_exchange)
                    .ok()
                    .map(|credential| (*suite, credential))
            });
        let (suite, credential) = match selected {
            Some(pair) => pair,
            None => {
                let first = shared_suites.first().ok_or(Error::NoCommonCiphersuite)?;
                return Err(Error::MissingCredential(first.key_exchange));
            }
        };
        debug!(suite = suite.name, credential = ?credential.kind(), "negotiated");

        let client_random = *client_random;
        Ok(self.transition(ServerNegotiated {
            client_random,
            suite,
            credential,
        }))
    }
}
