use super::{HandshakeClient, HandshakeClientBuilder};
use crate::error::Result;
use crate::handshake::server::Missing;
use crate::protocol::message::{COMPRESSION_NULL, ClientHello, HandshakeMessage, PROTOCOL_VERSION};
use crate::protocol::state::{AwaitingServerFlight, ClientAwaitingFlight, ClientReady, Ready};

impl HandshakeClient<Ready, ClientReady> {
    pub fn builder() -> HandshakeClientBuilder<Missing> {
        HandshakeClientBuilder::new()
    }

    /// Initiates the handshake by creating a `ClientHello` message.
    ///
    /// 通过创建 `ClientHello` 消息来启动握手。
    pub fn start_handshake(
        mut self,
    ) -> Result<(
        HandshakeMessage,
        HandshakeClient<AwaitingServerFlight, ClientAwaitingFlight>,
    )> {
        let mut client_random = [0u8; 32];
        self.random.fill(&mut client_random)?;

        let hello = HandshakeMessage::ClientHello(ClientHello {
            version: PROTOCOL_VERSION,
            random: client_random,
            cipher_suites: self.offered.clone(),
            compression_methods: vec![COMPRESSION_NULL],
        });
        self.transcript.update(&hello)?;

        let next = self.transition(ClientAwaitingFlight { client_random });
        Ok((hello, next))
    }
}
