use super::HandshakeServer;
use crate::credential::Credential;
use crate::crypto::keys::{derive_master_secret, derive_session_keys};
use crate::crypto::kx::{
    KeyAgreementEngine, NAMED_CURVE_P256, PREMASTER_LEN, PREMASTER_VERSION, rsa_premaster,
};
use crate::crypto::signature::sign_ephemeral_params;
use crate::error::{Error, Result};
use crate::protocol::message::{
    COMPRESSION_NULL, Certificate, HandshakeMessage, PROTOCOL_VERSION, ServerHello,
    ServerKeyExchange,
};
use crate::protocol::state::{
    AwaitingPeerKeyMaterial, KeyExchangeSent, KeysDerived, NegotiatedParameters,
    ServerAwaitingKeyExchange, ServerKeysDerived, ServerNegotiated,
};
use tracing::debug;
use zeroize::Zeroizing;

impl HandshakeServer<NegotiatedParameters, ServerNegotiated> {
    /// Produces the server flight: `ServerHello`, `Certificate`, the signed
    /// `ServerKeyExchange` for ephemeral suites, and `ServerHelloDone`.
    ///
    /// 生成服务器消息组：`ServerHello`、`Certificate`、临时套件的已签名
    /// `ServerKeyExchange` 以及 `ServerHelloDone`。
    pub fn send_key_exchange(
        self,
    ) -> Result<(
        Vec<HandshakeMessage>,
        HandshakeServer<KeyExchangeSent, ServerAwaitingKeyExchange>,
    )> {
        let (
            ServerNegotiated {
                client_random,
                suite,
                credential,
            },
            mut this,
        ) = self.into_state();

        let mut server_random = [0u8; 32];
        this.random.fill(&mut server_random)?;

        let mut flight = vec![
            HandshakeMessage::ServerHello(ServerHello {
                version: PROTOCOL_VERSION,
                random: server_random,
                cipher_suite: suite.id,
                compression_method: COMPRESSION_NULL,
            }),
            HandshakeMessage::Certificate(Certificate {
                chain: credential.chain().to_vec(),
            }),
        ];

        let key_agreement_engine = if suite.key_exchange.is_ephemeral() {
            let engine = KeyAgreementEngine::generate(this.random.as_ref())?;
            let signature = sign_ephemeral_params(
                &credential,
                &client_random,
                &server_random,
                engine.public_key(),
            )?;
            flight.push(HandshakeMessage::ServerKeyExchange(ServerKeyExchange {
                named_curve: NAMED_CURVE_P256,
                public: engine.public_key().to_vec(),
                signature,
            }));
            Some(engine)
        } else {
            None
        };
        flight.push(HandshakeMessage::ServerHelloDone);

        for message in &flight {
            this.transcript.update(message)?;
        }

        let next = this.transition(ServerAwaitingKeyExchange {
            client_random,
            server_random,
            suite,
            credential,
            key_agreement_engine,
        });
        Ok((flight, next))
    }
}

impl HandshakeServer<KeyExchangeSent, ServerAwaitingKeyExchange> {
    /// Marks the flight as handed to the transport.
    pub fn await_peer(self) -> HandshakeServer<AwaitingPeerKeyMaterial, ServerAwaitingKeyExchange> {
        let (state_data, this) = self.into_state();
        this.transition(state_data)
    }
}

impl HandshakeServer<AwaitingPeerKeyMaterial, ServerAwaitingKeyExchange> {
    /// Processes `ClientKeyExchange` and derives the session keys.
    ///
    /// For ECDHE suites an invalid client point is fatal with
    /// [`Error::HandshakeVerificationFailed`]. For RSA key transport a
    /// premaster that fails to decrypt or has the wrong shape is replaced by a
    /// random one, so the failure surfaces only as a Finished mismatch.
    ///
    /// 处理 `ClientKeyExchange` 并派生会话密钥。
    pub fn process_client_key_exchange(
        mut self,
        message: HandshakeMessage,
    ) -> Result<HandshakeServer<KeysDerived, ServerKeysDerived>> {
        let exchange = match &message {
            HandshakeMessage::ClientKeyExchange(cke) => &cke.exchange,
            _ => return Err(Error::UnexpectedMessage("expected ClientKeyExchange")),
        };

        let data = &self.state_data;
        let premaster = match &data.key_agreement_engine {
            Some(engine) => engine.agree(exchange)?,
            None => self.recover_premaster(&data.credential, exchange)?,
        };

        self.transcript.update(&message)?;
        let suite = data.suite;
        let session_hash = self.transcript.current_hash(suite.prf);
        let master_secret = derive_master_secret(suite, &premaster, &session_hash)?;
        let session_keys = derive_session_keys(
            suite,
            &master_secret,
            &data.client_random,
            &data.server_random,
        )?;

        Ok(self.transition(ServerKeysDerived {
            suite,
            master_secret,
            session_keys,
        }))
    }

    fn recover_premaster(
        &self,
        credential: &Credential,
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        // Drawn on every path, decryption failure or not.
        let fallback = rsa_premaster(self.random.as_ref())?;
        match credential.decrypt_premaster(ciphertext) {
            Some(premaster)
                if premaster.len() == PREMASTER_LEN && premaster[..2] == PREMASTER_VERSION =>
            {
                Ok(premaster)
            }
            _ => {
                debug!("premaster rejected, continuing with a random one");
                Ok(fallback)
            }
        }
    }
}
