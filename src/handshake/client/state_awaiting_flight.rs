use super::{ClientFlight, HandshakeClient};
use crate::credential::PeerPublicKey;
use crate::crypto::keys::{
    LABEL_CLIENT_FINISHED, derive_master_secret, derive_session_keys, verify_data,
};
use crate::crypto::kx::{KeyAgreementEngine, NAMED_CURVE_P256, rsa_premaster};
use crate::crypto::signature::verify_ephemeral_params;
use crate::crypto::suite::lookup;
use crate::error::{Error, RecordError, Result};
use crate::protocol::message::{
    COMPRESSION_NULL, ClientKeyExchange, Finished, HandshakeMessage, PROTOCOL_VERSION,
};
use crate::protocol::state::{
    AwaitingServerFinished, AwaitingServerFlight, ClientAwaitingFinished, ClientAwaitingFlight,
};
use tracing::debug;

impl HandshakeClient<AwaitingServerFlight, ClientAwaitingFlight> {
    /// Processes the server flight, from `ServerHello` through
    /// `ServerHelloDone`, and derives the session keys.
    ///
    /// The server's certificate is read for its public key only; the chain is
    /// not validated. For ephemeral suites the `ServerKeyExchange` signature is
    /// verified with that key, and a bad signature fails with
    /// [`Error::HandshakeVerificationFailed`].
    ///
    /// 处理服务器消息组并派生会话密钥。证书仅用于读取公钥，不做链验证。
    pub fn process_server_flight(
        self,
        flight: Vec<HandshakeMessage>,
    ) -> Result<(
        ClientFlight,
        HandshakeClient<AwaitingServerFinished, ClientAwaitingFinished>,
    )> {
        let (ClientAwaitingFlight { client_random }, mut this) = self.into_state();
        for message in &flight {
            this.transcript.update(message)?;
        }
        let mut messages = flight.into_iter();

        let Some(HandshakeMessage::ServerHello(hello)) = messages.next() else {
            return Err(Error::UnexpectedMessage("expected ServerHello"));
        };
        if hello.version != PROTOCOL_VERSION {
            return Err(Error::UnexpectedMessage("server picked another protocol version"));
        }
        if hello.compression_method != COMPRESSION_NULL {
            return Err(RecordError::DecompressionUnsupported.into());
        }
        let suite = lookup(hello.cipher_suite)
            .filter(|suite| this.offered.contains(&suite.id))
            .ok_or(Error::UnexpectedMessage("server picked a suite that was not offered"))?;
        let server_random = hello.random;

        let Some(HandshakeMessage::Certificate(certificate)) = messages.next() else {
            return Err(Error::UnexpectedMessage("expected Certificate"));
        };
        let leaf = certificate
            .chain
            .first()
            .ok_or(Error::HandshakeVerificationFailed("empty certificate chain"))?;
        let identity = PeerPublicKey::from_certificate(leaf)
            .map_err(|_| Error::HandshakeVerificationFailed("unreadable server certificate"))?;
        if identity.kind() != suite.key_exchange.credential_kind() {
            return Err(Error::HandshakeVerificationFailed(
                "certificate key does not fit the negotiated suite",
            ));
        }

        let (premaster, exchange) = if suite.key_exchange.is_ephemeral() {
            let Some(HandshakeMessage::ServerKeyExchange(params)) = messages.next() else {
                return Err(Error::UnexpectedMessage("expected ServerKeyExchange"));
            };
            if params.named_curve != NAMED_CURVE_P256 {
                return Err(Error::HandshakeVerificationFailed("unsupported named curve"));
            }
            verify_ephemeral_params(
                &identity,
                &client_random,
                &server_random,
                &params.public,
                &params.signature,
            )?;
            let engine = KeyAgreementEngine::generate(this.random.as_ref())?;
            let premaster = engine.agree(&params.public)?;
            (premaster, engine.public_key().to_vec())
        } else {
            let premaster = rsa_premaster(this.random.as_ref())?;
            let exchange = identity.encrypt_premaster(&premaster, this.random.as_ref())?;
            (premaster, exchange)
        };

        if !matches!(messages.next(), Some(HandshakeMessage::ServerHelloDone)) {
            return Err(Error::UnexpectedMessage("expected ServerHelloDone"));
        }
        if messages.next().is_some() {
            return Err(Error::UnexpectedMessage("message after ServerHelloDone"));
        }
        debug!(suite = suite.name, "server flight verified");

        let key_exchange = HandshakeMessage::ClientKeyExchange(ClientKeyExchange { exchange });
        this.transcript.update(&key_exchange)?;

        let session_hash = this.transcript.current_hash(suite.prf);
        let master_secret = derive_master_secret(suite, &premaster, &session_hash)?;
        let session_keys =
            derive_session_keys(suite, &master_secret, &client_random, &server_random)?;

        let verify = verify_data(suite, &master_secret, LABEL_CLIENT_FINISHED, &session_hash)?;
        let finished = HandshakeMessage::Finished(Finished {
            verify_data: verify.to_vec(),
        });
        this.transcript.update(&finished)?;

        let next = this.transition(ClientAwaitingFinished {
            suite,
            master_secret,
            session_keys,
        });
        Ok((
            ClientFlight {
                key_exchange,
                finished,
            },
            next,
        ))
    }
}
