use super::HandshakeClient;
use crate::crypto::keys::{LABEL_SERVER_FINISHED, SessionKeys, verify_data, verify_data_matches};
use crate::crypto::suite::Ciphersuite;
use crate::error::{Error, Result};
use crate::protocol::message::HandshakeMessage;
use crate::protocol::state::{
    AwaitingServerFinished, ClientAwaitingFinished, ClientEstablished, Established,
};

impl HandshakeClient<AwaitingServerFinished, ClientAwaitingFinished> {
    pub fn suite(&self) -> &'static Ciphersuite {
        self.state_data.suite
    }

    pub fn session_keys(&self) -> &SessionKeys {
        &self.state_data.session_keys
    }

    /// Verifies the server's Finished, completing the handshake.
    ///
    /// 校验服务器的 Finished 消息，完成握手。
    pub fn process_server_finished(
        mut self,
        message: HandshakeMessage,
    ) -> Result<HandshakeClient<Established, ClientEstablished>> {
        let received = match &message {
            HandshakeMessage::Finished(finished) => &finished.verify_data,
            _ => return Err(Error::UnexpectedMessage("expected Finished")),
        };

        let ClientAwaitingFinished {
            suite,
            master_secret,
            ..
        } = &self.state_data;
        let expected = verify_data(
            suite,
            master_secret,
            LABEL_SERVER_FINISHED,
            &self.transcript.current_hash(suite.prf),
        )?;
        if !verify_data_matches(&expected, received) {
            return Err(Error::TranscriptMismatch);
        }
        self.transcript.update(&message)?;

        let (data, this) = self.into_state();
        Ok(this.transition(ClientEstablished {
            suite: data.suite,
            session_keys: data.session_keys,
        }))
    }
}

impl HandshakeClient<Established, ClientEstablished> {
    pub fn suite(&self) -> &'static Ciphersuite {
        self.state_data.suite
    }

    /// Consumes the finished machine, yielding what the record layer needs.
    pub fn into_session_parts(self) -> (&'static Ciphersuite, SessionKeys) {
        let (data, _) = self.into_state();
        (data.suite, data.session_keys)
    }
}
