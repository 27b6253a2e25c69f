use super::HandshakeServer;
use crate::crypto::keys::{
    LABEL_CLIENT_FINISHED, LABEL_SERVER_FINISHED, SessionKeys, verify_data, verify_data_matches,
};
use crate::crypto::suite::Ciphersuite;
use crate::error::{Error, Result};
use crate::protocol::message::{Finished, HandshakeMessage};
use crate::protocol::state::{HandshakeComplete, KeysDerived, ServerComplete, ServerKeysDerived};

impl HandshakeServer<KeysDerived, ServerKeysDerived> {
    pub fn suite(&self) -> &'static Ciphersuite {
        self.state_data.suite
    }

    /// Keys for both directions. The driver installs the client's write keys
    /// for reading when the client's `ChangeCipherSpec` arrives.
    pub fn session_keys(&self) -> &SessionKeys {
        &self.state_data.session_keys
    }

    /// Verifies the client's Finished over the transcript so far and produces
    /// the server's Finished over the transcript including it.
    ///
    /// A mismatch fails with [`Error::TranscriptMismatch`].
    ///
    /// 校验客户端的 Finished 并生成服务器的 Finished。不匹配时返回
    /// [`Error::TranscriptMismatch`]。
    pub fn process_client_finished(
        mut self,
        message: HandshakeMessage,
    ) -> Result<(
        HandshakeMessage,
        HandshakeServer<HandshakeComplete, ServerComplete>,
    )> {
        let received = match &message {
            HandshakeMessage::Finished(finished) => &finished.verify_data,
            _ => return Err(Error::UnexpectedMessage("expected Finished")),
        };

        let ServerKeysDerived {
            suite,
            master_secret,
            ..
        } = &self.state_data;
        let expected = verify_data(
            suite,
            master_secret,
            LABEL_CLIENT_FINISHED,
            &self.transcript.current_hash(suite.prf),
        )?;
        if !verify_data_matches(&expected, received) {
            return Err(Error::TranscriptMismatch);
        }

        self.transcript.update(&message)?;
        let ours = verify_data(
            suite,
            master_secret,
            LABEL_SERVER_FINISHED,
            &self.transcript.current_hash(suite.prf),
        )?;
        let reply = HandshakeMessage::Finished(Finished {
            verify_data: ours.to_vec(),
        });
        self.transcript.update(&reply)?;

        let (data, this) = self.into_state();
        let next = this.transition(ServerComplete {
            suite: data.suite,
            session_keys: data.session_keys,
        });
        Ok((reply, next))
    }
}

impl HandshakeServer<HandshakeComplete, ServerComplete> {
    pub fn suite(&self) -> &'static Ciphersuite {
        self.state_data.suite
    }

    pub fn session_keys(&self) -> &SessionKeys {
        &self.state_data.session_keys
    }

    /// Consumes the finished machine, yielding what the record layer needs.
    ///
    /// 消耗已完成的状态机，返回记录层所需的内容。
    pub fn into_session_parts(self) -> (&'static Ciphersuite, SessionKeys) {
        let (data, _) = self.into_state();
        (data.suite, data.session_keys)
    }
}
