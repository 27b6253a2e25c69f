use super::HandshakeClient;
use crate::crypto::random::{OsRandom, RandomSource};
use crate::handshake::server::Missing;
use crate::protocol::state::{ClientReady, Ready};
use crate::protocol::transcript::Transcript;
use std::marker::PhantomData;
use std::sync::Arc;

/// A builder for creating a `HandshakeClient`.
///
/// 用于创建 `HandshakeClient` 的构建器。
pub struct HandshakeClientBuilder<Offered> {
    offered: Offered,
    random: Option<Arc<dyn RandomSource>>,
}

impl HandshakeClientBuilder<Missing> {
    pub fn new() -> Self {
        Self {
            offered: Missing,
            random: None,
        }
    }
}

impl Default for HandshakeClientBuilder<Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> HandshakeClientBuilder<O> {
    /// Sets the suite ids to offer, most preferred first.
    ///
    /// 设置要提供的套件标识，最优先的在前。
    pub fn offered_suites(self, ids: Vec<u16>) -> HandshakeClientBuilder<Vec<u16>> {
        HandshakeClientBuilder {
            offered: ids,
            random: self.random,
        }
    }

    /// Sets the random source. Defaults to operating-system entropy.
    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }
}

impl HandshakeClientBuilder<Vec<u16>> {
    /// Builds the `HandshakeClient`.
    ///
    /// 构建 `HandshakeClient`。
    pub fn build(self) -> HandshakeClient<Ready, ClientReady> {
        HandshakeClient {
            state: PhantomData,
            state_data: ClientReady::default(),
            offered: self.offered,
            random: self.random.unwrap_or_else(|| Arc::new(OsRandom)),
            transcript: Transcript::new(),
        }
    }
}
