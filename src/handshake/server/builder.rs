use super::HandshakeServer;
use crate::credential::CredentialStore;
use crate::crypto::random::{OsRandom, RandomSource};
use crate::crypto::suite::Ciphersuite;
use crate::protocol::state::{ServerStart, Start};
use crate::protocol::transcript::Transcript;
use std::marker::PhantomData;
use std::sync::Arc;

/// Marker type for a missing field in the builder.
///
/// 用于在构建器中标记缺失字段的类型。
#[derive(Debug)]
pub struct Missing;

/// A builder for creating a `HandshakeServer`.
///
/// This builder ensures that all required fields are provided before constructing the server.
///
/// 用于创建 `HandshakeServer` 的构建器。
///
/// 此构建器确保在构造服务器之前提供了所有必需的字段。
pub struct HandshakeServerBuilder<Suites, Creds> {
    permitted: Suites,
    credentials: Creds,
    random: Option<Arc<dyn RandomSource>>,
}

impl HandshakeServerBuilder<Missing, Missing> {
    /// Creates a new `HandshakeServerBuilder`.
    pub fn new() -> Self {
        Self {
            permitted: Missing,
            credentials: Missing,
            random: None,
        }
    }
}

impl Default for HandshakeServerBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, C> HandshakeServerBuilder<P, C> {
    /// Sets the suites the server accepts, most preferred first.
    ///
    /// 设置服务器接受的密码套件，最优先的在前。
    pub fn permitted_suites(
        self,
        suites: Vec<&'static Ciphersuite>,
    ) -> HandshakeServerBuilder<Vec<&'static Ciphersuite>, C> {
        HandshakeServerBuilder {
            permitted: suites,
            credentials: self.credentials,
            random: self.random,
        }
    }

    /// Sets the server's long-term credentials.
    ///
    /// This is required to authenticate the server.
    ///
    /// 设置服务器的长期凭据。这是验证服务器身份所必需的。
    pub fn credentials(
        self,
        credentials: Arc<CredentialStore>,
    ) -> HandshakeServerBuilder<P, Arc<CredentialStore>> {
        HandshakeServerBuilder {
            permitted: self.permitted,
            credentials,
            random: self.random,
        }
    }

    /// Sets the random source. Defaults to operating-system entropy.
    ///
    /// 设置随机源，默认使用操作系统熵源。
    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }
}

impl HandshakeServerBuilder<Vec<&'static Ciphersuite>, Arc<CredentialStore>> {
    /// Builds the `HandshakeServer`.
    ///
    /// This method is only available when all required fields have been provided.
    ///
    /// 构建 `HandshakeServer`。
    ///
    /// 此方法仅在提供了所有必需字段时可用。
    pub fn build(self) -> HandshakeServer<Start, ServerStart> {
        HandshakeServer {
            state: PhantomData,
            state_data: ServerStart::default(),
            permitted: self.permitted,
            credentials: self.credentials,
            random: self.random.unwrap_or_else(|| Arc::new(OsRandom)),
            transcript: Transcript::new(),
        }
    }
}
