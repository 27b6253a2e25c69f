//! Implements the server-side of the handshake protocol state machine.
//! 实现握手协议状态机的服务器端。

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::credential::CredentialStore;
use crate::crypto::random::RandomSource;
use crate::crypto::suite::Ciphersuite;
use crate::protocol::transcript::Transcript;

mod builder;
mod state_awaiting_key_exchange;
mod state_keys_derived;
mod state_start;

pub use builder::{HandshakeServerBuilder, Missing};

/// The server-side handshake state machine.
///
/// Generic over the state `S` to enforce protocol flow at compile time.
/// This ensures that methods can only be called in the correct sequence,
/// preventing logical errors in the protocol's implementation.
///
/// 服务器端握手协议状态机。
///
/// 通过泛型状态 `S` 在编译时强制执行协议流程。
/// 这确保了方法只能按正确的顺序调用，防止了协议实现中的逻辑错误。
pub struct HandshakeServer<S, StateData> {
    /// Zero-sized marker to hold the current state `S`.
    ///
    /// 零大小标记，用于持有当前状态 `S`。
    state: PhantomData<S>,
    /// The actual data associated with the current state.
    ///
    /// 与当前状态关联的实际数据。
    state_data: StateData,
    /// Suites this server accepts, in preference order.
    ///
    /// 服务器接受的密码套件，按偏好排序。
    permitted: Vec<&'static Ciphersuite>,
    /// Long-term credentials, selected per connection by key-exchange kind.
    ///
    /// 长期凭据，按密钥交换类型为每个连接选择。
    credentials: Arc<CredentialStore>,
    random: Arc<dyn RandomSource>,
    /// A running hash of the handshake transcript.
    /// The master secret and both Finished messages are bound to it.
    ///
    /// 握手记录的运行哈希，主密钥和双方的 Finished 消息都与之绑定。
    transcript: Transcript,
}

impl<S, D> HandshakeServer<S, D> {
    /// Splits off the current state data.
    fn into_state(self) -> (D, HandshakeServer<S, ()>) {
        let rest = HandshakeServer {
            state: PhantomData,
            state_data: (),
            permitted: self.permitted,
            credentials: self.credentials,
            random: self.random,
            transcript: self.transcript,
        };
        (self.state_data, rest)
    }

    /// Moves the shared fields into the next state.
    fn transition<N, E>(self, state_data: E) -> HandshakeServer<N, E> {
        HandshakeServer {
            state: PhantomData,
            state_data,
            permitted: self.permitted,
            credentials: self.credentials,
            random: self.random,
            transcript: self.transcript,
        }
    }
}

impl<S, D: fmt::Debug> fmt::Debug for HandshakeServer<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeServer")
            .field("state", &std::any::type_name::<S>())
            .field("state_data", &self.state_data)
            .field("permitted", &self.permitted.iter().map(|s| s.id).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
