//! Implements the client-side of the handshake protocol state machine.
//! 实现握手协议状态机的客户端。

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::crypto::random::RandomSource;
use crate::protocol::message::HandshakeMessage;
use crate::protocol::transcript::Transcript;

mod builder;
mod state_awaiting_flight;
mod state_established;
mod state_ready;

pub use builder::HandshakeClientBuilder;

/// The client's answer to the server flight: `ClientKeyExchange`, to be sent
/// before `ChangeCipherSpec`, and `Finished`, to be sent after it.
///
/// 客户端对服务器消息组的应答。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFlight {
    pub key_exchange: HandshakeMessage,
    pub finished: HandshakeMessage,
}

/// The client-side handshake state machine.
///
/// Generic over the state `S` to enforce protocol flow at compile time.
/// This prevents out-of-order operations, such as trying to encrypt data before keys are established.
///
/// 客户端握手协议状态机。
///
/// 通过泛型状态 `S` 在编译时强制执行协议流程。
/// 这可以防止乱序操作，例如在密钥建立之前尝试加密数据。
pub struct HandshakeClient<S, StateData> {
    /// Zero-sized marker to hold the current state `S`.
    ///
    /// 零大小标记，用于持有当前状态 `S`。
    state: PhantomData<S>,
    state_data: StateData,
    /// Offered suite ids, most preferred first.
    ///
    /// 提供的套件标识，最优先的在前。
    offered: Vec<u16>,
    random: Arc<dyn RandomSource>,
    /// A running hash of the handshake transcript for integrity checks.
    ///
    /// 用于完整性检查的握手记录的运行哈希。
    transcript: Transcript,
}

impl<S, D> HandshakeClient<S, D> {
    fn into_state(self) -> (D, HandshakeClient<S, ()>) {
        let rest = HandshakeClient {
            state: PhantomData,
            state_data: (),
            offered: self.offered,
            random: self.random,
            transcript: self.transcript,
        };
        (self.state_data, rest)
    }

    fn transition<N, E>(self, state_data: E) -> HandshakeClient<N, E> {
        HandshakeClient {
            state: PhantomData,
            state_data,
            offered: self.offered,
            random: self.random,
            transcript: self.transcript,
        }
    }
}

impl<S, D: fmt::Debug> fmt::Debug for HandshakeClient<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeClient")
            .field("state", &std::any::type_name::<S>())
            .field("state_data", &self.state_data)
            .field("offered", &self.offered)
            .finish_non_exhaustive()
    }
}
