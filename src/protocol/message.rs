//! Defines the messages exchanged during the handshake protocol.
//!
//! Each message travels as `msg_type(1) | length(3) | body`, where the body is
//! the bincode encoding of the message struct under [`wire_config`].
//!
//! 定义握手协议中交换的消息。每条消息以 `msg_type(1) | length(3) | body` 的形式传输。

use bincode::{Decode, Encode};

use crate::error::{BincodeError, Error, Result};

/// The only protocol version this engine speaks.
pub const PROTOCOL_VERSION: u16 = 0x0303;
/// The "null" compression method, the only one accepted.
pub const COMPRESSION_NULL: u8 = 0;
pub const HANDSHAKE_HEADER_LEN: usize = 4;
pub const MAX_HANDSHAKE_BODY: usize = 64 * 1024;

/// The bincode configuration used for every handshake body.
///
/// Big-endian fixed-width integers keep the encoding canonical, and the limit
/// bounds allocations driven by peer-supplied lengths.
pub fn wire_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
        .with_limit::<MAX_HANDSHAKE_BODY>()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeType {
    ClientHello,
    ServerHello,
    Certificate,
    ServerKeyExchange,
    ServerHelloDone,
    ClientKeyExchange,
    Finished,
}

impl HandshakeType {
    pub const fn to_u8(self) -> u8 {
        match self {
            HandshakeType::ClientHello => 1,
            HandshakeType::ServerHello => 2,
            HandshakeType::Certificate => 11,
            HandshakeType::ServerKeyExchange => 12,
            HandshakeType::ServerHelloDone => 14,
            HandshakeType::ClientKeyExchange => 16,
            HandshakeType::Finished => 20,
        }
    }

    pub const fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => HandshakeType::ClientHello,
            2 => HandshakeType::ServerHello,
            11 => HandshakeType::Certificate,
            12 => HandshakeType::ServerKeyExchange,
            14 => HandshakeType::ServerHelloDone,
            16 => HandshakeType::ClientKeyExchange,
            20 => HandshakeType::Finished,
            _ => return None,
        })
    }
}

/// Client -> Server: opens the handshake with the offered suites.
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub version: u16,
    pub random: [u8; 32],
    /// Offered suite ids, most preferred first.
    pub cipher_suites: Vec<u16>,
    pub compression_methods: Vec<u8>,
}

/// Server -> Client: the single suite the server picked.
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub version: u16,
    pub random: [u8; 32],
    pub cipher_suite: u16,
    pub compression_method: u8,
}

/// Server -> Client: the DER certificate chain, leaf first.
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub chain: Vec<Vec<u8>>,
}

/// Server -> Client: signed ephemeral ECDHE parameters.
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyExchange {
    pub named_curve: u16,
    /// Uncompressed SEC1 point.
    pub public: Vec<u8>,
    /// Signature by the certificate key over both randoms and the parameters.
    pub signature: Vec<u8>,
}

/// Client -> Server: the client's ECDHE point, or the RSA-encrypted premaster.
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct ClientKeyExchange {
    pub exchange: Vec<u8>,
}

#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    Certificate(Certificate),
    ServerKeyExchange(ServerKeyExchange),
    ServerHelloDone,
    ClientKeyExchange(ClientKeyExchange),
    Finished(Finished),
}

impl HandshakeMessage {
    pub fn handshake_type(&self) -> HandshakeType {
        match self {
            HandshakeMessage::ClientHello(_) => HandshakeType::ClientHello,
            HandshakeMessage::ServerHello(_) => HandshakeType::ServerHello,
            HandshakeMessage::Certificate(_) => HandshakeType::Certificate,
            HandshakeMessage::ServerKeyExchange(_) => HandshakeType::ServerKeyExchange,
            HandshakeMessage::ServerHelloDone => HandshakeType::ServerHelloDone,
            HandshakeMessage::ClientKeyExchange(_) => HandshakeType::ClientKeyExchange,
            HandshakeMessage::Finished(_) => HandshakeType::Finished,
        }
    }

    /// Encodes the message with its 4-byte handshake header.
    ///
    /// 编码消息（含 4 字节握手头）。
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = match self {
            HandshakeMessage::ClientHello(m) => bincode::encode_to_vec(m, wire_config())?,
            HandshakeMessage::ServerHello(m) => bincode::encode_to_vec(m, wire_config())?,
            HandshakeMessage::Certificate(m) => bincode::encode_to_vec(m, wire_config())?,
            HandshakeMessage::ServerKeyExchange(m) => bincode::encode_to_vec(m, wire_config())?,
            HandshakeMessage::ServerHelloDone => Vec::new(),
            HandshakeMessage::ClientKeyExchange(m) => bincode::encode_to_vec(m, wire_config())?,
            HandshakeMessage::Finished(m) => bincode::encode_to_vec(m, wire_config())?,
        };
        if body.len() > MAX_HANDSHAKE_BODY {
            return Err(Error::UnexpectedMessage("handshake message too large"));
        }

        let mut out = Vec::with_capacity(HANDSHAKE_HEADER_LEN + body.len());
        out.push(self.handshake_type().to_u8());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decodes one message body of the given type. The body must be consumed
    /// exactly.
    ///
    /// 解码给定类型的消息体，消息体必须被完整消耗。
    pub fn decode(msg_type: u8, body: &[u8]) -> Result<Self> {
        let kind = HandshakeType::from_u8(msg_type)
            .ok_or(Error::UnexpectedMessage("unknown handshake message type"))?;
        Ok(match kind {
            HandshakeType::ClientHello => HandshakeMessage::ClientHello(decode_exact(body)?),
            HandshakeType::ServerHello => HandshakeMessage::ServerHello(decode_exact(body)?),
            HandshakeType::Certificate => HandshakeMessage::Certificate(decode_exact(body)?),
            HandshakeType::ServerKeyExchange => {
                HandshakeMessage::ServerKeyExchange(decode_exact(body)?)
            }
            HandshakeType::ServerHelloDone => {
                if !body.is_empty() {
                    return Err(BincodeError::Trailing(body.len()).into());
                }
                HandshakeMessage::ServerHelloDone
            }
            HandshakeType::ClientKeyExchange => {
                HandshakeMessage::ClientKeyExchange(decode_exact(body)?)
            }
            HandshakeType::Finished => HandshakeMessage::Finished(decode_exact(body)?),
        })
    }

    /// Splits one complete message off the front of `buf`, if present.
    ///
    /// Returns the message and the number of bytes it occupied, including the
    /// header. `Ok(None)` means more bytes are needed.
    pub fn parse_framed(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        if buf.len() < HANDSHAKE_HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([0, buf[1], buf[2], buf[3]]) as usize;
        if len > MAX_HANDSHAKE_BODY {
            return Err(Error::UnexpectedMessage("handshake message too large"));
        }
        let total = HANDSHAKE_HEADER_LEN + len;
        if buf.len() < total {
            return Ok(None);
        }
        let message = Self::decode(buf[0], &buf[HANDSHAKE_HEADER_LEN..total])?;
        Ok(Some((message, total)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            HandshakeMessage::ClientHello(_) => "ClientHello",
            HandshakeMessage::ServerHello(_) => "ServerHello",
            HandshakeMessage::Certificate(_) => "Certificate",
            HandshakeMessage::ServerKeyExchange(_) => "ServerKeyExchange",
            HandshakeMessage::ServerHelloDone => "ServerHelloDone",
            HandshakeMessage::ClientKeyExchange(_) => "ClientKeyExchange",
            HandshakeMessage::Finished(_) => "Finished",
        }
    }
}

fn decode_exact<T: Decode<()>>(body: &[u8]) -> Result<T> {
    let (value, read) = bincode::decode_from_slice::<T, _>(body, wire_config())?;
    if read != body.len() {
        return Err(BincodeError::Trailing(body.len() - read).into());
    }
    Ok(value)
}
