use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::crypto::suite::KeyExchangeKind;
use crate::protocol::alert::AlertDescription;

/// An error related to `bincode` serialization or deserialization.
///
/// This is a wrapper around `bincode`'s own error types to provide a more
/// consistent error handling experience within this crate.
///
/// 与 `bincode` 序列化或反序列化相关的错误。
///
/// 这是对 `bincode` 自身错误类型的包装，以便在此 crate 中提供更一致的错误处理体验。
#[derive(Error, Debug)]
pub enum BincodeError {
    /// An error occurred during serialization (encoding).
    ///
    /// 在序列化（编码）过程中发生错误。
    #[error("Encode error: {0}")]
    Enc(#[source] Box<bincode::error::EncodeError>),
    /// An error occurred during deserialization (decoding).
    ///
    /// 在反序列化（解码）过程中发生错误。
    #[error("Decode error: {0}")]
    Dec(#[source] Box<bincode::error::DecodeError>),
    /// The body decoded cleanly but left unread bytes behind.
    ///
    /// 消息体解码成功，但仍有未读取的字节。
    #[error("{0} trailing bytes after message body")]
    Trailing(usize),
}

impl From<bincode::error::EncodeError> for BincodeError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BincodeError::Enc(Box::from(err))
    }
}

impl From<bincode::error::DecodeError> for BincodeError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BincodeError::Dec(Box::from(err))
    }
}

/// Failures raised while framing or unprotecting records.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    #[error("malformed record header")]
    MalformedHeader,
    #[error("record authentication failed")]
    AuthenticationFailed,
    #[error("compressed records are not supported")]
    DecompressionUnsupported,
    #[error("record exceeds the maximum fragment length")]
    RecordOverflow,
    #[error("record sequence number exhausted")]
    SequenceOverflow,
}

/// Malformed certificate or key material, reported at startup.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("certificate chain is empty")]
    EmptyChain,
    #[error("certificate #{index} is not a valid X.509 DER certificate: {reason}")]
    Certificate { index: usize, reason: String },
    #[error("private key is not a PKCS#8 RSA or P-256 key")]
    PrivateKey,
    #[error("certificate carries an unsupported public key algorithm")]
    UnsupportedKeyAlgorithm,
    #[error("private key does not match the leaf certificate")]
    KeyMismatch,
    #[error("PEM input: {0}")]
    Pem(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("credential parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("no ciphersuite in common with the peer")]
    NoCommonCiphersuite,

    #[error("handshake verification failed: {0}")]
    HandshakeVerificationFailed(&'static str),

    #[error("finished message does not match the handshake transcript")]
    TranscriptMismatch,

    #[error("peer sent close-notify")]
    PeerClosed,

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("operation would block")]
    WouldBlock,

    #[error("operation timed out")]
    Timeout,

    #[error("received an unexpected message: {0}")]
    UnexpectedMessage(&'static str),

    #[error("peer sent fatal alert: {0}")]
    AlertReceived(AlertDescription),

    #[error("ciphersuite {0} is not registered")]
    UnknownCiphersuite(u16),

    #[error("no credential configured for key exchange {0:?}")]
    MissingCredential(KeyExchangeKind),

    #[error("random source failure: {0}")]
    Random(String),

    #[error("serialization or deserialization failed: {0}")]
    Serialization(#[from] BincodeError),

    #[error("invalid state transition attempted")]
    InvalidState,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => Error::WouldBlock,
            _ => Error::Transport(err),
        }
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(err: bincode::error::EncodeError) -> Self {
        Error::Serialization(err.into())
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(err: bincode::error::DecodeError) -> Self {
        Error::Serialization(err.into())
    }
}

impl Error {
    /// Stable numeric code printed next to the description.
    pub fn code(&self) -> i32 {
        match self {
            Error::Transport(_) => -0x004C,
            Error::ConnectionReset => -0x0050,
            Error::Random(_) => -0x0034,
            Error::Parse(_) => -0x2180,
            Error::WouldBlock => -0x6900,
            Error::Timeout => -0x6800,
            Error::Record(RecordError::SequenceOverflow) => -0x6B80,
            Error::Record(RecordError::DecompressionUnsupported) => -0x7080,
            Error::Record(RecordError::AuthenticationFailed) => -0x7180,
            Error::Record(RecordError::MalformedHeader) => -0x7200,
            Error::Record(RecordError::RecordOverflow) => -0x7280,
            Error::NoCommonCiphersuite => -0x7380,
            Error::MissingCredential(_) => -0x7600,
            Error::UnexpectedMessage(_) => -0x7700,
            Error::AlertReceived(_) => -0x7780,
            Error::PeerClosed => -0x7880,
            Error::Serialization(_) => -0x7900,
            Error::HandshakeVerificationFailed(_) => -0x7C00,
            Error::TranscriptMismatch => -0x7E80,
            Error::UnknownCiphersuite(_) | Error::InvalidState | Error::Config(_) => -0x7100,
        }
    }

    /// The fatal alert the local side reports to the peer before giving up, if any.
    pub fn alert(&self) -> Option<AlertDescription> {
        match self {
            Error::Record(RecordError::AuthenticationFailed) => Some(AlertDescription::BadRecordMac),
            Error::Record(RecordError::MalformedHeader) => Some(AlertDescription::DecodeError),
            Error::Record(RecordError::DecompressionUnsupported) => {
                Some(AlertDescription::DecompressionFailure)
            }
            Error::Record(RecordError::RecordOverflow) => Some(AlertDescription::RecordOverflow),
            Error::NoCommonCiphersuite | Error::MissingCredential(_) => {
                Some(AlertDescription::HandshakeFailure)
            }
            Error::HandshakeVerificationFailed(_) | Error::TranscriptMismatch => {
                Some(AlertDescription::DecryptError)
            }
            Error::Serialization(_) => Some(AlertDescription::DecodeError),
            Error::UnexpectedMessage(_) => Some(AlertDescription::UnexpectedMessage),
            Error::Transport(_)
            | Error::ConnectionReset
            | Error::PeerClosed
            | Error::WouldBlock
            | Error::Timeout
            | Error::AlertReceived(_) => None,
            Error::Record(RecordError::SequenceOverflow)
            | Error::Parse(_)
            | Error::UnknownCiphersuite(_)
            | Error::Random(_)
            | Error::InvalidState
            | Error::Config(_) => Some(AlertDescription::InternalError),
        }
    }

    /// True for errors that end a single connection; the serving loop keeps accepting.
    pub fn is_connection_scoped(&self) -> bool {
        !matches!(
            self,
            Error::Parse(_) | Error::Config(_) | Error::UnknownCiphersuite(_)
        )
    }

    /// A handshake cut short by the peer is a transport failure, not a reset
    /// of an established session.
    pub(crate) fn into_transport(self) -> Self {
        match self {
            Error::ConnectionReset => Error::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "transport closed during handshake",
            )),
            other => other,
        }
    }

    /// Maps an abrupt end of the byte stream onto [`Error::ConnectionReset`].
    pub(crate) fn into_reset(self) -> Self {
        match self {
            Error::Transport(ref e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::UnexpectedEof
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::BrokenPipe
                ) =>
            {
                Error::ConnectionReset
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_is_not_a_transport_failure() {
        let err: Error = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert!(matches!(err, Error::WouldBlock));

        let err: Error = io::Error::from(io::ErrorKind::ConnectionRefused).into();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn eof_maps_to_connection_reset() {
        let err: Error = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert!(matches!(err.into_reset(), Error::ConnectionReset));

        let err: Error = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert!(matches!(err.into_reset(), Error::Transport(_)));
    }

    #[test]
    fn reset_during_handshake_is_a_transport_error() {
        match Error::ConnectionReset.into_transport() {
            Error::Transport(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(Error::PeerClosed.into_transport(), Error::PeerClosed));
    }

    #[test]
    fn handshake_failures_are_connection_scoped() {
        assert!(Error::NoCommonCiphersuite.is_connection_scoped());
        assert!(Error::TranscriptMismatch.is_connection_scoped());
        assert!(!Error::Parse(ParseError::EmptyChain).is_connection_scoped());
        assert!(Error::Random("entropy".into()).is_connection_scoped());
        assert_eq!(
            Error::NoCommonCiphersuite.alert(),
            Some(AlertDescription::HandshakeFailure)
        );
        assert_eq!(Error::PeerClosed.alert(), None);
    }

    #[test]
    fn codes_are_negative_and_distinct_per_kind() {
        let errors = [
            Error::NoCommonCiphersuite,
            Error::TranscriptMismatch,
            Error::HandshakeVerificationFailed("x"),
            Error::Record(RecordError::AuthenticationFailed),
            Error::PeerClosed,
            Error::ConnectionReset,
        ];
        let mut codes: Vec<i32> = errors.iter().map(Error::code).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
