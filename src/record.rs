//! The record layer: framing plus per-direction protection state.
//!
//! ```text
//! content_type(1) | version(2) | length(2) | fragment
//! ```
//!
//! Records are unprotected until a direction's keys are installed. Each
//! direction's keys are installed at most once, and the sequence counter that
//! goes with them starts at zero and never wraps.
//!
//! 记录层：分帧以及每个方向的保护状态。

use tracing::trace;

use crate::crypto::cipher::RecordProtection;
use crate::crypto::keys::DirectionKeys;
use crate::crypto::suite::Ciphersuite;
use crate::error::{Error, RecordError, Result};
use crate::protocol::message::PROTOCOL_VERSION;

pub const HEADER_LEN: usize = 5;
pub const MAX_PLAINTEXT: usize = 1 << 14;
pub const MAX_CIPHERTEXT: usize = MAX_PLAINTEXT + 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
}

impl ContentType {
    pub const fn to_u8(self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
        }
    }

    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            20 => Some(ContentType::ChangeCipherSpec),
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub version: u16,
    pub length: usize,
}

impl RecordHeader {
    /// Total record size, header included.
    pub fn record_len(&self) -> usize {
        HEADER_LEN + self.length
    }
}

/// Parses the 5-byte record header.
///
/// An unknown content type or a major version other than 3 is a
/// [`RecordError::MalformedHeader`]; a length no protected record could have
/// is a [`RecordError::RecordOverflow`].
pub fn parse_header(bytes: &[u8]) -> Result<RecordHeader> {
    let [ty, major, minor, hi, lo] = bytes
        .get(..HEADER_LEN)
        .and_then(|h| <[u8; HEADER_LEN]>::try_from(h).ok())
        .ok_or(RecordError::MalformedHeader)?;
    let content_type = ContentType::from_u8(ty).ok_or(RecordError::MalformedHeader)?;
    if major != 3 {
        return Err(RecordError::MalformedHeader.into());
    }
    let length = u16::from_be_bytes([hi, lo]) as usize;
    if length > MAX_CIPHERTEXT {
        return Err(RecordError::RecordOverflow.into());
    }
    Ok(RecordHeader {
        content_type,
        version: u16::from_be_bytes([major, minor]),
        length,
    })
}

#[derive(Debug, Default)]
struct Direction {
    protection: Option<RecordProtection>,
    sequence: u64,
}

impl Direction {
    fn install(&mut self, suite: &'static Ciphersuite, keys: &DirectionKeys) -> Result<()> {
        if self.protection.is_some() {
            return Err(Error::InvalidState);
        }
        self.protection = Some(RecordProtection::new(suite, keys)?);
        self.sequence = 0;
        Ok(())
    }

    /// Returns the current sequence number and advances the counter.
    fn next_sequence(&mut self) -> Result<u64> {
        let current = self.sequence;
        self.sequence = current
            .checked_add(1)
            .ok_or(RecordError::SequenceOverflow)?;
        Ok(current)
    }
}

/// Per-connection record framing and protection state.
///
/// 每个连接的记录分帧与保护状态。
#[derive(Debug, Default)]
pub struct RecordLayer {
    write: Direction,
    read: Direction,
}

impl RecordLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the keys used for outgoing records. Allowed once.
    pub fn install_write_keys(&mut self, suite: &'static Ciphersuite, keys: &DirectionKeys) -> Result<()> {
        self.write.install(suite, keys)
    }

    /// Installs the keys used for incoming records. Allowed once.
    pub fn install_read_keys(&mut self, suite: &'static Ciphersuite, keys: &DirectionKeys) -> Result<()> {
        self.read.install(suite, keys)
    }

    pub fn is_write_protected(&self) -> bool {
        self.write.protection.is_some()
    }

    pub fn is_read_protected(&self) -> bool {
        self.read.protection.is_some()
    }

    pub fn write_sequence(&self) -> u64 {
        self.write.sequence
    }

    pub fn read_sequence(&self) -> u64 {
        self.read.sequence
    }

    /// Frames one record, protecting it when write keys are installed.
    ///
    /// 构造一条记录；若已安装写密钥则对其加密保护。
    pub fn seal(&mut self, content_type: ContentType, plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.len() > MAX_PLAINTEXT {
            return Err(RecordError::RecordOverflow.into());
        }
        let seq = self.write.next_sequence()?;
        let fragment = match &self.write.protection {
            Some(protection) => protection.seal(seq, content_type.to_u8(), PROTOCOL_VERSION, plaintext)?,
            None => plaintext.to_vec(),
        };

        let mut record = Vec::with_capacity(HEADER_LEN + fragment.len());
        record.push(content_type.to_u8());
        record.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
        record.extend_from_slice(&(fragment.len() as u16).to_be_bytes());
        record.extend_from_slice(&fragment);
        trace!(?content_type, seq, len = fragment.len(), "sealed record");
        Ok(record)
    }

    /// Opens one complete record.
    ///
    /// `record` must hold exactly one record, header included.
    ///
    /// 打开一条完整的记录（含头部）。
    pub fn open(&mut self, record: &[u8]) -> Result<(ContentType, Vec<u8>)> {
        let header = parse_header(record)?;
        if record.len() != header.record_len() {
            return Err(RecordError::MalformedHeader.into());
        }
        let fragment = &record[HEADER_LEN..];
        let seq = self.read.next_sequence()?;

        let plaintext = match &self.read.protection {
            Some(protection) => {
                protection.open(seq, header.content_type.to_u8(), header.version, fragment)?
            }
            None => {
                if fragment.len() > MAX_PLAINTEXT {
                    return Err(RecordError::RecordOverflow.into());
                }
                fragment.to_vec()
            }
        };
        if plaintext.len() > MAX_PLAINTEXT {
            return Err(RecordError::RecordOverflow.into());
        }
        trace!(content_type = ?header.content_type, seq, len = plaintext.len(), "opened record");
        Ok((header.content_type, plaintext))
    }

    #[cfg(test)]
    pub(crate) fn force_write_sequence(&mut self, seq: u64) {
        self.write.sequence = seq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::cipher::RecordProtection;
    use crate::crypto::keys::{Role, derive_master_secret, derive_session_keys};
    use crate::crypto::suite::lookup;

    fn keyed_pair(id: u16) -> (RecordLayer, RecordLayer) {
        let suite = lookup(id).unwrap();
        let master = derive_master_secret(suite, &[8; 48], &[1; 32]).unwrap();
        let keys = derive_session_keys(suite, &master, &[2; 32], &[3; 32]).unwrap();
        let (sw, sr) = keys.for_role(Role::Server);
        let (cw, cr) = keys.for_role(Role::Client);
        let mut server = RecordLayer::new();
        server.install_write_keys(suite, sw).unwrap();
        server.install_read_keys(suite, sr).unwrap();
        let mut client = RecordLayer::new();
        client.install_write_keys(suite, cw).unwrap();
        client.install_read_keys(suite, cr).unwrap();
        (client, server)
    }

    #[test]
    fn plaintext_records_have_accurate_headers() {
        let mut layer = RecordLayer::new();
        let record = layer.seal(ContentType::Handshake, b"abc").unwrap();
        assert_eq!(record, [22, 3, 3, 0, 3, b'a', b'b', b'c']);
        let (ty, body) = RecordLayer::new().open(&record).unwrap();
        assert_eq!(ty, ContentType::Handshake);
        assert_eq!(body, b"abc");
    }

    #[test]
    fn protected_records_open_in_order() {
        let (mut client, mut server) = keyed_pair(0xC030);
        let a = client.seal(ContentType::ApplicationData, b"first").unwrap();
        let b = client.seal(ContentType::ApplicationData, b"second").unwrap();
        assert_eq!(client.write_sequence(), 2);
        assert_ne!(a[HEADER_LEN..HEADER_LEN + 8], b[HEADER_LEN..HEADER_LEN + 8]);

        assert_eq!(server.open(&a).unwrap().1, b"first");
        assert_eq!(server.open(&b).unwrap().1, b"second");
        assert_eq!(server.read_sequence(), 2);
    }

    #[test]
    fn replayed_record_fails_authentication() {
        let (mut client, mut server) = keyed_pair(0xCCA9);
        let a = client.seal(ContentType::ApplicationData, b"once").unwrap();
        server.open(&a).unwrap();
        let err = server.open(&a).unwrap_err();
        assert!(matches!(err, Error::Record(RecordError::AuthenticationFailed)));
    }

    #[test]
    fn keys_install_once() {
        let suite = lookup(0xC02F).unwrap();
        let master = derive_master_secret(suite, &[8; 48], &[1; 32]).unwrap();
        let keys = derive_session_keys(suite, &master, &[2; 32], &[3; 32]).unwrap();
        let mut layer = RecordLayer::new();
        layer.install_write_keys(suite, &keys.server_write).unwrap();
        assert!(matches!(
            layer.install_write_keys(suite, &keys.server_write),
            Err(Error::InvalidState)
        ));
    }

    #[test]
    fn sequence_never_wraps() {
        let mut layer = RecordLayer::new();
        layer.force_write_sequence(u64::MAX - 1);
        layer.seal(ContentType::ApplicationData, b"last").unwrap();
        let err = layer.seal(ContentType::ApplicationData, b"one more").unwrap_err();
        assert!(matches!(err, Error::Record(RecordError::SequenceOverflow)));
    }

    #[test]
    fn header_validation() {
        assert!(matches!(
            parse_header(&[99, 3, 3, 0, 0]),
            Err(Error::Record(RecordError::MalformedHeader))
        ));
        assert!(matches!(
            parse_header(&[23, 2, 0, 0, 0]),
            Err(Error::Record(RecordError::MalformedHeader))
        ));
        assert!(matches!(
            parse_header(&[23, 3, 3, 0xFF, 0xFF]),
            Err(Error::Record(RecordError::RecordOverflow))
        ));
        assert!(parse_header(&[23, 3]).is_err());
    }

    #[test]
    fn oversized_plaintext_is_refused() {
        let mut layer = RecordLayer::new();
        let big = vec![0u8; MAX_PLAINTEXT + 1];
        assert!(matches!(
            layer.seal(ContentType::ApplicationData, &big),
            Err(Error::Record(RecordError::RecordOverflow))
        ));

        let mut record = vec![23, 3, 3];
        record.extend_from_slice(&((MAX_PLAINTEXT + 1) as u16).to_be_bytes());
        record.extend_from_slice(&big);
        assert!(matches!(
            RecordLayer::new().open(&record),
            Err(Error::Record(RecordError::RecordOverflow))
        ));
    }

    #[test]
    fn full_size_protected_record_round_trips() {
        for id in [0xC02F, 0xCCA8, 0x003B] {
            let (mut client, mut server) = keyed_pair(id);
            let full: Vec<u8> = (0..MAX_PLAINTEXT).map(|i| i as u8).collect();
            let record = client.seal(ContentType::ApplicationData, &full).unwrap();
            assert!(parse_header(&record).is_ok());
            assert_eq!(server.open(&record).unwrap().1, full);
        }
    }

    #[test]
    fn protected_plaintext_over_the_limit_overflows() {
        let suite = lookup(0x003B).unwrap();
        let master = derive_master_secret(suite, &[8; 48], &[1; 32]).unwrap();
        let keys = derive_session_keys(suite, &master, &[2; 32], &[3; 32]).unwrap();
        let (_, read) = keys.for_role(Role::Server);
        let mut server = RecordLayer::new();
        server.install_read_keys(suite, read).unwrap();

        // Authentic, but one byte longer than any record may carry.
        let big = vec![7u8; MAX_PLAINTEXT + 1];
        let protection = RecordProtection::new(suite, &keys.client_write).unwrap();
        let fragment = protection
            .seal(0, ContentType::ApplicationData.to_u8(), PROTOCOL_VERSION, &big)
            .unwrap();
        let mut record = vec![23, 3, 3];
        record.extend_from_slice(&(fragment.len() as u16).to_be_bytes());
        record.extend_from_slice(&fragment);

        assert!(matches!(
            server.open(&record),
            Err(Error::Record(RecordError::RecordOverflow))
        ));
    }

    #[test]
    fn tampered_header_length_is_malformed() {
        let mut layer = RecordLayer::new();
        let mut record = layer.seal(ContentType::Handshake, b"abcd").unwrap();
        record.pop();
        assert!(matches!(
            RecordLayer::new().open(&record),
            Err(Error::Record(RecordError::MalformedHeader))
        ));
    }
}
