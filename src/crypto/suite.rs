//! The ciphersuite registry.
//!
//! Every suite the engine can actually run is described here once, as an
//! immutable descriptor, and looked up by its IANA id. The table order is the
//! server's preference order.
//!
//! 密码套件注册表。
//!
//! 引擎能够运行的每个套件都在此处以不可变描述符的形式定义一次，
//! 并通过其 IANA 编号进行查找。表中的顺序即服务器的偏好顺序。

use std::fmt;

use crate::credential::CredentialKind;

/// How the premaster secret is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyExchangeKind {
    /// Premaster secret encrypted to the server's RSA key.
    Rsa,
    /// Ephemeral P-256 parameters signed with an RSA credential.
    EcdheRsa,
    /// Ephemeral P-256 parameters signed with an ECDSA credential.
    EcdheEcdsa,
}

impl KeyExchangeKind {
    /// The credential type the server must present for this key exchange.
    ///
    /// 该密钥交换方式要求服务器出示的凭据类型。
    pub const fn credential_kind(self) -> CredentialKind {
        match self {
            KeyExchangeKind::Rsa | KeyExchangeKind::EcdheRsa => CredentialKind::Rsa,
            KeyExchangeKind::EcdheEcdsa => CredentialKind::Ec,
        }
    }

    /// Whether the server sends signed ephemeral parameters.
    pub const fn is_ephemeral(self) -> bool {
        matches!(self, KeyExchangeKind::EcdheRsa | KeyExchangeKind::EcdheEcdsa)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherKind {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
    Null,
}

impl CipherKind {
    pub const fn key_len(self) -> usize {
        match self {
            CipherKind::Aes128Gcm => 16,
            CipherKind::Aes256Gcm | CipherKind::ChaCha20Poly1305 => 32,
            CipherKind::Null => 0,
        }
    }

    /// Length of the implicit IV taken from the key block.
    pub const fn fixed_iv_len(self) -> usize {
        match self {
            CipherKind::Aes128Gcm | CipherKind::Aes256Gcm => 4,
            CipherKind::ChaCha20Poly1305 => 12,
            CipherKind::Null => 0,
        }
    }

    /// Bytes of nonce carried in each protected record.
    pub const fn explicit_nonce_len(self) -> usize {
        match self {
            CipherKind::Aes128Gcm | CipherKind::Aes256Gcm => 8,
            CipherKind::ChaCha20Poly1305 | CipherKind::Null => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacKind {
    /// Integrity is provided by the AEAD tag.
    Aead,
    HmacSha256,
}

impl MacKind {
    pub const fn key_len(self) -> usize {
        match self {
            MacKind::Aead => 0,
            MacKind::HmacSha256 => 32,
        }
    }

    /// Bytes appended to each protected record for integrity.
    pub const fn tag_len(self) -> usize {
        match self {
            MacKind::Aead => 16,
            MacKind::HmacSha256 => 32,
        }
    }
}

/// Hash used by the PRF and the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    Sha256,
    Sha384,
}

impl HashKind {
    pub const fn output_len(self) -> usize {
        match self {
            HashKind::Sha256 => 32,
            HashKind::Sha384 => 48,
        }
    }
}

/// Bit set of advisory flags attached to a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SuiteFlags(u8);

impl SuiteFlags {
    pub const NONE: SuiteFlags = SuiteFlags(0);
    pub const WEAK: SuiteFlags = SuiteFlags(0x01);
    pub const SHORT_TAG: SuiteFlags = SuiteFlags(0x02);
    pub const NO_DATAGRAM: SuiteFlags = SuiteFlags(0x04);

    pub const fn from_bits(bits: u8) -> Self {
        SuiteFlags(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn union(self, other: SuiteFlags) -> Self {
        SuiteFlags(self.0 | other.0)
    }

    pub const fn contains(self, other: SuiteFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// The single label the lister prints. Only an exact single flag gets its
    /// own name; any combination or unknown bit reads `UNKNOWN`.
    pub const fn label(self) -> &'static str {
        match self.0 {
            0 => "NONE",
            0x01 => "WEAK",
            0x02 => "SHORT_TAG",
            0x04 => "NO_DTLS",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for SuiteFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Immutable description of one ciphersuite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ciphersuite {
    pub id: u16,
    pub name: &'static str,
    pub key_exchange: KeyExchangeKind,
    pub cipher: CipherKind,
    pub mac: MacKind,
    pub prf: HashKind,
    pub flags: SuiteFlags,
}

impl Ciphersuite {
    /// Total key block length: both MAC keys, both cipher keys, both IVs.
    pub const fn key_block_len(&self) -> usize {
        2 * (self.mac.key_len() + self.cipher.key_len() + self.cipher.fixed_iv_len())
    }

    /// Bytes a protected record adds on top of the plaintext.
    pub const fn record_overhead(&self) -> usize {
        self.cipher.explicit_nonce_len() + self.mac.tag_len()
    }
}

impl fmt::Display for Ciphersuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#06x})", self.name, self.id)
    }
}

const fn suite(
    id: u16,
    name: &'static str,
    key_exchange: KeyExchangeKind,
    cipher: CipherKind,
    mac: MacKind,
    prf: HashKind,
    flags: SuiteFlags,
) -> Ciphersuite {
    Ciphersuite {
        id,
        name,
        key_exchange,
        cipher,
        mac,
        prf,
        flags,
    }
}

use CipherKind::*;
use HashKind::*;
use KeyExchangeKind::*;

static REGISTRY: [Ciphersuite; 9] = [
    suite(0xC02C, "TLS-ECDHE-ECDSA-WITH-AES-256-GCM-SHA384", EcdheEcdsa, Aes256Gcm, MacKind::Aead, Sha384, SuiteFlags::NONE),
    suite(0xC030, "TLS-ECDHE-RSA-WITH-AES-256-GCM-SHA384", EcdheRsa, Aes256Gcm, MacKind::Aead, Sha384, SuiteFlags::NONE),
    suite(0xCCA9, "TLS-ECDHE-ECDSA-WITH-CHACHA20-POLY1305-SHA256", EcdheEcdsa, ChaCha20Poly1305, MacKind::Aead, Sha256, SuiteFlags::NONE),
    suite(0xCCA8, "TLS-ECDHE-RSA-WITH-CHACHA20-POLY1305-SHA256", EcdheRsa, ChaCha20Poly1305, MacKind::Aead, Sha256, SuiteFlags::NONE),
    suite(0xC02B, "TLS-ECDHE-ECDSA-WITH-AES-128-GCM-SHA256", EcdheEcdsa, Aes128Gcm, MacKind::Aead, Sha256, SuiteFlags::NONE),
    suite(0xC02F, "TLS-ECDHE-RSA-WITH-AES-128-GCM-SHA256", EcdheRsa, Aes128Gcm, MacKind::Aead, Sha256, SuiteFlags::NONE),
    suite(0x009D, "TLS-RSA-WITH-AES-256-GCM-SHA384", Rsa, Aes256Gcm, MacKind::Aead, Sha384, SuiteFlags::NONE),
    suite(0x009C, "TLS-RSA-WITH-AES-128-GCM-SHA256", Rsa, Aes128Gcm, MacKind::Aead, Sha256, SuiteFlags::NONE),
    suite(0x003B, "TLS-RSA-WITH-NULL-SHA256", Rsa, Null, MacKind::HmacSha256, Sha256, SuiteFlags::WEAK),
];

/// Looks up a registered suite by id.
pub fn lookup(id: u16) -> Option<&'static Ciphersuite> {
    REGISTRY.iter().find(|s| s.id == id)
}

/// Parses a suite id given in decimal or as `0x`-prefixed hex.
pub fn parse_id(raw: &str) -> Result<u16, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|e| format!("`{raw}` is not a ciphersuite id: {e}"))
}

/// All suites this build can negotiate, in preference order.
pub fn enabled() -> &'static [Ciphersuite] {
    &REGISTRY
}
