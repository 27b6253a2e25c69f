//! Record protection for one direction of a connection.
//!
//! AEAD suites build the nonce from the fixed IV and the record sequence
//! number; the AES-GCM construction additionally carries the 8-byte explicit
//! part in front of the ciphertext. The NULL suite appends an HMAC-SHA256 tag.
//!
//! ```text
//! aad   = seq_num(8) || type(1) || version(2) || plaintext_len(2)
//! gcm   = fixed_iv(4) || seq_num(8)
//! chacha = iv(12) XOR (0^4 || seq_num(8))
//! ```
//!
//! 单个方向的记录保护。

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::keys::DirectionKeys;
use crate::crypto::suite::{CipherKind, Ciphersuite};
use crate::error::{Error, RecordError, Result};

pub const AAD_LEN: usize = 13;
const NONCE_LEN: usize = 12;

enum Engine {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
    ChaCha(Box<ChaCha20Poly1305>),
    Null { mac_key: Zeroizing<Vec<u8>> },
}

/// Seals and opens record fragments for a single key set.
///
/// The caller owns the sequence counter; this type only turns
/// `(seq, type, plaintext)` into a protected fragment and back.
///
/// 为单组密钥封装和解封记录片段。序列号由调用方维护。
pub struct RecordProtection {
    suite: &'static Ciphersuite,
    engine: Engine,
    iv: Zeroizing<Vec<u8>>,
}

impl RecordProtection {
    pub fn new(suite: &'static Ciphersuite, keys: &DirectionKeys) -> Result<Self> {
        let bad_key = |_| Error::InvalidState;
        let engine = match suite.cipher {
            CipherKind::Aes128Gcm => {
                Engine::Aes128(Box::new(Aes128Gcm::new_from_slice(&keys.key).map_err(bad_key)?))
            }
            CipherKind::Aes256Gcm => {
                Engine::Aes256(Box::new(Aes256Gcm::new_from_slice(&keys.key).map_err(bad_key)?))
            }
            CipherKind::ChaCha20Poly1305 => Engine::ChaCha(Box::new(
                ChaCha20Poly1305::new_from_slice(&keys.key).map_err(bad_key)?,
            )),
            CipherKind::Null => Engine::Null {
                mac_key: keys.mac_key.clone(),
            },
        };
        if keys.iv.len() != suite.cipher.fixed_iv_len() {
            return Err(Error::InvalidState);
        }
        Ok(Self {
            suite,
            engine,
            iv: keys.iv.clone(),
        })
    }

    pub fn suite(&self) -> &'static Ciphersuite {
        self.suite
    }

    /// Protects `plaintext` as record number `seq` of type `content_type`.
    pub fn seal(&self, seq: u64, content_type: u8, version: u16, plaintext: &[u8]) -> Result<Vec<u8>> {
        let aad = additional_data(seq, content_type, version, plaintext.len());
        let payload = Payload {
            msg: plaintext,
            aad: &aad,
        };
        let sealed = |r: std::result::Result<Vec<u8>, aes_gcm::aead::Error>| {
            r.map_err(|_| Error::InvalidState)
        };

        match &self.engine {
            Engine::Aes128(c) => {
                let nonce = self.gcm_nonce(seq);
                let ct = sealed(c.encrypt(aes_gcm::Nonce::from_slice(&nonce), payload))?;
                Ok(with_explicit_nonce(seq, ct))
            }
            Engine::Aes256(c) => {
                let nonce = self.gcm_nonce(seq);
                let ct = sealed(c.encrypt(aes_gcm::Nonce::from_slice(&nonce), payload))?;
                Ok(with_explicit_nonce(seq, ct))
            }
            Engine::ChaCha(c) => {
                let nonce = self.xor_nonce(seq);
                sealed(c.encrypt(chacha20poly1305::Nonce::from_slice(&nonce), payload))
            }
            Engine::Null { mac_key } => {
                let mut mac = record_mac(mac_key)?;
                mac.update(&aad);
                mac.update(plaintext);
                let mut out = Vec::with_capacity(plaintext.len() + 32);
                out.extend_from_slice(plaintext);
                out.extend_from_slice(&mac.finalize().into_bytes());
                Ok(out)
            }
        }
    }

    /// Removes protection from a fragment received as record number `seq`.
    ///
    /// Every failure, including a fragment too short to hold a tag, reports
    /// the same [`RecordError::AuthenticationFailed`].
    ///
    /// 解除记录保护。所有失败都报告为同一个 `AuthenticationFailed`。
    pub fn open(&self, seq: u64, content_type: u8, version: u16, fragment: &[u8]) -> Result<Vec<u8>> {
        let auth_failed = || Error::Record(RecordError::AuthenticationFailed);
        let overhead = self.suite.record_overhead();
        if fragment.len() < overhead {
            return Err(auth_failed());
        }
        let plaintext_len = fragment.len() - overhead;
        let aad = additional_data(seq, content_type, version, plaintext_len);

        match &self.engine {
            Engine::Aes128(_) | Engine::Aes256(_) => {
                let (explicit, ciphertext) = fragment.split_at(8);
                let mut nonce = [0u8; NONCE_LEN];
                nonce[..4].copy_from_slice(&self.iv);
                nonce[4..].copy_from_slice(explicit);
                let payload = Payload {
                    msg: ciphertext,
                    aad: &aad,
                };
                let opened = match &self.engine {
                    Engine::Aes128(c) => c.decrypt(aes_gcm::Nonce::from_slice(&nonce), payload),
                    Engine::Aes256(c) => c.decrypt(aes_gcm::Nonce::from_slice(&nonce), payload),
                    _ => return Err(auth_failed()),
                };
                opened.map_err(|_| auth_failed())
            }
            Engine::ChaCha(c) => {
                let nonce = self.xor_nonce(seq);
                c.decrypt(
                    chacha20poly1305::Nonce::from_slice(&nonce),
                    Payload {
                        msg: fragment,
                        aad: &aad,
                    },
                )
                .map_err(|_| auth_failed())
            }
            Engine::Null { mac_key } => {
                let (plaintext, tag) = fragment.split_at(plaintext_len);
                let mut mac = record_mac(mac_key)?;
                mac.update(&aad);
                mac.update(plaintext);
                // verify_slice compares in constant time.
                mac.verify_slice(tag).map_err(|_| auth_failed())?;
                Ok(plaintext.to_vec())
            }
        }
    }

    fn gcm_nonce(&self, seq: u64) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..4].copy_from_slice(&self.iv);
        nonce[4..].copy_from_slice(&seq.to_be_bytes());
        nonce
    }

    fn xor_nonce(&self, seq: u64) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&self.iv);
        for (n, s) in nonce[4..].iter_mut().zip(seq.to_be_bytes()) {
            *n ^= s;
        }
        nonce
    }
}

impl std::fmt::Debug for RecordProtection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordProtection")
            .field("suite", &self.suite.name)
            .finish_non_exhaustive()
    }
}

fn additional_data(seq: u64, content_type: u8, version: u16, len: usize) -> [u8; AAD_LEN] {
    let mut aad = [0u8; AAD_LEN];
    aad[..8].copy_from_slice(&seq.to_be_bytes());
    aad[8] = content_type;
    aad[9..11].copy_from_slice(&version.to_be_bytes());
    aad[11..].copy_from_slice(&(len as u16).to_be_bytes());
    aad
}

fn with_explicit_nonce(seq: u64, ciphertext: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + ciphertext.len());
    out.extend_from_slice(&seq.to_be_bytes());
    out.extend_from_slice(&ciphertext);
    out
}

fn record_mac(key: &[u8]) -> Result<Hmac<Sha256>> {
    <Hmac<Sha256> as Mac>::new_from_slice(key).map_err(|_| Error::InvalidState)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::{Role, derive_master_secret, derive_session_keys};
    use crate::crypto::suite::{enabled, lookup};

    const VERSION: u16 = 0x0303;

    fn pair(id: u16) -> (RecordProtection, RecordProtection) {
        let suite = lookup(id).unwrap();
        let master = derive_master_secret(suite, &[0x42; 48], &[0x17; 32]).unwrap();
        let keys = derive_session_keys(suite, &master, &[1; 32], &[2; 32]).unwrap();
        let (client_write, _) = keys.for_role(Role::Client);
        let (_, server_read) = keys.for_role(Role::Server);
        (
            RecordProtection::new(suite, client_write).unwrap(),
            RecordProtection::new(suite, server_read).unwrap(),
        )
    }

    #[test]
    fn every_suite_opens_what_it_seals() {
        for suite in enabled() {
            let (sealer, opener) = pair(suite.id);
            for (seq, msg) in [(0u64, &b""[..]), (1, &b"GET / HTTP/1.0\r\n\r\n"[..]), (7, &[0xAB; 300][..])] {
                let fragment = sealer.seal(seq, 23, VERSION, msg).unwrap();
                assert_eq!(fragment.len(), msg.len() + suite.record_overhead());
                let opened = opener.open(seq, 23, VERSION, &fragment).unwrap();
                assert_eq!(opened, msg, "suite {}", suite.name);
            }
        }
    }

    #[test]
    fn tampering_is_an_authentication_failure() {
        for id in [0xC02F, 0xCCA8, 0x003B] {
            let (sealer, opener) = pair(id);
            let mut fragment = sealer.seal(3, 23, VERSION, b"hello").unwrap();
            let last = fragment.len() - 1;
            fragment[last] ^= 0x80;
            let err = opener.open(3, 23, VERSION, &fragment).unwrap_err();
            assert!(matches!(err, Error::Record(RecordError::AuthenticationFailed)));
        }
    }

    #[test]
    fn sequence_and_type_are_authenticated() {
        let (sealer, opener) = pair(0xC02B);
        let fragment = sealer.seal(5, 23, VERSION, b"data").unwrap();
        assert!(opener.open(6, 23, VERSION, &fragment).is_err());
        assert!(opener.open(5, 22, VERSION, &fragment).is_err());
        assert!(opener.open(5, 23, VERSION, &fragment).is_ok());
    }

    #[test]
    fn short_fragment_is_rejected() {
        let (_, opener) = pair(0xC030);
        let err = opener.open(0, 23, VERSION, &[0u8; 10]).unwrap_err();
        assert!(matches!(err, Error::Record(RecordError::AuthenticationFailed)));
    }
}
