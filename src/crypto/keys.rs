//! Manages the derivation of session keys from the premaster secret.
//!
//! This module centralizes the key schedule used by both the client and the
//! server once the key exchange is complete: the PRF, the master secret bound
//! to the handshake transcript, the key block and the Finished verify data.
//!
//! 管理从预主密钥派生会话密钥的过程。
//!
//! 该模块集中了客户端和服务器在密钥交换完成后使用的密钥派生逻辑：
//! PRF、绑定握手记录的主密钥、密钥块以及 Finished 校验数据。

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::crypto::suite::{Ciphersuite, HashKind};
use crate::error::{Error, Result};

pub const MASTER_SECRET_LEN: usize = 48;
pub const VERIFY_DATA_LEN: usize = 12;

const LABEL_MASTER: &[u8] = b"extended master secret";
const LABEL_KEY_EXPANSION: &[u8] = b"key expansion";
pub const LABEL_CLIENT_FINISHED: &[u8] = b"client finished";
pub const LABEL_SERVER_FINISHED: &[u8] = b"server finished";

/// Which end of the connection a set of keys is viewed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// The 48-byte master secret. Wiped on drop.
pub struct MasterSecret(Zeroizing<[u8; MASTER_SECRET_LEN]>);

impl MasterSecret {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterSecret(..)")
    }
}

/// Keying material for one direction of the record layer.
#[derive(Clone)]
pub struct DirectionKeys {
    pub mac_key: Zeroizing<Vec<u8>>,
    pub key: Zeroizing<Vec<u8>>,
    pub iv: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for DirectionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectionKeys")
            .field("mac_key_len", &self.mac_key.len())
            .field("key_len", &self.key.len())
            .field("iv_len", &self.iv.len())
            .finish()
    }
}

/// Both directions' keys for an established session.
///
/// 已建立会话的双向密钥。
#[derive(Debug, Clone)]
pub struct SessionKeys {
    pub client_write: DirectionKeys,
    pub server_write: DirectionKeys,
}

impl SessionKeys {
    /// Returns `(write, read)` keys for the given role.
    ///
    /// 根据角色返回 `(写, 读)` 密钥。
    pub fn for_role(&self, role: Role) -> (&DirectionKeys, &DirectionKeys) {
        match role {
            Role::Client => (&self.client_write, &self.server_write),
            Role::Server => (&self.server_write, &self.client_write),
        }
    }
}

/// TLS 1.2 PRF: `P_hash(secret, label || seed)` truncated to `out.len()`.
pub fn prf(hash: HashKind, secret: &[u8], label: &[u8], seed: &[u8], out: &mut [u8]) -> Result<()> {
    match hash {
        HashKind::Sha256 => p_hash::<Hmac<Sha256>>(secret, label, seed, out),
        HashKind::Sha384 => p_hash::<Hmac<Sha384>>(secret, label, seed, out),
    }
}

fn p_hash<M: Mac + hmac::digest::KeyInit + Clone>(
    secret: &[u8],
    label: &[u8],
    seed: &[u8],
    out: &mut [u8],
) -> Result<()> {
    let keyed = <M as hmac::digest::KeyInit>::new_from_slice(secret)
        .map_err(|_| Error::InvalidState)?;

    // A(1) = HMAC(secret, label || seed)
    let mut a = {
        let mut mac = keyed.clone();
        mac.update(label);
        mac.update(seed);
        mac.finalize().into_bytes()
    };

    let mut written = 0;
    while written < out.len() {
        let mut mac = keyed.clone();
        mac.update(&a);
        mac.update(label);
        mac.update(seed);
        let block = mac.finalize().into_bytes();

        let take = (out.len() - written).min(block.len());
        out[written..written + take].copy_from_slice(&block[..take]);
        written += take;

        let mut next = keyed.clone();
        next.update(&a);
        a = next.finalize().into_bytes();
    }
    Ok(())
}

/// Derives the master secret from the premaster secret and the transcript
/// hash through `ClientKeyExchange`.
///
/// Binding the hash in means both sides agree on the secret only when they
/// saw the same hello, certificate and key-exchange messages.
///
/// 从预主密钥和截至 `ClientKeyExchange` 的握手记录哈希派生主密钥。
pub fn derive_master_secret(
    suite: &Ciphersuite,
    premaster: &[u8],
    session_hash: &[u8],
) -> Result<MasterSecret> {
    let mut master = Zeroizing::new([0u8; MASTER_SECRET_LEN]);
    prf(suite.prf, premaster, LABEL_MASTER, session_hash, &mut master[..])?;
    Ok(MasterSecret(master))
}

/// Expands the master secret into both directions' record keys.
pub fn derive_session_keys(
    suite: &Ciphersuite,
    master: &MasterSecret,
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Result<SessionKeys> {
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(server_random);
    seed[32..].copy_from_slice(client_random);

    let mut block = Zeroizing::new(vec![0u8; suite.key_block_len()]);
    prf(suite.prf, master.as_bytes(), LABEL_KEY_EXPANSION, &seed, &mut block)?;

    let mac_len = suite.mac.key_len();
    let key_len = suite.cipher.key_len();
    let iv_len = suite.cipher.fixed_iv_len();

    // [client_mac | server_mac | client_key | server_key | client_iv | server_iv]
    let mut rest: &[u8] = &block;
    let mut take = |n: usize| {
        let (head, tail) = rest.split_at(n);
        rest = tail;
        Zeroizing::new(head.to_vec())
    };
    let client_mac = take(mac_len);
    let server_mac = take(mac_len);
    let client_key = take(key_len);
    let server_key = take(key_len);
    let client_iv = take(iv_len);
    let server_iv = take(iv_len);

    Ok(SessionKeys {
        client_write: DirectionKeys {
            mac_key: client_mac,
            key: client_key,
            iv: client_iv,
        },
        server_write: DirectionKeys {
            mac_key: server_mac,
            key: server_key,
            iv: server_iv,
        },
    })
}

/// Computes the Finished verify data over a transcript hash.
pub fn verify_data(
    suite: &Ciphersuite,
    master: &MasterSecret,
    label: &[u8],
    transcript_hash: &[u8],
) -> Result<[u8; VERIFY_DATA_LEN]> {
    let mut out = [0u8; VERIFY_DATA_LEN];
    prf(suite.prf, master.as_bytes(), label, transcript_hash, &mut out)?;
    Ok(out)
}

/// Constant-time check of received verify data against the expected value.
pub fn verify_data_matches(expected: &[u8; VERIFY_DATA_LEN], received: &[u8]) -> bool {
    received.len() == VERIFY_DATA_LEN && bool::from(expected[..].ct_eq(received))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::suite::lookup;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    // Published TLS 1.2 PRF-SHA256 test vector.
    #[test]
    fn prf_sha256_vector() {
        let secret = hex("9bbe436ba940f017b17652849a71db35");
        let seed = hex("a0ba9f936cda311827a6f796ffd5198c");
        let mut out = [0u8; 100];
        prf(HashKind::Sha256, &secret, b"test label", &seed, &mut out).unwrap();
        assert_eq!(
            &out[..16],
            hex("e3f229ba727be17b8d122620557cd453").as_slice()
        );
    }

    #[test]
    fn prf_output_is_prefix_stable() {
        let mut short = [0u8; 20];
        let mut long = [0u8; 80];
        prf(HashKind::Sha384, b"secret", b"label", b"seed", &mut short).unwrap();
        prf(HashKind::Sha384, b"secret", b"label", b"seed", &mut long).unwrap();
        assert_eq!(short, long[..20]);
    }

    #[test]
    fn key_block_is_partitioned_per_suite() {
        let suite = lookup(0xC02F).unwrap();
        let master = derive_master_secret(suite, &[1u8; 32], &[2u8; 32]).unwrap();
        let keys = derive_session_keys(suite, &master, &[3; 32], &[4; 32]).unwrap();
        assert_eq!(keys.client_write.key.len(), 16);
        assert_eq!(keys.client_write.iv.len(), 4);
        assert!(keys.client_write.mac_key.is_empty());
        assert_ne!(keys.client_write.key, keys.server_write.key);

        let (write, read) = keys.for_role(Role::Server);
        assert_eq!(write.key, keys.server_write.key);
        assert_eq!(read.key, keys.client_write.key);
    }

    #[test]
    fn transcript_hash_changes_master_secret() {
        let suite = lookup(0xC02B).unwrap();
        let a = derive_master_secret(suite, &[9; 32], &[0; 32]).unwrap();
        let b = derive_master_secret(suite, &[9; 32], &[1; 32]).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn verify_data_comparison() {
        let suite = lookup(0xC02B).unwrap();
        let master = derive_master_secret(suite, &[5; 32], &[6; 32]).unwrap();
        let expected = verify_data(suite, &master, LABEL_CLIENT_FINISHED, &[7; 32]).unwrap();
        assert!(verify_data_matches(&expected, &expected));

        let mut tampered = expected;
        tampered[0] ^= 1;
        assert!(!verify_data_matches(&expected, &tampered));
        assert!(!verify_data_matches(&expected, &expected[..11]));
    }
}
