//! Server credentials: certificate chains, private keys and their selection.
//!
//! A [`Credential`] is loaded once at startup and shared read-only between
//! connections behind an `Arc`. The [`CredentialStore`] maps the key-exchange
//! kind of the negotiated suite onto the credential it needs.
//!
//! 服务器凭据：证书链、私钥以及按密钥交换方式进行的选择。

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use p256::pkcs8::{DecodePrivateKey as _, DecodePublicKey as _};
use rsa::pkcs1::DecodeRsaPrivateKey as _;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use rustls_pemfile::Item;
use tracing::debug;
use x509_parser::prelude::{FromDer, X509Certificate};
use zeroize::Zeroizing;

use crate::config::CredentialConfig;
use crate::crypto::random::{RandomSource, local_rng};
use crate::crypto::signature;
use crate::crypto::suite::KeyExchangeKind;
use crate::error::{Error, ParseError, Result};

const BUILTIN_RSA_CERT: &[u8] = include_bytes!("../certs/srv-rsa.der");
const BUILTIN_RSA_KEY: &[u8] = include_bytes!("../certs/srv-rsa.key.der");
const BUILTIN_EC_CERT: &[u8] = include_bytes!("../certs/srv-ec.der");
const BUILTIN_EC_KEY: &[u8] = include_bytes!("../certs/srv-ec.key.der");
const BUILTIN_CA_CERT: &[u8] = include_bytes!("../certs/ca.der");

/// The public-key family of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    Rsa,
    Ec,
}

/// A server private key.
pub enum PrivateKey {
    Rsa(Box<RsaPrivateKey>),
    Ec(p256::SecretKey),
}

impl PrivateKey {
    pub fn kind(&self) -> CredentialKind {
        match self {
            PrivateKey::Rsa(_) => CredentialKind::Rsa,
            PrivateKey::Ec(_) => CredentialKind::Ec,
        }
    }

    /// Parses a PKCS#8 DER private key holding an RSA or P-256 key.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        if let Ok(key) = RsaPrivateKey::from_pkcs8_der(der) {
            return Ok(PrivateKey::Rsa(Box::new(key)));
        }
        p256::SecretKey::from_pkcs8_der(der)
            .map(PrivateKey::Ec)
            .map_err(|_| ParseError::PrivateKey.into())
    }

    fn public_key(&self) -> PeerPublicKey {
        match self {
            PrivateKey::Rsa(key) => PeerPublicKey::Rsa(RsaPublicKey::from(&**key)),
            PrivateKey::Ec(key) => PeerPublicKey::Ec(key.public_key()),
        }
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey::{:?}(..)", self.kind())
    }
}

/// A certificate chain (leaf first) together with the leaf's private key.
///
/// 证书链（叶证书在前）及叶证书对应的私钥。
#[derive(Debug)]
pub struct Credential {
    chain: Vec<Vec<u8>>,
    key: PrivateKey,
}

impl Credential {
    /// Builds a credential from DER certificates and a PKCS#8 DER key.
    ///
    /// Every certificate must parse, and the key must match the leaf.
    ///
    /// 从 DER 证书和 PKCS#8 DER 私钥构建凭据。每个证书都必须可解析，且私钥必须与叶证书匹配。
    pub fn load(chain_der: Vec<Vec<u8>>, key_der: &[u8]) -> Result<Self> {
        let key = PrivateKey::from_pkcs8_der(key_der)?;
        Self::from_parts(chain_der, key)
    }

    /// Builds a credential from PEM text, as written by common tooling.
    pub fn load_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let chain = rustls_pemfile::certs(&mut &cert_pem[..])
            .map(|c| c.map(|c| c.to_vec()))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| ParseError::Pem(e.to_string()))?;

        let mut key = None;
        for item in rustls_pemfile::read_all(&mut &key_pem[..]) {
            let item = item.map_err(|e| ParseError::Pem(e.to_string()))?;
            let parsed = match item {
                Item::Pkcs8Key(der) => PrivateKey::from_pkcs8_der(der.secret_pkcs8_der())?,
                Item::Pkcs1Key(der) => RsaPrivateKey::from_pkcs1_der(der.secret_pkcs1_der())
                    .map(|k| PrivateKey::Rsa(Box::new(k)))
                    .map_err(|_| ParseError::PrivateKey)?,
                Item::Sec1Key(der) => p256::SecretKey::from_sec1_der(der.secret_sec1_der())
                    .map(PrivateKey::Ec)
                    .map_err(|_| ParseError::PrivateKey)?,
                _ => continue,
            };
            key = Some(parsed);
            break;
        }
        let key = key.ok_or_else(|| ParseError::Pem("no private key found".into()))?;
        Self::from_parts(chain, key)
    }

    /// Reads a PEM certificate chain and PEM key from disk.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert_pem = fs::read(cert_path).map_err(Error::Transport)?;
        let key_pem = Zeroizing::new(fs::read(key_path).map_err(Error::Transport)?);
        debug!(cert = %cert_path.display(), key = %key_path.display(), "loading credential");
        Self::load_pem(&cert_pem, &key_pem)
    }

    fn from_parts(chain: Vec<Vec<u8>>, key: PrivateKey) -> Result<Self> {
        let leaf = chain.first().ok_or(ParseError::EmptyChain)?;
        for (index, der) in chain.iter().enumerate() {
            X509Certificate::from_der(der).map_err(|e| ParseError::Certificate {
                index,
                reason: e.to_string(),
            })?;
        }
        let leaf_key = PeerPublicKey::from_certificate(leaf)?;
        if leaf_key != key.public_key() {
            return Err(ParseError::KeyMismatch.into());
        }
        Ok(Self { chain, key })
    }

    pub fn kind(&self) -> CredentialKind {
        self.key.kind()
    }

    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    pub fn leaf(&self) -> &[u8] {
        // The chain is checked non-empty on construction.
        self.chain.first().map(Vec::as_slice).unwrap_or_default()
    }

    /// Signs `message` with the credential key (PKCS#1 v1.5 or ECDSA, SHA-256).
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        signature::sign(&self.key, message)
    }

    /// Recovers an RSA-transported premaster secret.
    ///
    /// Returns `None` on any failure; the caller must not reveal which one.
    ///
    /// 恢复通过 RSA 传输的预主密钥。任何失败都返回 `None`。
    pub fn decrypt_premaster(&self, ciphertext: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
        match &self.key {
            PrivateKey::Rsa(key) => key.decrypt(Pkcs1v15Encrypt, ciphertext).ok().map(Zeroizing::new),
            PrivateKey::Ec(_) => None,
        }
    }
}

/// A public key taken from a peer's leaf certificate.
///
/// 从对端叶证书中提取的公钥。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerPublicKey {
    Rsa(RsaPublicKey),
    Ec(p256::PublicKey),
}

impl PeerPublicKey {
    /// Extracts the subject public key of a DER certificate.
    pub fn from_certificate(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| ParseError::Certificate {
            index: 0,
            reason: e.to_string(),
        })?;
        let spki = cert.public_key().raw;
        if let Ok(key) = RsaPublicKey::from_public_key_der(spki) {
            return Ok(PeerPublicKey::Rsa(key));
        }
        if let Ok(key) = p256::PublicKey::from_public_key_der(spki) {
            return Ok(PeerPublicKey::Ec(key));
        }
        Err(ParseError::UnsupportedKeyAlgorithm.into())
    }

    pub fn kind(&self) -> CredentialKind {
        match self {
            PeerPublicKey::Rsa(_) => CredentialKind::Rsa,
            PeerPublicKey::Ec(_) => CredentialKind::Ec,
        }
    }

    pub fn verify(&self, message: &[u8], sig: &[u8]) -> Result<()> {
        signature::verify(self, message, sig)
    }

    /// Encrypts a premaster secret to this RSA key with PKCS#1 v1.5 padding.
    pub fn encrypt_premaster(&self, premaster: &[u8], random: &dyn RandomSource) -> Result<Vec<u8>> {
        match self {
            PeerPublicKey::Rsa(key) => {
                let mut rng = local_rng(random)?;
                key.encrypt(&mut rng, Pkcs1v15Encrypt, premaster)
                    .map_err(|_| Error::HandshakeVerificationFailed("premaster encryption failed"))
            }
            PeerPublicKey::Ec(_) => Err(Error::HandshakeVerificationFailed(
                "server certificate cannot transport a premaster secret",
            )),
        }
    }
}

/// Read-only set of credentials, one per [`CredentialKind`].
///
/// 只读凭据集合，每种 [`CredentialKind`] 一个。
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    by_kind: HashMap<CredentialKind, Arc<Credential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a credential, replacing any previous one of the same kind.
    pub fn insert(&mut self, credential: Credential) -> &mut Self {
        self.by_kind.insert(credential.kind(), Arc::new(credential));
        self
    }

    /// The credential the given key exchange requires.
    pub fn select(&self, key_exchange: KeyExchangeKind) -> Result<Arc<Credential>> {
        self.by_kind
            .get(&key_exchange.credential_kind())
            .cloned()
            .ok_or(Error::MissingCredential(key_exchange))
    }

    pub fn contains(&self, kind: CredentialKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    /// The compiled-in test RSA and P-256 credentials.
    pub fn builtin() -> Result<Self> {
        let mut store = Self::new();
        store
            .insert(Credential::load(
                vec![BUILTIN_RSA_CERT.to_vec(), BUILTIN_CA_CERT.to_vec()],
                BUILTIN_RSA_KEY,
            )?)
            .insert(Credential::load(
                vec![BUILTIN_EC_CERT.to_vec(), BUILTIN_CA_CERT.to_vec()],
                BUILTIN_EC_KEY,
            )?);
        Ok(store)
    }

    /// Loads the configured PEM pairs; kinds left unconfigured fall back to the
    /// built-in credentials.
    pub fn from_config(config: &CredentialConfig) -> Result<Self> {
        let mut store = Self::builtin()?;
        if let (Some(cert), Some(key)) = (&config.rsa_cert, &config.rsa_key) {
            store.insert(expect_kind(Credential::from_pem_files(cert, key)?, CredentialKind::Rsa)?);
        }
        if let (Some(cert), Some(key)) = (&config.ec_cert, &config.ec_key) {
            store.insert(expect_kind(Credential::from_pem_files(cert, key)?, CredentialKind::Ec)?);
        }
        Ok(store)
    }
}

fn expect_kind(credential: Credential, kind: CredentialKind) -> Result<Credential> {
    if credential.kind() == kind {
        Ok(credential)
    } else {
        Err(ParseError::UnsupportedKeyAlgorithm.into())
    }
}

/// DER of the test CA that signed the built-in leaves.
pub fn builtin_ca() -> &'static [u8] {
    BUILTIN_CA_CERT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::random::Drbg;

    const RSA_CERT_PEM: &[u8] = include_bytes!("../certs/srv-rsa.pem");
    const RSA_KEY_PEM: &[u8] = include_bytes!("../certs/srv-rsa.key.pem");
    const EC_CERT_PEM: &[u8] = include_bytes!("../certs/srv-ec.pem");
    const EC_KEY_PEM: &[u8] = include_bytes!("../certs/srv-ec.key.pem");

    #[test]
    fn builtin_store_selects_by_key_exchange() {
        let store = CredentialStore::builtin().unwrap();
        assert_eq!(store.select(KeyExchangeKind::Rsa).unwrap().kind(), CredentialKind::Rsa);
        assert_eq!(store.select(KeyExchangeKind::EcdheRsa).unwrap().kind(), CredentialKind::Rsa);
        assert_eq!(store.select(KeyExchangeKind::EcdheEcdsa).unwrap().kind(), CredentialKind::Ec);
        assert_eq!(store.select(KeyExchangeKind::Rsa).unwrap().chain().len(), 2);
    }

    #[test]
    fn missing_kind_is_reported() {
        let mut store = CredentialStore::new();
        store.insert(Credential::load(vec![BUILTIN_EC_CERT.to_vec()], BUILTIN_EC_KEY).unwrap());
        assert!(matches!(
            store.select(KeyExchangeKind::EcdheRsa),
            Err(Error::MissingCredential(KeyExchangeKind::EcdheRsa))
        ));
    }

    #[test]
    fn pem_and_der_agree() {
        let rsa = Credential::load_pem(RSA_CERT_PEM, RSA_KEY_PEM).unwrap();
        assert_eq!(rsa.leaf(), BUILTIN_RSA_CERT);
        let ec = Credential::load_pem(EC_CERT_PEM, EC_KEY_PEM).unwrap();
        assert_eq!(ec.kind(), CredentialKind::Ec);
    }

    #[test]
    fn mismatched_key_is_rejected() {
        let err = Credential::load(vec![BUILTIN_RSA_CERT.to_vec()], BUILTIN_EC_KEY).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::KeyMismatch)));
    }

    #[test]
    fn malformed_material_is_a_parse_error() {
        assert!(matches!(
            Credential::load(vec![], BUILTIN_RSA_KEY),
            Err(Error::Parse(ParseError::EmptyChain))
        ));
        assert!(matches!(
            Credential::load(vec![vec![0x30, 0x03, 0x01]], BUILTIN_RSA_KEY),
            Err(Error::Parse(ParseError::Certificate { index: 0, .. }))
        ));
        assert!(matches!(
            Credential::load(vec![BUILTIN_RSA_CERT.to_vec()], b"not a key"),
            Err(Error::Parse(ParseError::PrivateKey))
        ));
        assert!(matches!(
            Credential::load_pem(RSA_CERT_PEM, b""),
            Err(Error::Parse(ParseError::Pem(_)))
        ));
    }

    #[test]
    fn signatures_verify_against_the_leaf() {
        let store = CredentialStore::builtin().unwrap();
        for kx in [KeyExchangeKind::EcdheRsa, KeyExchangeKind::EcdheEcdsa] {
            let credential = store.select(kx).unwrap();
            let peer = PeerPublicKey::from_certificate(credential.leaf()).unwrap();
            let sig = credential.sign(b"params").unwrap();
            peer.verify(b"params", &sig).unwrap();
            assert!(peer.verify(b"other", &sig).is_err());
        }
    }

    #[test]
    fn premaster_transport_round_trips() {
        let store = CredentialStore::builtin().unwrap();
        let credential = store.select(KeyExchangeKind::Rsa).unwrap();
        let peer = PeerPublicKey::from_certificate(credential.leaf()).unwrap();
        let rng = Drbg::from_seed([9; 32]);
        let ct = peer.encrypt_premaster(&[3, 3, 1, 2, 3], &rng).unwrap();
        let pm = credential.decrypt_premaster(&ct).unwrap();
        assert_eq!(&pm[..], &[3, 3, 1, 2, 3]);
        assert!(credential.decrypt_premaster(&ct[1..]).is_none());
    }
}
