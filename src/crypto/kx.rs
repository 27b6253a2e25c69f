//! Ephemeral P-256 key agreement and RSA premaster transport.
//!
//! 临时 P-256 密钥协商与 RSA 预主密钥传输。

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use zeroize::Zeroizing;

use crate::crypto::random::RandomSource;
use crate::error::{Error, Result};

/// IANA named-curve id of secp256r1.
pub const NAMED_CURVE_P256: u16 = 23;
/// `ECParameters.curve_type` for a named curve.
pub const CURVE_TYPE_NAMED: u8 = 3;

pub const PREMASTER_LEN: usize = 48;
pub const PREMASTER_VERSION: [u8; 2] = [0x03, 0x03];

const MAX_KEYGEN_ATTEMPTS: usize = 8;

/// A helper struct to carry the ephemeral key agreement key pair during the
/// handshake.
///
/// 在握手期间携带临时密钥协商密钥对的辅助结构体。
pub struct KeyAgreementEngine {
    secret: SecretKey,
    public: Vec<u8>,
}

impl KeyAgreementEngine {
    /// Generates a fresh P-256 key pair from the given random source.
    ///
    /// 从给定随机源生成新的 P-256 密钥对。
    pub fn generate(random: &dyn RandomSource) -> Result<Self> {
        for _ in 0..MAX_KEYGEN_ATTEMPTS {
            let mut scalar = Zeroizing::new([0u8; 32]);
            random.fill(scalar.as_mut_slice())?;
            // Zero and values at or above the group order are rejected; draw again.
            if let Ok(secret) = SecretKey::from_slice(scalar.as_slice()) {
                let public = secret
                    .public_key()
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec();
                return Ok(Self { secret, public });
            }
        }
        Err(Error::Random("could not draw a valid P-256 scalar".into()))
    }

    /// Uncompressed SEC1 encoding of the public point.
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Computes the shared secret with the peer's SEC1-encoded point.
    ///
    /// An encoding that is not a valid curve point fails with
    /// [`Error::HandshakeVerificationFailed`].
    ///
    /// 与对方 SEC1 编码的公钥点计算共享密钥。
    pub fn agree(&self, peer_public: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let peer = PublicKey::from_sec1_bytes(peer_public)
            .map_err(|_| Error::HandshakeVerificationFailed("invalid peer key share"))?;
        let shared = p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.as_affine());
        Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
    }
}

impl std::fmt::Debug for KeyAgreementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyAgreementEngine")
            .field("public", &self.public.len())
            .finish_non_exhaustive()
    }
}

/// Draws a fresh RSA premaster secret: the protocol version followed by 46
/// random bytes.
pub fn rsa_premaster(random: &dyn RandomSource) -> Result<Zeroizing<Vec<u8>>> {
    let mut premaster = Zeroizing::new(vec![0u8; PREMASTER_LEN]);
    random.fill(&mut premaster[2..])?;
    premaster[..2].copy_from_slice(&PREMASTER_VERSION);
    Ok(premaster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::random::Drbg;

    #[test]
    fn both_sides_agree() {
        let rng = Drbg::from_seed([3; 32]);
        let a = KeyAgreementEngine::generate(&rng).unwrap();
        let b = KeyAgreementEngine::generate(&rng).unwrap();
        assert_eq!(a.public_key().len(), 65);
        assert_eq!(a.public_key()[0], 0x04);

        let ab = a.agree(b.public_key()).unwrap();
        let ba = b.agree(a.public_key()).unwrap();
        assert_eq!(*ab, *ba);
    }

    #[test]
    fn invalid_point_is_a_verification_failure() {
        let rng = Drbg::from_seed([4; 32]);
        let a = KeyAgreementEngine::generate(&rng).unwrap();
        let mut bogus = a.public_key().to_vec();
        bogus[64] ^= 0xFF;
        assert!(matches!(
            a.agree(&bogus),
            Err(Error::HandshakeVerificationFailed(_))
        ));
        assert!(a.agree(&[]).is_err());
    }

    #[test]
    fn premaster_carries_version() {
        let rng = Drbg::from_seed([5; 32]);
        let pm = rsa_premaster(&rng).unwrap();
        assert_eq!(pm.len(), PREMASTER_LEN);
        assert_eq!(&pm[..2], &PREMASTER_VERSION);
    }
}
