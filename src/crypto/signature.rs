//! Manages the creation and verification of digital signatures within the handshake.
//!
//! This module centralizes the logic for signing and verifying the server's
//! ephemeral key-exchange parameters, ensuring that the signed payload is laid
//! out identically on both client and server sides.
//!
//! 管理握手过程中的数字签名的创建和验证。
//!
//! 该模块集中了对服务器临时密钥交换参数进行签名和验证的逻辑，
//! 确保了客户端和服务器端签名数据格式的一致性。

use p256::ecdsa::{DerSignature, SigningKey as EcdsaSigningKey, VerifyingKey as EcdsaVerifyingKey};
use rsa::pkcs1v15::{Signature as RsaSignature, SigningKey as RsaSigningKey, VerifyingKey as RsaVerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use sha2::Sha256;

use crate::credential::{Credential, PeerPublicKey, PrivateKey};
use crate::crypto::kx::{CURVE_TYPE_NAMED, NAMED_CURVE_P256};
use crate::error::{Error, Result};

const BAD_SIGNATURE: &str = "server key exchange signature does not verify";

/// Prepares the data payload for signing or verification.
///
/// ```text
/// client_random || server_random || curve_type(1) || named_curve(2) || len(1) || public
/// ```
fn prepare_params_payload(client_random: &[u8; 32], server_random: &[u8; 32], public: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + 4 + public.len());
    out.extend_from_slice(client_random);
    out.extend_from_slice(server_random);
    out.push(CURVE_TYPE_NAMED);
    out.extend_from_slice(&NAMED_CURVE_P256.to_be_bytes());
    out.push(public.len() as u8);
    out.extend_from_slice(public);
    out
}

/// Signs `message` with a private key: RSASSA-PKCS1-v1_5 for RSA keys, DER
/// ECDSA for P-256 keys, SHA-256 in both cases.
pub fn sign(key: &PrivateKey, message: &[u8]) -> Result<Vec<u8>> {
    match key {
        PrivateKey::Rsa(key) => {
            let signer = RsaSigningKey::<Sha256>::new((**key).clone());
            let signature = signer
                .try_sign(message)
                .map_err(|_| Error::HandshakeVerificationFailed("rsa signing failed"))?;
            Ok(signature.to_vec())
        }
        PrivateKey::Ec(key) => {
            let signer = EcdsaSigningKey::from(key);
            let signature: DerSignature = signer
                .try_sign(message)
                .map_err(|_| Error::HandshakeVerificationFailed("ecdsa signing failed"))?;
            Ok(signature.as_bytes().to_vec())
        }
    }
}

/// Verifies a signature made by [`sign`] against the matching public key.
pub fn verify(key: &PeerPublicKey, message: &[u8], signature: &[u8]) -> Result<()> {
    let rejected = |_| Error::HandshakeVerificationFailed(BAD_SIGNATURE);
    match key {
        PeerPublicKey::Rsa(key) => {
            let verifier = RsaVerifyingKey::<Sha256>::new(key.clone());
            let signature = RsaSignature::try_from(signature).map_err(rejected)?;
            verifier.verify(message, &signature).map_err(rejected)
        }
        PeerPublicKey::Ec(key) => {
            let verifier = EcdsaVerifyingKey::from(key);
            let signature = DerSignature::try_from(signature).map_err(rejected)?;
            verifier.verify(message, &signature).map_err(rejected)
        }
    }
}

/// Signs the server's ephemeral parameters.
///
/// This is called by the server to prove its identity.
///
/// 对服务器的临时参数签名，用于证明服务器身份。
pub fn sign_ephemeral_params(
    credential: &Credential,
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    public: &[u8],
) -> Result<Vec<u8>> {
    let payload = prepare_params_payload(client_random, server_random, public);
    credential.sign(&payload)
}

/// Verifies the signature on the server's ephemeral parameters.
///
/// This is called by the client to authenticate the server.
///
/// 验证服务器临时参数上的签名，由客户端调用以认证服务器。
pub fn verify_ephemeral_params(
    identity: &PeerPublicKey,
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    public: &[u8],
    signature: &[u8],
) -> Result<()> {
    let payload = prepare_params_payload(client_random, server_random, public);
    identity.verify(&payload, signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialStore;
    use crate::crypto::suite::KeyExchangeKind;

    #[test]
    fn payload_layout() {
        let payload = prepare_params_payload(&[1; 32], &[2; 32], &[4, 5, 6]);
        assert_eq!(payload.len(), 64 + 4 + 3);
        assert_eq!(&payload[64..68], &[3, 0, 23, 3]);
    }

    #[test]
    fn params_signature_binds_both_randoms() {
        let store = CredentialStore::builtin().unwrap();
        for kx in [KeyExchangeKind::EcdheRsa, KeyExchangeKind::EcdheEcdsa] {
            let credential = store.select(kx).unwrap();
            let identity = PeerPublicKey::from_certificate(credential.leaf()).unwrap();
            let public = [0x04; 65];
            let sig = sign_ephemeral_params(&credential, &[1; 32], &[2; 32], &public).unwrap();

            verify_ephemeral_params(&identity, &[1; 32], &[2; 32], &public, &sig).unwrap();
            let err = verify_ephemeral_params(&identity, &[1; 32], &[3; 32], &public, &sig).unwrap_err();
            assert!(matches!(err, Error::HandshakeVerificationFailed(_)));
        }
    }

    #[test]
    fn garbage_signature_is_rejected() {
        let store = CredentialStore::builtin().unwrap();
        let credential = store.select(KeyExchangeKind::EcdheEcdsa).unwrap();
        let identity = PeerPublicKey::from_certificate(credential.leaf()).unwrap();
        assert!(verify(&identity, b"msg", &[0u8; 3]).is_err());
    }
}
