//! Random sources used for hello randoms, ephemeral keys and premaster secrets.
//!
//! 用于 hello 随机数、临时密钥和预主密钥的随机源。

use std::sync::Mutex;

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// A cryptographically secure byte generator.
///
/// Implementations must be safe to share between connections: every call
/// returns independent output.
///
/// 密码学安全的字节生成器。实现必须可以在连接之间安全共享。
pub trait RandomSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<()>;
}

/// Operating-system entropy, read on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| Error::Random(e.to_string()))
    }
}

/// A seeded deterministic generator behind a lock.
///
/// The seed mixes operating-system entropy with a personalization string, so
/// two processes never share a stream even with the same personalization.
pub struct Drbg {
    rng: Mutex<StdRng>,
}

impl Drbg {
    pub fn seed(personalization: &[u8]) -> Result<Self> {
        let mut entropy = [0u8; 48];
        OsRandom.fill(&mut entropy)?;

        let mut hasher = Sha256::new();
        hasher.update(entropy);
        hasher.update(personalization);
        let seed: [u8; 32] = hasher.finalize().into();

        Ok(Self::from_seed(seed))
    }

    /// A reproducible stream, for tests.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_seed(seed)),
        }
    }
}

impl RandomSource for Drbg {
    fn fill(&self, buf: &mut [u8]) -> Result<()> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| Error::Random("generator lock poisoned".into()))?;
        rng.try_fill_bytes(buf)
            .map_err(|e| Error::Random(e.to_string()))
    }
}

impl std::fmt::Debug for Drbg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drbg").finish_non_exhaustive()
    }
}

/// Builds a local `StdRng` from a [`RandomSource`], for APIs that want an
/// `RngCore` (RSA encryption).
pub(crate) fn local_rng(source: &dyn RandomSource) -> Result<StdRng> {
    let mut seed = [0u8; 32];
    source.fill(&mut seed)?;
    Ok(StdRng::from_seed(seed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_drbg_is_reproducible() {
        let a = Drbg::from_seed([7; 32]);
        let b = Drbg::from_seed([7; 32]);
        let mut x = [0u8; 64];
        let mut y = [0u8; 64];
        a.fill(&mut x).unwrap();
        b.fill(&mut y).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn consecutive_fills_differ() {
        let drbg = Drbg::seed(b"tls-echo test").unwrap();
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        drbg.fill(&mut x).unwrap();
        drbg.fill(&mut y).unwrap();
        assert_ne!(x, y);

        OsRandom.fill(&mut x).unwrap();
        OsRandom.fill(&mut y).unwrap();
        assert_ne!(x, y);
    }
}
