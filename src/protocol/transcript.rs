//! Manages the hashing of the handshake transcript.
//!
//! This struct centralizes the logic for updating and finalizing the transcript hash,
//! ensuring consistency between the client and server. The suite's PRF hash is
//! only known after ServerHello, so both candidate hashes run from the start.
//!
//! 管理握手记录的哈希计算。
//!
//! 此结构体集中了更新和最终确定握手记录哈希的逻辑，
//! 确保了客户端和服务器之间的一致性。由于套件的 PRF 哈希在 ServerHello 之后才确定，
//! 两种候选哈希从一开始就同时计算。
use sha2::{Digest, Sha256, Sha384};

use crate::crypto::suite::HashKind;
use crate::error::Result;
use crate::protocol::message::HandshakeMessage;

#[derive(Debug, Clone)]
pub struct Transcript {
    sha256: Sha256,
    sha384: Sha384,
}

impl Transcript {
    /// Creates a new, empty transcript.
    pub fn new() -> Self {
        Self {
            sha256: Sha256::new(),
            sha384: Sha384::new(),
        }
    }

    /// Updates the transcript with a handshake message.
    ///
    /// The message is hashed in its framed wire form, header included.
    ///
    /// 使用握手消息更新握手记录。消息以带头部的线上格式参与哈希。
    pub fn update(&mut self, message: &HandshakeMessage) -> Result<()> {
        let bytes = message.encode()?;
        self.sha256.update(&bytes);
        self.sha384.update(&bytes);
        Ok(())
    }

    /// Returns the current hash state for operations like key derivation,
    /// without consuming the transcript.
    ///
    /// 返回当前的哈希状态用于密钥派生等操作，而不会消耗握手记录。
    pub fn current_hash(&self, hash: HashKind) -> Vec<u8> {
        match hash {
            HashKind::Sha256 => self.sha256.clone().finalize().to_vec(),
            HashKind::Sha384 => self.sha384.clone().finalize().to_vec(),
        }
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::Finished;

    #[test]
    fn order_matters_and_snapshots_do_not_consume() {
        let a = HandshakeMessage::ServerHelloDone;
        let b = HandshakeMessage::Finished(Finished {
            verify_data: vec![0; 12],
        });

        let mut ab = Transcript::new();
        ab.update(&a).unwrap();
        let mid = ab.current_hash(HashKind::Sha256);
        assert_eq!(mid, ab.current_hash(HashKind::Sha256));
        ab.update(&b).unwrap();

        let mut ba = Transcript::new();
        ba.update(&b).unwrap();
        ba.update(&a).unwrap();

        assert_ne!(ab.current_hash(HashKind::Sha256), ba.current_hash(HashKind::Sha256));
        assert_ne!(mid, ab.current_hash(HashKind::Sha256));
        assert_eq!(ab.current_hash(HashKind::Sha384).len(), 48);
    }
}
