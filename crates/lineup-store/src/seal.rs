//! Descriptor sealing — AES-256-GCM encryption of vectors at rest.
//!
//! Vector blobs are sealed with a per-row random nonce under a key kept
//! outside the database; a database file alone yields no usable
//! biometric credentials.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum SealError {
    #[error("key file error: {0}")]
    KeyFile(String),
    #[error("seal failed: {0}")]
    SealFailed(String),
    #[error("descriptor blob failed to open (wrong key or tampered)")]
    OpenFailed,
}

/// 256-bit sealing key.
#[derive(Clone)]
pub struct SealKey {
    key: [u8; KEY_LEN],
}

impl SealKey {
    /// Derive a key from arbitrary key material via SHA-256.
    pub fn from_material(material: &[u8]) -> Self {
        let digest = Sha256::digest(material);
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Load the key from `path`, generating and persisting a fresh
    /// random key on first use.
    ///
    /// A file of exactly [`KEY_LEN`] bytes is used raw; anything else is
    /// treated as key material and digested.
    pub fn load_or_generate(path: &Path) -> Result<Self, SealError> {
        if path.exists() {
            let bytes = std::fs::read(path)
                .map_err(|e| SealError::KeyFile(format!("{}: {e}", path.display())))?;
            if bytes.len() == KEY_LEN {
                let mut key = [0u8; KEY_LEN];
                key.copy_from_slice(&bytes);
                return Ok(Self { key });
            }
            return Ok(Self::from_material(&bytes));
        }

        let mut key = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SealError::KeyFile(format!("{}: {e}", parent.display())))?;
        }
        std::fs::write(path, key)
            .map_err(|e| SealError::KeyFile(format!("{}: {e}", path.display())))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
        }

        tracing::info!(path = %path.display(), "sealing key generated");
        Ok(Self { key })
    }

    /// Seal a plaintext blob. Returns `(nonce, ciphertext)`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), SealError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));

        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| SealError::SealFailed(e.to_string()))?;
        Ok((nonce.to_vec(), ciphertext))
    }

    /// Open a sealed blob. Authentication failure means a wrong key or a
    /// tampered row.
    pub fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, SealError> {
        if nonce.len() != NONCE_LEN {
            return Err(SealError::OpenFailed);
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SealError::OpenFailed)
    }
}

/// Encode an f32 vector as little-endian bytes.
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode little-endian bytes back into an f32 vector. `None` if the
/// length is not a whole number of floats.
pub fn vector_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = SealKey::from_material(b"unit-test-material");
        let (nonce, sealed) = key.seal(b"descriptor bytes").unwrap();
        assert_ne!(sealed.as_slice(), b"descriptor bytes".as_slice());
        assert_eq!(key.open(&nonce, &sealed).unwrap(), b"descriptor bytes");
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let key = SealKey::from_material(b"key-one");
        let other = SealKey::from_material(b"key-two");
        let (nonce, sealed) = key.seal(b"secret").unwrap();
        assert!(matches!(other.open(&nonce, &sealed), Err(SealError::OpenFailed)));
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let key = SealKey::from_material(b"key");
        let (nonce, mut sealed) = key.seal(b"secret").unwrap();
        sealed[0] ^= 0xFF;
        assert!(matches!(key.open(&nonce, &sealed), Err(SealError::OpenFailed)));
    }

    #[test]
    fn nonces_are_unique_per_seal() {
        let key = SealKey::from_material(b"key");
        let (n1, _) = key.seal(b"x").unwrap();
        let (n2, _) = key.seal(b"x").unwrap();
        assert_ne!(n1, n2);
    }

    #[test]
    fn vector_codec_roundtrip() {
        let vector = vec![0.25f32, -1.5, 3.75, f32::MIN_POSITIVE];
        let bytes = vector_to_bytes(&vector);
        assert_eq!(bytes.len(), 16);
        assert_eq!(vector_from_bytes(&bytes).unwrap(), vector);
    }

    #[test]
    fn vector_codec_rejects_ragged_lengths() {
        assert!(vector_from_bytes(&[1, 2, 3]).is_none());
    }

    #[test]
    fn load_or_generate_is_stable() {
        let dir = std::env::temp_dir().join(format!("lineup-seal-{}", std::process::id()));
        let path = dir.join("seal.key");
        let _ = std::fs::remove_file(&path);

        let first = SealKey::load_or_generate(&path).unwrap();
        let second = SealKey::load_or_generate(&path).unwrap();

        let (nonce, sealed) = first.seal(b"persisted").unwrap();
        assert_eq!(second.open(&nonce, &sealed).unwrap(), b"persisted");

        let _ = std::fs::remove_file(&path);
    }
}
