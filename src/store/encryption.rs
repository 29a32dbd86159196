//! AES-256-GCM sealing for individual secret values.
//!
//! Every value is sealed with its own random nonce. The master key is 32
//! bytes and travels base64-encoded in config and on disk.

use std::fmt;
use std::fs;
use std::path::Path;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::error::ConnectError;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// 256-bit master key for the secret store.
#[derive(Clone)]
pub struct MasterKey([u8; KEY_SIZE]);

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Decode a base64 key, rejecting anything that is not exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, ConnectError> {
        let decoded = BASE64.decode(encoded.trim()).map_err(|e| {
            ConnectError::Configuration(format!("master key is not valid base64: {e}"))
        })?;
        let bytes: [u8; KEY_SIZE] = decoded.as_slice().try_into().map_err(|_| {
            ConnectError::Configuration(format!(
                "master key must be {KEY_SIZE} bytes, got {}",
                decoded.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(key.as_slice());
        Self(bytes)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Read the key file at `path`, creating it with a fresh key when absent.
    pub fn load_or_create(path: &Path) -> Result<Self, ConnectError> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_base64(&raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let key = Self::generate();
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, key.to_base64())?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
                }
                tracing::debug!(path = %path.display(), "generated secret store master key");
                Ok(key)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn cipher(&self) -> Result<Aes256Gcm, ConnectError> {
        Aes256Gcm::new_from_slice(&self.0)
            .map_err(|e| ConnectError::Storage(format!("failed to create cipher: {e}")))
    }
}

/// A sealed value as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sealed {
    pub ciphertext: String,
    pub nonce: String,
}

pub fn seal(plaintext: &str, key: &MasterKey) -> Result<Sealed, ConnectError> {
    let cipher = key.cipher()?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| ConnectError::Storage(format!("encryption failed: {e}")))?;
    Ok(Sealed {
        ciphertext: BASE64.encode(ciphertext),
        nonce: BASE64.encode(nonce),
    })
}

/// Decrypt a sealed value; fails on a wrong key or tampered data.
pub fn open(sealed: &Sealed, key: &MasterKey) -> Result<String, ConnectError> {
    let ciphertext = BASE64
        .decode(&sealed.ciphertext)
        .map_err(|e| ConnectError::Storage(format!("ciphertext is not valid base64: {e}")))?;
    let nonce = BASE64
        .decode(&sealed.nonce)
        .map_err(|e| ConnectError::Storage(format!("nonce is not valid base64: {e}")))?;
    if nonce.len() != NONCE_SIZE {
        return Err(ConnectError::Storage(format!(
            "invalid nonce size: expected {NONCE_SIZE}, got {}",
            nonce.len()
        )));
    }
    let plaintext = key
        .cipher()?
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|_| ConnectError::Storage("decryption failed (wrong key or corrupted data)".into()))?;
    String::from_utf8(plaintext)
        .map_err(|_| ConnectError::Storage("decrypted value is not valid UTF-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn master_key_rejects_wrong_length() {
        assert!(MasterKey::from_base64(&BASE64.encode([0u8; 32])).is_ok());
        assert!(MasterKey::from_base64(&BASE64.encode([0u8; 16])).is_err());
        assert!(MasterKey::from_base64("not-valid-base64!@#$").is_err());
    }

    #[test]
    fn sealing_twice_uses_fresh_nonces() {
        let key = MasterKey::from_bytes([7u8; 32]);
        let first = seal("secret", &key).unwrap();
        let second = seal("secret", &key).unwrap();
        assert_ne!(first.nonce, second.nonce);
        assert_eq!(open(&first, &key).unwrap(), "secret");
        assert_eq!(open(&second, &key).unwrap(), "secret");
    }

    #[test]
    fn wrong_key_and_tampering_are_detected() {
        let key = MasterKey::from_bytes([1u8; 32]);
        let other = MasterKey::from_bytes([2u8; 32]);
        let sealed = seal("secret", &key).unwrap();
        assert!(open(&sealed, &other).is_err());

        let mut tampered = sealed.clone();
        tampered.ciphertext = BASE64.encode(b"garbage-ciphertext-bytes");
        assert!(open(&tampered, &key).is_err());
    }

    #[test]
    fn load_or_create_persists_the_generated_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("master.key");
        let created = MasterKey::load_or_create(&path).unwrap();
        let reloaded = MasterKey::load_or_create(&path).unwrap();
        assert_eq!(created.to_base64(), reloaded.to_base64());
    }
}
