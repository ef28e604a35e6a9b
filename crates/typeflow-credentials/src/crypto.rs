//! Authenticated encryption for credential configs.
//!
//! AES-256-GCM with a random 96-bit nonce prefixed to the ciphertext. The
//! key is 32 bytes, hex-encoded in the environment.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use crate::error::CredentialError;

const NONCE_LEN: usize = 12;

/// Wraps the AES-256-GCM cipher for credential configs.
#[derive(Clone)]
pub struct CredentialCipher {
  cipher: Aes256Gcm,
}

impl CredentialCipher {
  /// Build a cipher from a 32-byte hex-encoded key.
  pub fn from_hex_key(hex_key: &str) -> Result<Self, CredentialError> {
    let bytes = hex::decode(hex_key.trim())
      .map_err(|e| CredentialError::InvalidKey(format!("not hex: {}", e)))?;
    if bytes.len() != 32 {
      return Err(CredentialError::InvalidKey(format!(
        "expected 32 bytes, got {}",
        bytes.len()
      )));
    }
    let key = Key::<Aes256Gcm>::from_slice(&bytes);
    Ok(Self {
      cipher: Aes256Gcm::new(key),
    })
  }

  /// Encrypt, returning `nonce || ciphertext`.
  pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CredentialError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = self
      .cipher
      .encrypt(&nonce, plaintext)
      .map_err(|e| CredentialError::Crypto(e.to_string()))?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
  }

  /// Decrypt a `nonce || ciphertext` blob.
  pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CredentialError> {
    if data.len() < NONCE_LEN {
      return Err(CredentialError::Crypto("ciphertext too short".to_string()));
    }
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);
    self
      .cipher
      .decrypt(Nonce::from_slice(nonce), ciphertext)
      .map_err(|e| CredentialError::Crypto(e.to_string()))
  }
}
