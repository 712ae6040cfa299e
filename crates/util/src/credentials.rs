//! Sealed server credentials.
//!
//! Server passwords are stored sealed with ChaCha20-Poly1305. The stored form is
//! `base64(nonce || ciphertext)`. Key material is supplied by the operator through
//! [`ENCRYPTION_KEY_ENV`]; this module never generates or rotates keys.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use thiserror::Error;
use tracing::debug;

/// Environment variable holding the base64-encoded 32-byte key.
pub const ENCRYPTION_KEY_ENV: &str = "ENCRYPTION_KEY";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Capability to unseal stored credentials.
///
/// The execution pipeline only ever needs `decrypt`; sealing is exposed on the concrete
/// cipher for tooling that provisions inventory records.
pub trait CredentialCipher: Send + Sync {
    fn decrypt(&self, sealed: &str) -> Result<String, DecryptionError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecryptionError {
    #[error("encryption key is missing: set ENCRYPTION_KEY")]
    MissingKey,

    #[error("encryption key is invalid: {reason}")]
    InvalidKey { reason: String },

    #[error("sealed credential is malformed: {reason}")]
    Malformed { reason: String },

    #[error("credential could not be authenticated with the configured key")]
    Authentication,
}

impl DecryptionError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed { reason: reason.into() }
    }
}

/// ChaCha20-Poly1305 implementation of [`CredentialCipher`].
pub struct SealedCredentialCipher {
    cipher: ChaCha20Poly1305,
}

impl SealedCredentialCipher {
    /// Build a cipher from a base64-encoded 32-byte key.
    pub fn from_base64_key(encoded: &str) -> Result<Self, DecryptionError> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|error| DecryptionError::InvalidKey { reason: error.to_string() })?;
        if key.len() != KEY_LEN {
            return Err(DecryptionError::InvalidKey {
                reason: format!("expected {KEY_LEN} bytes, got {}", key.len()),
            });
        }
        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    /// Build a cipher from [`ENCRYPTION_KEY_ENV`].
    pub fn from_env() -> Result<Self, DecryptionError> {
        match std::env::var(ENCRYPTION_KEY_ENV) {
            Ok(value) if !value.trim().is_empty() => Self::from_base64_key(&value),
            _ => Err(DecryptionError::MissingKey),
        }
    }

    /// Seal a plaintext credential with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, DecryptionError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| DecryptionError::Authentication)?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }
}

impl CredentialCipher for SealedCredentialCipher {
    fn decrypt(&self, sealed: &str) -> Result<String, DecryptionError> {
        let bytes = STANDARD
            .decode(sealed.trim())
            .map_err(|error| DecryptionError::malformed(error.to_string()))?;
        if bytes.len() <= NONCE_LEN {
            return Err(DecryptionError::malformed("payload shorter than nonce"));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| DecryptionError::Authentication)?;
        debug!("Unsealed stored credential");
        String::from_utf8(plaintext).map_err(|_| DecryptionError::malformed("credential is not valid UTF-8"))
    }
}
