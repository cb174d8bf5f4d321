//! Symmetric signing key for access tokens
//!
//! The key is decoded once at startup and handed to the token codec by value.
//! There is no global key and no rotation; replacing the key invalidates every
//! outstanding access token.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::RngCore;
use thiserror::Error;

/// HS256 needs at least 256 bits of key material
pub const MIN_KEY_BYTES: usize = 32;

/// Signing key errors
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Signing key is not valid base64: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("Signing key must be at least {MIN_KEY_BYTES} bytes, got {len}")]
    TooShort { len: usize },
}

/// Immutable HMAC key material
#[derive(Clone)]
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    /// Decode a base64 (standard alphabet) secret
    pub fn from_base64(secret: &str) -> Result<Self, KeyError> {
        let bytes = STANDARD.decode(secret.trim())?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() < MIN_KEY_BYTES {
            return Err(KeyError::TooShort { len: bytes.len() });
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        })
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Generate a fresh random secret of `len` bytes, base64 encoded
pub fn generate_secret(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}
