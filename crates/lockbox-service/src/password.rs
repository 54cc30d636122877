//! Compact password encryption for arbitrary JSON content, exported to
//! callers as a single hex string.
//!
//! Unlike the vault envelope, the cost parameters are not embedded: both
//! sides must use the same [`KdfParams`].

use serde_json::Value;
use zeroize::Zeroizing;

use lockbox_core::error::EncryptorError;

use crate::cipher::{self, KdfParams};

/// The in-memory user password. Zeroized on drop and never printed.
#[derive(Clone)]
pub struct Password(Zeroizing<String>);

impl Password {
    pub fn new(password: &str) -> Self {
        Self(Zeroizing::new(password.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

/// Encrypt `data` under `password`, returning hex of `salt || nonce || ct`.
pub fn password_encrypt(
    data: &Value,
    password: &str,
    params: &KdfParams,
) -> Result<String, EncryptorError> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(data).map_err(|e| EncryptorError::Serialization(e.to_string()))?,
    );
    Ok(hex::encode(cipher::encrypt(&plaintext, password.as_bytes(), params)?))
}

/// Decrypt a string produced by [`password_encrypt`].
pub fn password_decrypt(
    encrypted: &str,
    password: &str,
    params: &KdfParams,
) -> Result<Value, EncryptorError> {
    let bytes = hex::decode(encrypted.trim())
        .map_err(|e| EncryptorError::CorruptedPayload(e.to_string()))?;
    let plaintext = Zeroizing::new(cipher::decrypt(&bytes, password.as_bytes(), params)?);
    serde_json::from_slice(&plaintext).map_err(|e| EncryptorError::CorruptedPayload(e.to_string()))
}
