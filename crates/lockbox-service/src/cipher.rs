//! AES-256-GCM encryption under an Argon2id password-derived key.
//!
//! # Wire format
//! ```text
//! salt (32 bytes) || nonce (12 bytes) || ciphertext + auth_tag
//! ```
//!
//! A failed authentication tag is reported as
//! [`EncryptorError::InvalidPassword`]; input too short to hold the header
//! is [`EncryptorError::CorruptedPayload`].

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use lockbox_core::error::EncryptorError;

/// Salt length in bytes.
pub const SALT_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// Minimum encrypted payload size (salt + nonce + auth tag).
const MIN_ENCRYPTED_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// Argon2id cost parameters.
///
/// | Parameter | Default | Meaning |
/// |-----------|---------|---------|
/// | `m_cost`  | 65 536  | Memory usage in KiB (64 MiB) |
/// | `t_cost`  | 3       | Number of passes |
/// | `p_cost`  | 1       | Degree of parallelism |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    #[serde(rename = "m")]
    pub m_cost: u32,
    #[serde(rename = "t")]
    pub t_cost: u32,
    #[serde(rename = "p")]
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 65_536,
            t_cost: 3,
            p_cost: 1,
        }
    }
}

/// 256-bit AES key, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; 32]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Derive an AES-256 key from a password and salt with Argon2id.
pub fn derive_key(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<DerivedKey, EncryptorError> {
    let argon_params = argon2::Params::new(params.m_cost, params.t_cost, params.p_cost, Some(32))
        .map_err(|e| EncryptorError::KeyDerivation(format!("invalid Argon2 parameters: {e}")))?;
    let argon = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, argon_params);
    let mut out = [0u8; 32];
    argon
        .hash_password_into(password, salt, &mut out)
        .map_err(|e| EncryptorError::KeyDerivation(e.to_string()))?;
    Ok(DerivedKey(out))
}

/// Encrypt with an explicit salt and nonce, returning the bare ciphertext.
pub fn seal(
    plaintext: &[u8],
    password: &[u8],
    salt: &[u8],
    nonce: &[u8; NONCE_LEN],
    params: &KdfParams,
) -> Result<Vec<u8>, EncryptorError> {
    let key = derive_key(password, salt, params)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| EncryptorError::Encryption(e.to_string()))?;
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| EncryptorError::Encryption(e.to_string()))
}

/// Decrypt a bare ciphertext produced by [`seal`].
pub fn open(
    ciphertext: &[u8],
    password: &[u8],
    salt: &[u8],
    nonce: &[u8; NONCE_LEN],
    params: &KdfParams,
) -> Result<Vec<u8>, EncryptorError> {
    if ciphertext.len() < TAG_LEN {
        return Err(EncryptorError::CorruptedPayload(format!(
            "ciphertext too short: {} < {TAG_LEN}",
            ciphertext.len()
        )));
    }
    let key = derive_key(password, salt, params)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| EncryptorError::Encryption(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| EncryptorError::InvalidPassword)
}

/// Fresh random salt and nonce from the OS RNG.
pub fn random_salt_and_nonce() -> ([u8; SALT_LEN], [u8; NONCE_LEN]) {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    (salt, nonce)
}

/// Encrypt plaintext with a password.
///
/// Returns `salt || nonce || ciphertext+tag`.
pub fn encrypt(plaintext: &[u8], password: &[u8], params: &KdfParams) -> Result<Vec<u8>, EncryptorError> {
    let (salt, nonce) = random_salt_and_nonce();
    let ciphertext = seal(plaintext, password, &salt, &nonce, params)?;
    let mut result = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    result.extend_from_slice(&salt);
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt data produced by [`encrypt`].
pub fn decrypt(encrypted: &[u8], password: &[u8], params: &KdfParams) -> Result<Vec<u8>, EncryptorError> {
    if encrypted.len() < MIN_ENCRYPTED_LEN {
        return Err(EncryptorError::CorruptedPayload(format!(
            "encrypted data too short: {} < {MIN_ENCRYPTED_LEN}",
            encrypted.len()
        )));
    }
    let salt = &encrypted[..SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&encrypted[SALT_LEN..SALT_LEN + NONCE_LEN]);
    open(&encrypted[SALT_LEN + NONCE_LEN..], password, salt, &nonce, params)
}

#[cfg(test)]
pub(crate) fn test_params() -> KdfParams {
    KdfParams {
        m_cost: 256,
        t_cost: 1,
        p_cost: 1,
    }
}
