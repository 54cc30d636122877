//! Default [`Encryptor`]: JSON values sealed into a self-describing envelope.
//!
//! ```json
//! { "v": 1, "kdf": { "m": 65536, "t": 3, "p": 1 },
//!   "salt": "<hex>", "iv": "<hex>", "data": "<hex ciphertext+tag>" }
//! ```
//!
//! The KDF parameters travel with each payload, so raising the cost for new
//! writes never locks out an existing vault.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use lockbox_core::error::EncryptorError;
use lockbox_core::traits::Encryptor;

use crate::cipher::{self, KdfParams, NONCE_LEN, SALT_LEN};

/// Envelope format version.
const ENVELOPE_VERSION: u8 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: u8,
    kdf: KdfParams,
    salt: String,
    iv: String,
    data: String,
}

/// Password encryptor using Argon2id + AES-256-GCM.
#[derive(Debug, Clone, Default)]
pub struct PasswordEncryptor {
    params: KdfParams,
}

impl PasswordEncryptor {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, EncryptorError> {
    hex::decode(value).map_err(|e| EncryptorError::CorruptedPayload(format!("{field}: {e}")))
}

impl Encryptor for PasswordEncryptor {
    fn encrypt(&self, password: &str, value: &Value) -> Result<String, EncryptorError> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(value).map_err(|e| EncryptorError::Serialization(e.to_string()))?,
        );
        let (salt, nonce) = cipher::random_salt_and_nonce();
        let data = cipher::seal(&plaintext, password.as_bytes(), &salt, &nonce, &self.params)?;
        let envelope = Envelope {
            v: ENVELOPE_VERSION,
            kdf: self.params,
            salt: hex::encode(salt),
            iv: hex::encode(nonce),
            data: hex::encode(data),
        };
        serde_json::to_string(&envelope).map_err(|e| EncryptorError::Serialization(e.to_string()))
    }

    fn decrypt(&self, password: &str, payload: &str) -> Result<Value, EncryptorError> {
        let envelope: Envelope = serde_json::from_str(payload)
            .map_err(|e| EncryptorError::CorruptedPayload(e.to_string()))?;
        if envelope.v != ENVELOPE_VERSION {
            return Err(EncryptorError::CorruptedPayload(format!(
                "unsupported envelope version {}",
                envelope.v
            )));
        }
        let salt = decode_hex("salt", &envelope.salt)?;
        if salt.len() != SALT_LEN {
            return Err(EncryptorError::CorruptedPayload(format!(
                "salt must be {SALT_LEN} bytes, got {}",
                salt.len()
            )));
        }
        let nonce: [u8; NONCE_LEN] = decode_hex("iv", &envelope.iv)?
            .try_into()
            .map_err(|_| EncryptorError::CorruptedPayload(format!("iv must be {NONCE_LEN} bytes")))?;
        let data = decode_hex("data", &envelope.data)?;

        let plaintext = Zeroizing::new(cipher::open(
            &data,
            password.as_bytes(),
            &salt,
            &nonce,
            &envelope.kdf,
        )?);
        serde_json::from_slice(&plaintext).map_err(|e| EncryptorError::CorruptedPayload(e.to_string()))
    }
}
