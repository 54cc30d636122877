//! Ed25519 keypairs, address derivation, and signing payloads.
//!
//! An account address is the last 20 bytes of the BLAKE3 hash of the
//! 32-byte public key, hex-encoded with a `0x` prefix.
//!
//! # Signing payloads
//!
//! Each signing method signs a distinct byte string so a signature produced
//! for one purpose can never be replayed as another:
//! - messages: raw bytes (hex-decoded when `0x`-prefixed)
//! - personal messages: `"\x19Ethereum Signed Message:\n" || len || bytes`
//! - typed data: `"typed:" || version || ":" || canonical JSON`
//! - transactions: `"tx:" || canonical JSON`
//! - EIP-7702: `0x05 || chain_id (BE) || contract address || nonce (BE)`

use ed25519_dalek::{Signer, Verifier};
use serde_json::Value;
use std::fmt;

use lockbox_core::address::{normalize_address, strip_hex_prefix};
use lockbox_core::constants::ADDRESS_LEN;
use lockbox_core::error::KeyringError;
use lockbox_core::types::Eip7702Authorization;

/// Personal message prefix, kept byte-compatible with wallets in the field.
const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// EIP-7702 authorization magic byte.
const EIP7702_MAGIC: u8 = 0x05;

/// Ed25519 keypair owned by a secret-bearing keyring.
///
/// Wraps [`ed25519_dalek::SigningKey`], which zeroizes the secret on drop.
pub struct KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Generate a random keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Create a keypair from 32-byte secret key material.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&bytes),
        }
    }

    /// Parse a hex private key, with or without `0x`.
    pub fn from_hex(secret: &str) -> Result<Self, KeyringError> {
        let body = strip_hex_prefix(secret.trim());
        let bytes = hex::decode(body).map_err(|e| KeyringError::InvalidKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            KeyringError::InvalidKey(format!("expected 32 bytes, got {}", v.len()))
        })?;
        Ok(Self::from_secret_bytes(bytes))
    }

    /// Secret key as lowercase hex without prefix. Handle with care.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Raw public key bytes.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Normalized account address of this keypair.
    pub fn address(&self) -> String {
        address_from_public_key(&self.public_key_bytes())
    }

    /// Sign a message, returning the `0x`-prefixed hex signature.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        format!("0x{}", hex::encode(self.signing_key.sign(message).to_bytes()))
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        Self::from_secret_bytes(self.signing_key.to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Derive the account address for a public key.
pub fn address_from_public_key(public_key: &[u8; 32]) -> String {
    let digest = blake3::hash(public_key);
    let bytes = digest.as_bytes();
    format!("0x{}", hex::encode(&bytes[32 - ADDRESS_LEN..]))
}

/// Verify a `0x` hex signature against a public key.
pub fn verify_signature(public_key: &[u8; 32], message: &[u8], signature: &str) -> bool {
    let Ok(vk) = ed25519_dalek::VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let Ok(raw) = hex::decode(strip_hex_prefix(signature)) else {
        return false;
    };
    let Ok(raw): Result<[u8; 64], _> = raw.try_into() else {
        return false;
    };
    vk.verify(message, &ed25519_dalek::Signature::from_bytes(&raw))
        .is_ok()
}

/// Bytes of a raw message: hex-decoded if `0x`-prefixed hex, else UTF-8.
pub fn message_bytes(data: &str) -> Vec<u8> {
    if let Some(body) = data.strip_prefix("0x") {
        if let Ok(bytes) = hex::decode(body) {
            return bytes;
        }
    }
    data.as_bytes().to_vec()
}

/// Personal-message payload with length prefix.
pub fn personal_message_bytes(data: &str) -> Vec<u8> {
    let body = message_bytes(data);
    let mut out = Vec::with_capacity(PERSONAL_MESSAGE_PREFIX.len() + 20 + body.len());
    out.extend_from_slice(PERSONAL_MESSAGE_PREFIX.as_bytes());
    out.extend_from_slice(body.len().to_string().as_bytes());
    out.extend_from_slice(&body);
    out
}

/// Typed-data payload bound to the requested version (`opts.version`,
/// default `V1`).
pub fn typed_data_bytes(data: &Value, opts: &Value) -> Result<Vec<u8>, KeyringError> {
    let version = opts
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("V1");
    let json = serde_json::to_vec(data).map_err(|e| KeyringError::Signing(e.to_string()))?;
    let mut out = format!("typed:{version}:").into_bytes();
    out.extend_from_slice(&json);
    Ok(out)
}

/// Transaction payload.
pub fn transaction_bytes(tx: &Value) -> Result<Vec<u8>, KeyringError> {
    let json = serde_json::to_vec(tx).map_err(|e| KeyringError::Signing(e.to_string()))?;
    let mut out = b"tx:".to_vec();
    out.extend_from_slice(&json);
    Ok(out)
}

/// EIP-7702 authorization payload.
pub fn eip7702_bytes(auth: &Eip7702Authorization) -> Result<Vec<u8>, KeyringError> {
    let contract = hex::decode(strip_hex_prefix(&auth.contract_address))
        .map_err(|_| KeyringError::InvalidAddress(auth.contract_address.clone()))?;
    let mut out = Vec::with_capacity(1 + 8 + contract.len() + 8);
    out.push(EIP7702_MAGIC);
    out.extend_from_slice(&auth.chain_id.to_be_bytes());
    out.extend_from_slice(&contract);
    out.extend_from_slice(&auth.nonce.to_be_bytes());
    Ok(out)
}

/// Find the keypair owning `address` among `keys`.
pub fn find_key<'a>(keys: &'a [KeyPair], address: &str) -> Result<&'a KeyPair, KeyringError> {
    let wanted = normalize_address(address);
    keys.iter()
        .find(|kp| kp.address() == wanted)
        .ok_or(KeyringError::AddressNotFound(wanted))
}
