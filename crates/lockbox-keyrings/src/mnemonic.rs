//! BIP-39 mnemonic generation, validation and seed expansion.

use bip39::{Language, Mnemonic};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use lockbox_core::error::KeyringError;

/// Entropy length for generated mnemonics (12 words).
const GENERATED_ENTROPY_LEN: usize = 16;

/// A 64-byte BIP-39 seed.
///
/// Secret material is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; 64],
}

impl Seed {
    /// Get the raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a fresh 12-word English mnemonic from OS randomness.
pub fn generate_mnemonic() -> String {
    use rand::RngCore;
    let mut entropy = [0u8; GENERATED_ENTROPY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut entropy);
    let phrase = Mnemonic::from_entropy_in(Language::English, &entropy)
        .expect("16 bytes always produces valid mnemonic")
        .to_string();
    entropy.zeroize();
    phrase
}

/// Collapse whitespace and lowercase a phrase.
pub fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Parse and checksum-validate a mnemonic phrase.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, KeyringError> {
    Mnemonic::parse_in(Language::English, normalize_phrase(phrase))
        .map_err(|e| KeyringError::InvalidMnemonic(e.to_string()))
}

/// Whether `phrase` is a valid English BIP-39 mnemonic.
pub fn validate_mnemonic(phrase: &str) -> bool {
    parse_mnemonic(phrase).is_ok()
}

/// Expand a mnemonic and optional passphrase into a BIP-39 seed.
pub fn mnemonic_to_seed(phrase: &str, passphrase: &str) -> Result<Seed, KeyringError> {
    let m = parse_mnemonic(phrase)?;
    Ok(Seed {
        bytes: m.to_seed_normalized(passphrase),
    })
}
