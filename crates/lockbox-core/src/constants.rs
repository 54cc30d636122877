//! Keyring type names and vault constants.
//!
//! Type names are part of the persisted vault format and of the vault
//! exchanged with the browser extension, so they must never change.

/// Raw private key keyring.
pub const SIMPLE_KEYRING: &str = "Simple Key Pair";

/// BIP-39 mnemonic keyring.
pub const HD_KEYRING: &str = "HD Key Tree";

/// Watch-only address keyring.
pub const WATCH_KEYRING: &str = "Watch Address";

/// Ledger hardware wallet reference keyring.
pub const LEDGER_KEYRING: &str = "Ledger Hardware";

/// OneKey hardware wallet reference keyring.
pub const ONEKEY_KEYRING: &str = "Onekey Hardware";

/// Trezor hardware wallet reference keyring.
pub const TREZOR_KEYRING: &str = "Trezor Hardware";

/// Gnosis Safe multisig reference keyring.
pub const GNOSIS_KEYRING: &str = "Gnosis";

/// Keyring types whose serialized data carries a secret.
///
/// Entries of these types are never mirrored into the cleartext
/// `unencryptedKeyringData` list, and only one keyring may hold a given
/// secret at a time.
pub const SECRET_KEYRING_TYPES: [&str; 2] = [SIMPLE_KEYRING, HD_KEYRING];

/// Hardware keyring types.
pub const HARDWARE_KEYRING_TYPES: [&str; 3] = [LEDGER_KEYRING, ONEKEY_KEYRING, TREZOR_KEYRING];

/// Plaintext of the booted sentinel.
pub const BOOTED_SENTINEL: &str = "true";

/// Default BIP-44 path prefix used by HD keyrings.
pub const DEFAULT_HD_PATH: &str = "m/44'/60'/0'/0";

/// Length of an account address body in bytes (hex-encoded after `0x`).
pub const ADDRESS_LEN: usize = 20;

/// Whether keyrings of this type hold secret key material.
pub fn is_secret_type(keyring_type: &str) -> bool {
    SECRET_KEYRING_TYPES.contains(&keyring_type)
}

/// Whether this type refers to a hardware device.
pub fn is_hardware_type(keyring_type: &str) -> bool {
    HARDWARE_KEYRING_TYPES.contains(&keyring_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_types() {
        assert!(is_secret_type(SIMPLE_KEYRING));
        assert!(is_secret_type(HD_KEYRING));
        assert!(!is_secret_type(WATCH_KEYRING));
        assert!(!is_secret_type(LEDGER_KEYRING));
        assert!(!is_secret_type(GNOSIS_KEYRING));
    }

    #[test]
    fn hardware_types() {
        assert!(is_hardware_type(LEDGER_KEYRING));
        assert!(is_hardware_type(ONEKEY_KEYRING));
        assert!(is_hardware_type(TREZOR_KEYRING));
        assert!(!is_hardware_type(HD_KEYRING));
    }
}
