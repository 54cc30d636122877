//! Account address normalization and comparison.
//!
//! Addresses are `0x`-prefixed hex strings. Comparisons are always
//! case-insensitive so checksummed and lowercased forms of the same address
//! are treated as one account.

/// Normalize an address: trim, ensure a `0x` prefix, lowercase.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    let body = strip_hex_prefix(trimmed);
    format!("0x{}", body.to_ascii_lowercase())
}

/// Strip a leading `0x`/`0X` if present.
pub fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Case-insensitive, prefix-agnostic address equality.
pub fn is_same_address(a: &str, b: &str) -> bool {
    strip_hex_prefix(a.trim()).eq_ignore_ascii_case(strip_hex_prefix(b.trim()))
}

/// Whether `address` looks like a 20-byte hex address.
pub fn is_valid_address(address: &str) -> bool {
    let body = strip_hex_prefix(address.trim());
    body.len() == crate::constants::ADDRESS_LEN * 2 && hex::decode(body).is_ok()
}
