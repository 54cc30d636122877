//! Vault merge: reconcile two serialized keyring lists into one.
//!
//! Entries of `incoming` are folded one by one into a copy of `origin`:
//!
//! - An entry identical to one already in the result is skipped.
//! - `Simple Key Pair`: skipped when an entry of that type already stores
//!   the same (first) key, ignoring a `0x` prefix and letter case;
//!   appended otherwise.
//! - `HD Key Tree`: deep-merged into the first entry describing the same
//!   mnemonic keyring (see [`is_same_hd_keyring`]), appended otherwise.
//! - Every other type: deep-merged into the first entry of the same type,
//!   appended if there is none.
//!
//! Deep merge keeps origin scalars, inserts keys missing from origin,
//! merges nested objects recursively, unions `accounts` arrays by
//! case-insensitive address and unions every other array by JSON equality.
//! Merging a vault with itself returns it unchanged.

use serde_json::{Map, Value};
use tracing::debug;

use lockbox_core::address::strip_hex_prefix;
use lockbox_core::constants::{HD_KEYRING, SIMPLE_KEYRING};
use lockbox_core::types::SerializedKeyring;

/// HD fields that describe derived accounts rather than keyring identity.
const HD_ACCOUNT_FIELDS: [&str; 3] = ["accountDetails", "accounts", "activeIndexes"];

/// Merge `incoming` into `origin`, returning the combined list.
pub fn merge_vault(origin: &[SerializedKeyring], incoming: &[SerializedKeyring]) -> Vec<SerializedKeyring> {
    let mut result = origin.to_vec();
    let (mut skipped, mut merged, mut appended) = (0usize, 0usize, 0usize);

    for entry in incoming {
        if result.iter().any(|existing| existing == entry) {
            skipped += 1;
            continue;
        }
        let target = match entry.keyring_type.as_str() {
            SIMPLE_KEYRING => {
                let key = first_key(&entry.data);
                if result
                    .iter()
                    .any(|e| e.keyring_type == SIMPLE_KEYRING && first_key(&e.data) == key)
                {
                    skipped += 1;
                    continue;
                }
                None
            }
            HD_KEYRING => result.iter().position(|e| {
                e.keyring_type == HD_KEYRING && is_same_hd_keyring(&e.data, &entry.data)
            }),
            ty => result.iter().position(|e| e.keyring_type == ty),
        };
        match target {
            Some(index) => {
                merge_value(&mut result[index].data, &entry.data, None);
                merged += 1;
            }
            None => {
                result.push(entry.clone());
                appended += 1;
            }
        }
    }

    debug!(
        origin = origin.len(),
        incoming = incoming.len(),
        skipped,
        merged,
        appended,
        "merged vault"
    );
    result
}

/// The single stored key of a private key entry, in canonical hex.
fn first_key(data: &Value) -> Option<String> {
    let key = data.as_array()?.first()?;
    Some(match key.as_str() {
        Some(hex) => strip_hex_prefix(hex.trim()).to_ascii_lowercase(),
        None => key.to_string(),
    })
}

/// Whether two HD entries describe the same mnemonic keyring.
///
/// `mnemonic` must be present and equal on both sides. Every other field
/// present on both sides, apart from the derived-account fields, must be
/// equal. Fields present on one side only are ignored.
pub fn is_same_hd_keyring(a: &Value, b: &Value) -> bool {
    let (Some(a), Some(b)) = (a.as_object(), b.as_object()) else {
        return false;
    };
    match (a.get("mnemonic"), b.get("mnemonic")) {
        (Some(ma), Some(mb)) if !ma.is_null() && ma == mb => {}
        _ => return false,
    }
    a.iter()
        .filter(|(k, _)| !HD_ACCOUNT_FIELDS.contains(&k.as_str()))
        .all(|(k, va)| b.get(k).is_none_or(|vb| va == vb))
}

fn merge_value(origin: &mut Value, incoming: &Value, key: Option<&str>) {
    match (origin, incoming) {
        (Value::Object(o), Value::Object(i)) => merge_objects(o, i),
        (Value::Array(o), Value::Array(i)) if key == Some("accounts") => union_accounts(o, i),
        (Value::Array(o), Value::Array(i)) => {
            for item in i {
                if !o.contains(item) {
                    o.push(item.clone());
                }
            }
        }
        _ => {}
    }
}

fn merge_objects(origin: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (k, v) in incoming {
        match origin.get_mut(k) {
            Some(existing) => merge_value(existing, v, Some(k)),
            None => {
                origin.insert(k.clone(), v.clone());
            }
        }
    }
}

fn union_accounts(origin: &mut Vec<Value>, incoming: &[Value]) {
    for item in incoming {
        let present = origin.iter().any(|existing| match (existing.as_str(), item.as_str()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => existing == item,
        });
        if !present {
            origin.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockbox_core::constants::{LEDGER_KEYRING, WATCH_KEYRING};
    use proptest::prelude::*;
    use serde_json::json;

    fn hd(mnemonic: &str, accounts: &[&str]) -> SerializedKeyring {
        SerializedKeyring::new(
            HD_KEYRING,
            json!({ "mnemonic": mnemonic, "accounts": accounts, "accountDetails": {} }),
        )
    }

    fn simple(key: &str) -> SerializedKeyring {
        SerializedKeyring::new(SIMPLE_KEYRING, json!([key]))
    }

    #[test]
    fn merge_into_empty_appends_everything() {
        let incoming = vec![simple("aa"), hd("m1", &["0x01"])];
        assert_eq!(merge_vault(&[], &incoming), incoming);
    }

    #[test]
    fn merge_with_empty_keeps_origin() {
        let origin = vec![simple("aa")];
        assert_eq!(merge_vault(&origin, &[]), origin);
    }

    #[test]
    fn merge_with_self_is_identity() {
        let vault = vec![simple("aa"), hd("m1", &["0x01"])];
        assert_eq!(merge_vault(&vault, &vault), vault);
    }

    #[test]
    fn duplicate_private_key_is_skipped() {
        let merged = merge_vault(&[simple("aa")], &[simple("aa"), simple("bb")]);
        assert_eq!(merged, vec![simple("aa"), simple("bb")]);
    }

    #[test]
    fn private_key_spelling_does_not_defeat_dedup() {
        let merged = merge_vault(&[simple("ab")], &[simple("0xab"), simple("AB"), simple("0XAb")]);
        assert_eq!(merged, vec![simple("ab")]);
    }

    #[test]
    fn hd_accounts_union() {
        let merged = merge_vault(&[hd("m1", &["0xAA"])], &[hd("m1", &["0xaa", "0xbb"])]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].data["accounts"], json!(["0xAA", "0xbb"]));
    }

    #[test]
    fn different_mnemonic_is_appended() {
        let merged = merge_vault(&[hd("m1", &["0x01"])], &[hd("m2", &["0x02"])]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn hd_match_ignores_one_sided_fields() {
        let a = json!({ "mnemonic": "m", "hdPath": "p", "byImport": true });
        let b = json!({ "mnemonic": "m", "publicKey": "0x1" });
        assert!(is_same_hd_keyring(&a, &b));
        let c = json!({ "mnemonic": "m", "hdPath": "other" });
        assert!(!is_same_hd_keyring(&a, &c));
        assert!(!is_same_hd_keyring(&json!({}), &json!({})));
    }

    #[test]
    fn hd_merge_keeps_origin_scalars_and_fills_missing() {
        let origin = SerializedKeyring::new(HD_KEYRING, json!({ "mnemonic": "m", "index": 0 }));
        let incoming = SerializedKeyring::new(
            HD_KEYRING,
            json!({ "mnemonic": "m", "publicKey": "0x02", "accountDetails": { "0x01": { "index": 1 } } }),
        );
        let merged = merge_vault(&[origin], &[incoming]);
        assert_eq!(merged[0].data["index"], json!(0));
        assert_eq!(merged[0].data["publicKey"], json!("0x02"));
        assert_eq!(merged[0].data["accountDetails"]["0x01"]["index"], json!(1));
    }

    #[test]
    fn non_unique_type_merges_into_first() {
        let origin = vec![SerializedKeyring::new(WATCH_KEYRING, json!({ "accounts": ["0x01"] }))];
        let incoming = vec![SerializedKeyring::new(WATCH_KEYRING, json!({ "accounts": ["0x02"] }))];
        let merged = merge_vault(&origin, &incoming);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].data["accounts"], json!(["0x01", "0x02"]));
    }

    #[test]
    fn new_type_is_appended() {
        let origin = vec![simple("aa")];
        let ledger = SerializedKeyring::new(LEDGER_KEYRING, json!({ "accounts": ["0x01"] }));
        let merged = merge_vault(&origin, &[ledger.clone()]);
        assert_eq!(merged, vec![simple("aa"), ledger]);
    }

    #[test]
    fn plain_arrays_union_by_equality() {
        let origin = vec![SerializedKeyring::new(LEDGER_KEYRING, json!({ "paths": [1, 2] }))];
        let incoming = vec![SerializedKeyring::new(LEDGER_KEYRING, json!({ "paths": [2, 3] }))];
        assert_eq!(merge_vault(&origin, &incoming)[0].data["paths"], json!([1, 2, 3]));
    }

    fn arb_entry() -> impl Strategy<Value = SerializedKeyring> {
        let key = "[0-9a-f]{4}";
        let addr = "0x[0-9a-fA-F]{4}";
        prop_oneof![
            key.prop_map(|k| simple(&k)),
            (key, prop::collection::vec(addr, 0..3)).prop_map(|(m, accts)| {
                let refs: Vec<&str> = accts.iter().map(String::as_str).collect();
                hd(&m, &refs)
            }),
            prop::collection::vec(addr, 0..3).prop_map(|accts| {
                SerializedKeyring::new(WATCH_KEYRING, json!({ "accounts": accts }))
            }),
        ]
    }

    proptest! {
        #[test]
        fn merge_is_idempotent(vault in prop::collection::vec(arb_entry(), 0..8)) {
            prop_assert_eq!(merge_vault(&vault, &vault), vault);
        }

        #[test]
        fn merge_never_drops_origin_entries(
            origin in prop::collection::vec(arb_entry(), 0..6),
            incoming in prop::collection::vec(arb_entry(), 0..6),
        ) {
            let merged = merge_vault(&origin, &incoming);
            prop_assert!(merged.len() >= origin.len());
            for (o, m) in origin.iter().zip(&merged) {
                prop_assert_eq!(&o.keyring_type, &m.keyring_type);
            }
        }
    }
}
