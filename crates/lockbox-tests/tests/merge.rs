//! Vault merge tests against a vault recorded from the browser extension.
//!
//! The recorded mnemonics and keys are truncated placeholders, so these
//! tests exercise `merge_vault` on raw serialized data only.

use proptest::prelude::*;
use serde_json::json;

use lockbox_core::constants::{HD_KEYRING, SIMPLE_KEYRING, WATCH_KEYRING};
use lockbox_core::types::SerializedKeyring;
use lockbox_service::merge_vault;
use lockbox_tests::helpers::merge_fixture;

fn hd(mnemonic: &str, accounts: &[&str]) -> SerializedKeyring {
    SerializedKeyring::new(
        HD_KEYRING,
        json!({ "mnemonic": mnemonic, "accounts": accounts, "accountDetails": {} }),
    )
}

#[test]
fn recorded_extension_vault_merges_as_expected() {
    let (origin, incoming, expected) = merge_fixture();
    assert_eq!(merge_vault(&origin, &incoming), expected);
}

#[test]
fn recorded_merge_keeps_origin_prefix() {
    let (origin, incoming, _) = merge_fixture();
    let merged = merge_vault(&origin, &incoming);
    for (i, entry) in origin.iter().enumerate() {
        assert_eq!(merged[i].keyring_type, entry.keyring_type);
    }
}

#[test]
fn recorded_merge_fills_empty_hardware_keyring() {
    let (origin, incoming, _) = merge_fixture();
    let merged = merge_vault(&origin, &incoming);
    let onekey = &merged[1];
    assert_eq!(onekey.keyring_type, "Onekey Hardware");
    assert_eq!(
        onekey.data["accounts"],
        json!(["0xaAE81CD98dC4bb7D03E65f1Cd668a641F0661519"])
    );
    assert_eq!(onekey.data["paths"].as_object().unwrap().len(), 47);
}

#[test]
fn recorded_merge_is_stable_on_second_pass() {
    let (origin, incoming, expected) = merge_fixture();
    let once = merge_vault(&origin, &incoming);
    assert_eq!(merge_vault(&once, &incoming), expected);
}

#[test]
fn hd_accounts_are_unioned_in_order() {
    let merged = merge_vault(&[hd("m", &["0x01"])], &[hd("m", &["0x02"])]);
    assert_eq!(merged, vec![hd("m", &["0x01", "0x02"])]);
}

#[test]
fn empty_origin_takes_incoming_verbatim() {
    let incoming = vec![
        hd("m", &["0x01"]),
        SerializedKeyring::new(SIMPLE_KEYRING, json!(["aa"])),
        SerializedKeyring::new(WATCH_KEYRING, json!({ "accounts": ["0x03"] })),
    ];
    assert_eq!(merge_vault(&[], &incoming), incoming);
}

#[test]
fn watch_keyrings_collapse_into_one() {
    let origin = vec![SerializedKeyring::new(
        WATCH_KEYRING,
        json!({ "accounts": ["0xAB"] }),
    )];
    let incoming = vec![SerializedKeyring::new(
        WATCH_KEYRING,
        json!({ "accounts": ["0xab", "0xcd"] }),
    )];
    let merged = merge_vault(&origin, &incoming);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].data["accounts"], json!(["0xAB", "0xcd"]));
}

fn arb_entry() -> impl Strategy<Value = SerializedKeyring> {
    prop_oneof![
        "[a-c]".prop_map(|k| SerializedKeyring::new(SIMPLE_KEYRING, json!([k]))),
        ("[a-b]", proptest::collection::vec("0x0[1-4]", 0..3))
            .prop_map(|(m, accounts)| SerializedKeyring::new(
                HD_KEYRING,
                json!({ "mnemonic": m, "accounts": accounts }),
            )),
        proptest::collection::vec("0x0[1-4]", 0..3).prop_map(|accounts| {
            SerializedKeyring::new(WATCH_KEYRING, json!({ "accounts": accounts }))
        }),
    ]
}

proptest! {
    #[test]
    fn merged_vault_contains_every_incoming_private_key(
        origin in proptest::collection::vec(arb_entry(), 0..5),
        incoming in proptest::collection::vec(arb_entry(), 0..5),
    ) {
        let merged = merge_vault(&origin, &incoming);
        for entry in incoming.iter().filter(|e| e.keyring_type == SIMPLE_KEYRING) {
            prop_assert!(merged.iter().any(|m| m.keyring_type == SIMPLE_KEYRING && m.data[0] == entry.data[0]));
        }
        prop_assert!(merged.len() <= origin.len() + incoming.len());
    }
}
