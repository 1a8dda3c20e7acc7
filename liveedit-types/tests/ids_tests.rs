use liveedit_types::{FieldKey, RecordKey};
use std::collections::HashSet;

// ── RecordKey ───────────────────────────────────────────────────

#[test]
fn record_key_display() {
    let key = RecordKey::new("products", "42");
    assert_eq!(key.to_string(), "products/42");
}

#[test]
fn record_key_roundtrip_through_str() {
    let key = RecordKey::new("pages", "home");
    let parsed: RecordKey = key.to_string().parse().unwrap();
    assert_eq!(parsed, key);
}

#[test]
fn record_key_rejects_malformed() {
    assert!("products".parse::<RecordKey>().is_err());
    assert!("/42".parse::<RecordKey>().is_err());
    assert!("products/".parse::<RecordKey>().is_err());
    assert!("a/b/c".parse::<RecordKey>().is_err());
    assert!("products/42#a".parse::<RecordKey>().is_err());
}

#[test]
fn record_key_hash_distinguishes_items() {
    let mut set = HashSet::new();
    set.insert(RecordKey::new("products", "1"));
    set.insert(RecordKey::new("products", "2"));
    set.insert(RecordKey::new("products", "1"));
    assert_eq!(set.len(), 2);
}

// ── FieldKey ────────────────────────────────────────────────────

#[test]
fn field_key_from_record() {
    let record = RecordKey::new("products", "42");
    let field = record.field("title");
    assert_eq!(field.record, record);
    assert_eq!(field.field, "title");
    assert_eq!(field.collection(), "products");
    assert_eq!(field.item_id(), "42");
}

#[test]
fn field_key_display_and_parse() {
    let key = FieldKey::new("products", "42", "price");
    assert_eq!(key.to_string(), "products/42#price");
    let parsed: FieldKey = "products/42#price".parse().unwrap();
    assert_eq!(parsed, key);
}

#[test]
fn field_name_with_hash_roundtrips() {
    let key = FieldKey::new("products", "42", "a#b");
    assert_eq!(key.to_string(), "products/42#a#b");

    let parsed: FieldKey = key.to_string().parse().unwrap();
    assert_eq!(parsed, key);
    assert_eq!(parsed.item_id(), "42");
    assert_eq!(parsed.field, "a#b");
}

#[test]
fn field_key_rejects_missing_field() {
    assert!("products/42".parse::<FieldKey>().is_err());
    assert!("products/42#".parse::<FieldKey>().is_err());
    assert!("products#title".parse::<FieldKey>().is_err());
}

#[test]
fn field_keys_on_same_record_differ() {
    let a = FieldKey::new("products", "42", "title");
    let b = FieldKey::new("products", "42", "description");
    assert_ne!(a, b);
    assert_eq!(a.record, b.record);
}
