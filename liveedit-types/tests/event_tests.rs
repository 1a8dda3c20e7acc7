use liveedit_types::{RecordKey, SubscriptionFilter, SyncEvent, SyncEventKind};
use pretty_assertions::assert_eq;

// ── SyncEvent ───────────────────────────────────────────────────

#[test]
fn item_changed_touches_listed_fields_only() {
    let key = RecordKey::new("products", "1");
    let event = SyncEvent::item_changed(key.clone(), Some(vec!["title".into()]));

    assert!(event.touches(&key, "title"));
    assert!(!event.touches(&key, "price"));
    assert!(!event.touches(&RecordKey::new("products", "2"), "title"));
}

#[test]
fn item_changed_without_fields_touches_everything() {
    let key = RecordKey::new("products", "1");
    let event = SyncEvent::item_changed(key.clone(), None);
    assert!(event.touches(&key, "title"));
    assert!(event.touches(&key, "anything"));
}

#[test]
fn connection_status_touches_nothing() {
    let event = SyncEvent::connection_status(false);
    assert!(!event.touches(&RecordKey::new("products", "1"), "title"));
    assert_eq!(event.kind, SyncEventKind::ConnectionStatus { connected: false });
}

#[test]
fn event_json_shape() {
    let event = SyncEvent::item_changed(RecordKey::new("pages", "home"), Some(vec!["body".into()]));
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["kind"], "item-changed");
    assert_eq!(value["key"]["collection"], "pages");
    assert_eq!(value["changed_fields"][0], "body");

    let back: SyncEvent = serde_json::from_value(value).unwrap();
    assert_eq!(back, event);
}

// ── SubscriptionFilter ──────────────────────────────────────────

#[test]
fn empty_filter_matches_everything() {
    let filter = SubscriptionFilter::all();
    assert!(filter.matches(&RecordKey::new("products", "1")));
    assert!(filter.matches(&RecordKey::new("pages", "home")));
}

#[test]
fn collection_filter() {
    let filter = SubscriptionFilter::collections(["products"]);
    assert!(filter.matches(&RecordKey::new("products", "1")));
    assert!(!filter.matches(&RecordKey::new("pages", "home")));
}

#[test]
fn item_filter_narrows_collection_filter() {
    let wanted = RecordKey::new("products", "1");
    let filter = SubscriptionFilter::collections(["products"]).with_item(wanted.clone());
    assert!(filter.matches(&wanted));
    assert!(!filter.matches(&RecordKey::new("products", "2")));
}
