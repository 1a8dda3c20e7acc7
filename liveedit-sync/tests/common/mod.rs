#![allow(dead_code)]

use liveedit_sync::store::mock::MockStore;
use liveedit_sync::{EditEngine, EngineConfig};
use liveedit_types::{FieldKey, Record, RecordKey};
use serde_json::json;
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn product() -> RecordKey {
    RecordKey::new("products", "42")
}

pub fn title() -> FieldKey {
    product().field("title")
}

pub fn price() -> FieldKey {
    product().field("price")
}

/// A store holding `products/42` with `title = "A"` and `price = 10`.
pub fn seeded_store() -> Arc<MockStore> {
    init_tracing();
    Arc::new(MockStore::new().with_record(
        product(),
        Record::new()
            .with("title", json!("A"))
            .with("price", json!(10)),
    ))
}

pub fn make_engine(store: &Arc<MockStore>) -> EditEngine {
    make_engine_with(store, EngineConfig::default())
}

pub fn make_engine_with(store: &Arc<MockStore>, config: EngineConfig) -> EditEngine {
    EditEngine::new(store.clone(), config).unwrap()
}
