mod common;

use common::*;
use liveedit_sync::{ApplyOutcome, FieldOptions, SaveStatus};
use liveedit_types::{SubscriptionFilter, SyncEvent};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};

// ── Debounce ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn burst_of_edits_produces_single_write() {
    let store = seeded_store();
    let engine = make_engine(&store);
    let field = engine.mount(title(), "", FieldOptions::optimistic(500)).await;
    let started = Instant::now();

    for value in ["B", "Bo", "Bob"] {
        field.update_value(value);
        sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(store.write_count(), 0);

    field.settle().await;

    // Last keystroke at 200ms, plus the 500ms debounce.
    assert_eq!(started.elapsed(), Duration::from_millis(700));
    assert_eq!(store.writes(), vec![(title(), json!("Bob"))]);
    assert!(!field.has_changes());
}

#[tokio::test(start_paused = true)]
async fn zero_debounce_saves_latest_value() {
    let store = seeded_store();
    let engine = make_engine(&store);
    let field = engine.mount(title(), "", FieldOptions::optimistic(0)).await;

    field.update_value("B");
    field.update_value("C");
    field.settle().await;

    assert_eq!(store.writes(), vec![(title(), json!("C"))]);
}

#[tokio::test(start_paused = true)]
async fn typing_back_to_original_cancels_save() {
    let store = seeded_store();
    let engine = make_engine(&store);
    let field = engine.mount(title(), "", FieldOptions::optimistic(500)).await;

    field.update_value("B");
    assert!(!engine.scheduler().is_idle(&title()));
    field.update_value("A");
    assert!(engine.scheduler().is_idle(&title()));

    sleep(Duration::from_secs(2)).await;
    assert_eq!(store.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn forced_save_cancels_debounce() {
    let store = seeded_store();
    let engine = make_engine(&store);
    let field = engine.mount(title(), "", FieldOptions::optimistic(500)).await;

    field.update_value("B");
    assert_eq!(field.save().await, SaveStatus::Saved);
    sleep(Duration::from_secs(2)).await;

    assert_eq!(store.writes(), vec![(title(), json!("B"))]);
}

// ── Serialization ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn writes_to_one_field_never_overlap() {
    let store = seeded_store();
    store.set_write_latency(Duration::from_secs(1));
    let engine = make_engine(&store);
    let field = engine.mount(title(), "", FieldOptions::optimistic(100)).await;

    field.update_value("B");
    sleep(Duration::from_millis(300)).await;
    assert!(field.is_saving());

    // Queued behind the in-flight write; only the newest value goes out.
    field.update_value("C");
    sleep(Duration::from_millis(200)).await;
    field.update_value("D");
    field.settle().await;

    assert_eq!(
        store.writes(),
        vec![(title(), json!("B")), (title(), json!("D"))]
    );
    assert_eq!(store.max_concurrent_writes_per_field(), 1);
    assert_eq!(store.stored(&title()), Some(json!("D")));
    assert!(!field.has_changes());
}

#[tokio::test(start_paused = true)]
async fn forced_save_waits_for_inflight_write() {
    let store = seeded_store();
    store.set_write_latency(Duration::from_secs(1));
    let engine = make_engine(&store);
    let field = engine.mount(title(), "", FieldOptions::optimistic(100)).await;

    field.update_value("B");
    sleep(Duration::from_millis(300)).await;
    field.update_value("C");

    let started = Instant::now();
    assert_eq!(field.save().await, SaveStatus::Saved);

    // The first write ends at 1.1s, the forced one a second later.
    assert_eq!(started.elapsed(), Duration::from_millis(1_800));
    assert_eq!(
        store.writes(),
        vec![(title(), json!("B")), (title(), json!("C"))]
    );
    assert_eq!(store.max_concurrent_writes_per_field(), 1);
}

#[tokio::test(start_paused = true)]
async fn different_fields_save_in_parallel() {
    let store = seeded_store();
    store.set_write_latency(Duration::from_secs(1));
    let engine = make_engine(&store);
    let title_field = engine.mount(title(), "", FieldOptions::optimistic(100)).await;
    let price_field = engine.mount(price(), 0, FieldOptions::optimistic(100)).await;

    title_field.update_value("B");
    price_field.update_value(20);
    let started = Instant::now();
    title_field.settle().await;
    price_field.settle().await;

    assert_eq!(started.elapsed(), Duration::from_millis(1_100));
    assert_eq!(store.max_concurrent_writes(), 2);
    assert_eq!(store.write_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_saves_coalesce() {
    let store = seeded_store();
    store.set_write_latency(Duration::from_millis(200));
    let engine = make_engine(&store);
    let field = engine.mount(title(), "", FieldOptions::optimistic(500)).await;

    field.update_value("B");
    let (first, second) = tokio::join!(field.save(), field.save());

    assert_eq!(first, SaveStatus::Saved);
    assert_eq!(second, SaveStatus::NoChanges);
    assert_eq!(store.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn overtaken_forced_save_reports_superseded() {
    let store = seeded_store();
    store.set_write_latency(Duration::from_secs(1));
    let engine = make_engine(&store);
    let field = engine.mount(title(), "", FieldOptions::optimistic(500)).await;

    field.update_value("B");
    let (first, second, third) = tokio::join!(
        field.save(),
        async {
            sleep(Duration::from_millis(100)).await;
            field.update_value("C");
            field.save().await
        },
        async {
            sleep(Duration::from_millis(200)).await;
            field.update_value("D");
            field.save().await
        },
    );

    assert_eq!(first, SaveStatus::Saved);
    assert_eq!(second, SaveStatus::Superseded);
    assert_eq!(third, SaveStatus::Saved);
    field.settle().await;
    assert_eq!(
        store.writes(),
        vec![(title(), json!("B")), (title(), json!("D"))]
    );
}

#[tokio::test(start_paused = true)]
async fn abandoned_save_still_completes() {
    let store = seeded_store();
    store.set_write_latency(Duration::from_secs(2));
    let engine = make_engine(&store);
    let field = engine.mount(title(), "", FieldOptions::pessimistic()).await;
    let mut reconciler = engine.reconciler(SubscriptionFilter::all());

    field.update_value("B");
    let waited = timeout(Duration::from_millis(500), field.save()).await;
    assert!(waited.is_err());
    assert!(field.is_saving());

    field.settle().await;
    let snap = field.snapshot();
    assert!(!snap.is_saving);
    assert!(!snap.has_changes);
    assert_eq!(snap.value, json!("B"));
    assert_eq!(store.stored(&title()), Some(json!("B")));

    // Once past the guard window the field follows remote changes again.
    sleep(Duration::from_secs(10)).await;
    store.set_remote(&title(), json!("C"));
    let outcomes = reconciler
        .handle_event(SyncEvent::item_changed(product(), None))
        .await;
    assert_eq!(outcomes, vec![(title(), ApplyOutcome::Applied)]);
    assert_eq!(field.value(), json!("C"));
}

// ── Store interaction ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn save_without_changes_skips_write() {
    let store = seeded_store();
    let engine = make_engine(&store);
    let field = engine.mount(title(), "", FieldOptions::default()).await;

    assert_eq!(field.save().await, SaveStatus::NoChanges);
    assert_eq!(store.write_count(), 0);
    assert!(engine.scheduler().is_idle(&title()));
}

#[tokio::test(start_paused = true)]
async fn successful_save_invalidates_cache() {
    let store = seeded_store();
    let engine = make_engine(&store);
    let field = engine.mount(title(), "", FieldOptions::optimistic(100)).await;
    assert!(engine.cache().contains(&product()));

    field.update_value("B");
    field.settle().await;

    assert!(!engine.cache().contains(&product()));
    let reloaded = engine.mount(title(), "", FieldOptions::default()).await;
    assert_eq!(reloaded.value(), json!("B"));
    assert_eq!(store.read_count(), 2);
}
