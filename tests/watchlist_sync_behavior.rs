//! Behavior-driven tests for the watch-list
//!
//! These tests verify HOW the local watch-list is reconciled with the server
//! and HOW optimistic mutations publish, confirm and roll back.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stockwatch_core::{
    ClientConfig, CoreError, HttpError, HttpMethod, JsonFileStore, KeyValueStore, MemoryStore,
    MockHttpClient, MutationErrorKind, Provenance, RecordingTelemetry, StockClient, SyncPhase,
    WatchList, FAVORITES_KEY, LAST_SYNC_KEY, MIGRATION_COMPLETED_KEY, PREMIGRATION_BACKUP_KEY,
};
use stockwatch_tests::{item, seed};

fn client(mock: &Arc<MockHttpClient>, store: &Arc<MemoryStore>) -> StockClient {
    StockClient::builder(mock.clone())
        .store(store.clone())
        .telemetry(Arc::new(RecordingTelemetry::new()))
        .build()
        .expect("client builds")
}

fn symbols(list: &WatchList) -> Vec<String> {
    list.symbols().map(|symbol| symbol.to_string()).collect()
}

const EMPTY_SERVER: &str = r#"{"count": 0, "favorites": []}"#;

// =============================================================================
// Reconciliation Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_local_item_is_missing_on_server_migration_uploads_it() {
    // Given: local = [AAA (local only)], server = []
    let store = Arc::new(MemoryStore::new());
    seed(&*store, vec![item("AAA", 1_000, Provenance::LocalOnly)]);
    let mock = Arc::new(MockHttpClient::new());
    mock.respond(HttpMethod::Get, "/favorites", 200, EMPTY_SERVER)
        .respond(HttpMethod::Post, "/favorites", 200, "{}");
    let client = client(&mock, &store);

    // When: Reconciliation runs
    let outcome = client.sync_favorites().await;

    // Then: AAA is uploaded and the merged list is [AAA]
    assert!(outcome.migrated);
    assert_eq!(outcome.result.uploaded, 1);
    assert_eq!(outcome.result.failed, 0);
    assert_eq!(outcome.result.total, 1);
    assert!(!outcome.result.fallback_to_local);
    assert_eq!(symbols(&outcome.favorites), vec!["AAA"]);
    assert_eq!(
        outcome.favorites.items()[0].provenance,
        Provenance::ServerConfirmed
    );

    // And: The upload carried the stock code
    let upload = mock
        .calls()
        .into_iter()
        .find(|call| call.method == HttpMethod::Post)
        .expect("upload issued");
    assert_eq!(upload.body.as_deref(), Some(r#"{"stock_code":"AAA"}"#));

    // And: Migration is marked complete and persisted
    assert!(client.sync_state().await.migration_completed);
    assert_eq!(store.get(MIGRATION_COMPLETED_KEY).expect("read"), Some(json!(true)));
    assert_eq!(store.get(LAST_SYNC_KEY).expect("read").expect("present")["uploaded"], 1);
    assert_eq!(client.sync_phase(), SyncPhase::Ready);
}

#[tokio::test(start_paused = true)]
async fn when_local_list_is_empty_migration_adopts_server_list() {
    // Given: local = [], server = [BBB]
    let store = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockHttpClient::new());
    mock.respond(
        HttpMethod::Get,
        "/favorites",
        200,
        r#"{"count": 1, "favorites": [{"code": "BBB", "name": "Bravo", "created_at": "2025-08-01 09:00:00"}]}"#,
    );
    let client = client(&mock, &store);

    // When: Reconciliation runs
    let outcome = client.sync_favorites().await;

    // Then: No uploads happen and the merged list is [BBB]
    assert_eq!(mock.call_count(HttpMethod::Post, "/favorites"), 0);
    assert_eq!(symbols(&outcome.favorites), vec!["BBB"]);
    assert_eq!(outcome.result.total, 0);
    assert_eq!(symbols(&client.current_favorites()), vec!["BBB"]);
    assert!(client.sync_state().await.migration_completed);
}

#[tokio::test(start_paused = true)]
async fn when_server_fetch_fails_reconciliation_falls_back_to_local_list() {
    // Given: A persisted local list and an unreachable service
    let store = Arc::new(MemoryStore::new());
    seed(&*store, vec![item("AAA", 1_000, Provenance::LocalOnly)]);
    let mock = Arc::new(MockHttpClient::new());
    mock.fail(HttpMethod::Get, "/favorites", HttpError::connect("connection refused"));
    let client = client(&mock, &store);

    // When: Reconciliation runs
    let outcome = client.sync_favorites().await;

    // Then: The local list is returned, flagged as a fallback
    assert!(outcome.result.fallback_to_local);
    assert!(outcome.result.error.is_some());
    assert_eq!(symbols(&outcome.favorites), vec!["AAA"]);
    assert_eq!(mock.call_count(HttpMethod::Post, "/favorites"), 0);

    // And: Migration is not marked complete so the next launch retries
    assert!(!client.sync_state().await.migration_completed);
    assert_eq!(store.get(MIGRATION_COMPLETED_KEY).expect("read"), None);
}

#[tokio::test(start_paused = true)]
async fn when_migration_already_completed_second_sync_never_uploads() {
    // Given: A first reconciliation that migrated AAA
    let store = Arc::new(MemoryStore::new());
    seed(&*store, vec![item("AAA", 1_000, Provenance::LocalOnly)]);
    let mock = Arc::new(MockHttpClient::new());
    mock.respond(HttpMethod::Get, "/favorites", 200, EMPTY_SERVER)
        .respond(HttpMethod::Post, "/favorites", 200, "{}");
    let client = client(&mock, &store);
    client.sync_favorites().await;
    assert_eq!(mock.call_count(HttpMethod::Post, "/favorites"), 1);

    // When: Reconciliation runs again in the same session
    let second = client.sync_favorites().await;

    // Then: No upload is issued and the server list is adopted as-is
    assert!(!second.migrated);
    assert_eq!(mock.call_count(HttpMethod::Post, "/favorites"), 1);
    assert!(second.favorites.is_empty());
}

#[tokio::test(start_paused = true)]
async fn when_state_is_reloaded_from_disk_migration_stays_complete() {
    // Given: A file-backed store migrated by a previous process
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("state.json");
    let file_store = Arc::new(JsonFileStore::new(&path));
    seed(&*file_store, vec![item("AAA", 1_000, Provenance::LocalOnly)]);
    let mock = Arc::new(MockHttpClient::new());
    mock.respond(HttpMethod::Get, "/favorites", 200, EMPTY_SERVER)
        .respond(HttpMethod::Post, "/favorites", 200, "{}");
    StockClient::builder(mock.clone())
        .store(file_store)
        .build()
        .expect("client builds")
        .sync_favorites()
        .await;

    // When: A new client starts from the same file
    let restarted = StockClient::builder(mock.clone())
        .store(Arc::new(JsonFileStore::new(&path)))
        .build()
        .expect("client builds");
    restarted.sync_favorites().await;

    // Then: The migration flag survived and nothing is uploaded twice
    assert!(restarted.sync_state().await.migration_completed);
    assert_eq!(mock.call_count(HttpMethod::Post, "/favorites"), 1);
}

#[tokio::test(start_paused = true)]
async fn when_some_uploads_fail_migration_completes_and_backs_up_failures() {
    // Given: Two local items; the second upload is rejected
    let store = Arc::new(MemoryStore::new());
    seed(
        &*store,
        vec![
            item("AAA", 2_000, Provenance::LocalOnly),
            item("BBB", 1_000, Provenance::LocalOnly),
        ],
    );
    let mock = Arc::new(MockHttpClient::new());
    mock.respond(HttpMethod::Get, "/favorites", 200, EMPTY_SERVER)
        .respond(HttpMethod::Post, "/favorites", 200, "{}")
        .respond(HttpMethod::Post, "/favorites", 400, "");
    let client = StockClient::builder(mock.clone())
        .store(store.clone())
        .config(ClientConfig::default().with_upload_delay(Duration::from_millis(200)))
        .build()
        .expect("client builds");

    // When: Reconciliation runs
    let started = tokio::time::Instant::now();
    let outcome = client.sync_favorites().await;

    // Then: Both uploads were attempted, one apart by the upload delay
    assert_eq!(mock.call_count(HttpMethod::Post, "/favorites"), 2);
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(outcome.result.uploaded, 1);
    assert_eq!(outcome.result.failed, 1);
    assert_eq!(outcome.result.total, 2);
    assert_eq!(symbols(&outcome.favorites), vec!["AAA"]);

    // And: Migration is complete regardless and the failure is kept aside
    assert!(client.sync_state().await.migration_completed);
    let backup = store
        .get(PREMIGRATION_BACKUP_KEY)
        .expect("read")
        .expect("backup written");
    assert_eq!(backup[0]["symbol"], "BBB");
}

#[tokio::test(start_paused = true)]
async fn when_local_list_uses_legacy_format_migration_uploads_it() {
    // Given: A watch-list saved in the older `{symbol, name, market, timestamp}` shape
    let store = Arc::new(MemoryStore::new());
    store
        .set(
            FAVORITES_KEY,
            json!([
                {"symbol": "000001.SZ", "name": "Ping An", "market": "A股", "timestamp": 1_722_500_000_000_i64},
                {"symbol": "600519", "name": "Moutai", "market": "深市", "timestamp": 1_722_400_000_000_i64}
            ]),
        )
        .expect("seeded");
    let mock = Arc::new(MockHttpClient::new());
    mock.respond(HttpMethod::Get, "/favorites", 200, EMPTY_SERVER)
        .respond(HttpMethod::Post, "/favorites", 200, "{}");
    let client = client(&mock, &store);

    // When: Reconciliation runs
    let outcome = client.sync_favorites().await;

    // Then: Both legacy entries are uploaded, newest first
    assert_eq!(outcome.result.uploaded, 2);
    assert_eq!(outcome.result.total, 2);
    let bodies: Vec<String> = mock
        .calls()
        .iter()
        .filter(|call| call.method == HttpMethod::Post)
        .filter_map(|call| call.body.clone())
        .collect();
    assert_eq!(
        bodies,
        vec![r#"{"stock_code":"000001"}"#, r#"{"stock_code":"600519"}"#]
    );
    assert_eq!(symbols(&outcome.favorites), vec!["000001", "600519"]);

    // And: The stored list now holds the confirmed entries
    let stored: WatchList =
        serde_json::from_value(store.get(FAVORITES_KEY).expect("read").expect("present"))
            .expect("deserializes");
    assert_eq!(stored.len(), 2);
    assert!(stored
        .items()
        .iter()
        .all(|item| item.provenance == Provenance::ServerConfirmed));
}

#[tokio::test(start_paused = true)]
async fn when_stored_entry_is_unreadable_it_is_backed_up_before_sync() {
    // Given: One readable legacy entry and one entry without a code
    let store = Arc::new(MemoryStore::new());
    store
        .set(
            FAVORITES_KEY,
            json!([
                {"symbol": "AAPL", "name": "Apple", "market": "美股", "timestamp": 1_000},
                {"name": "orphan", "timestamp": 2_000}
            ]),
        )
        .expect("seeded");
    let mock = Arc::new(MockHttpClient::new());
    mock.respond(HttpMethod::Get, "/favorites", 200, EMPTY_SERVER)
        .respond(HttpMethod::Post, "/favorites", 200, "{}");
    let client = client(&mock, &store);

    // When: Reconciliation rewrites the stored list
    let outcome = client.sync_favorites().await;

    // Then: The readable entry migrated and the unreadable one was kept aside
    assert_eq!(symbols(&outcome.favorites), vec!["AAPL"]);
    assert_eq!(
        store.get(PREMIGRATION_BACKUP_KEY).expect("read"),
        Some(json!([{"name": "orphan", "timestamp": 2_000}]))
    );
}

// =============================================================================
// Read API
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_favorites_are_read_first_access_reconciles_then_uses_cache() {
    // Given: A server list with one item
    let store = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockHttpClient::new());
    mock.respond(
        HttpMethod::Get,
        "/favorites",
        200,
        r#"{"count": 1, "favorites": [{"code": "000001.SZ", "name": "Ping An Bank"}]}"#,
    );
    let client = client(&mock, &store);

    // When: Favorites are read three times
    let first = client.get_favorites().await.expect("first read");
    let second = client.get_favorites().await.expect("second read");
    let third = client.get_favorites().await.expect("third read");

    // Then: The first read reconciles, the rest are served from cache
    assert_eq!(first.count, 1);
    assert_eq!(first.items[0].symbol.as_str(), "000001");
    assert_eq!(second, third);
    assert_eq!(mock.call_count(HttpMethod::Get, "/favorites"), 1);
}

#[tokio::test(start_paused = true)]
async fn when_add_is_confirmed_next_read_refetches_server_list() {
    // Given: A migrated client whose favorites are cached
    let store = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockHttpClient::new());
    mock.respond(HttpMethod::Get, "/favorites", 200, EMPTY_SERVER)
        .respond(
            HttpMethod::Get,
            "/favorites",
            200,
            r#"{"count": 1, "favorites": [{"code": "AAA"}]}"#,
        )
        .respond(HttpMethod::Post, "/favorites", 200, "{}");
    let client = client(&mock, &store);
    client.get_favorites().await.expect("initial read");

    // When: An add is confirmed and favorites are read again
    let outcome = client.add_favorite("AAA").await.expect("added");
    let favorites = client.get_favorites().await.expect("read after add");

    // Then: The cache was invalidated and the server view is returned
    assert!(outcome.is_new);
    assert_eq!(mock.call_count(HttpMethod::Get, "/favorites"), 2);
    assert_eq!(favorites.count, 1);
    assert_eq!(favorites.items[0].provenance, Provenance::ServerConfirmed);
}

// =============================================================================
// Optimistic Mutations
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_add_is_in_flight_callers_already_observe_it() {
    // Given: A slow service that will reject the add
    let store = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockHttpClient::new().with_latency(Duration::from_secs(1)));
    mock.respond(HttpMethod::Post, "/favorites", 400, "");
    let client = client(&mock, &store);
    let mut updates = client.subscribe_favorites();

    // When: The add is started but not yet confirmed
    let add = client.add_favorite("AAA");
    tokio::pin!(add);
    tokio::select! {
        _ = &mut add => panic!("add must still be in flight"),
        _ = tokio::time::sleep(Duration::from_millis(100)) => {}
    }

    // Then: The item is already published
    assert!(updates.has_changed().expect("sender alive"));
    assert_eq!(symbols(&updates.borrow_and_update()), vec!["AAA"]);

    // And: Once the service rejects it, the list is rolled back
    let error = add.await.expect_err("must fail");
    assert!(matches!(
        error,
        CoreError::Mutation(ref failure) if failure.kind() == MutationErrorKind::Generic
    ));
    assert!(client.current_favorites().is_empty());
    assert!(updates.borrow().is_empty());
}

#[tokio::test(start_paused = true)]
async fn when_add_is_followed_by_remove_before_confirmation_symbol_ends_absent() {
    // Given: A slow service that accepts both calls
    let store = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockHttpClient::new().with_latency(Duration::from_millis(300)));
    mock.respond(HttpMethod::Post, "/favorites", 200, "{}")
        .respond(HttpMethod::Delete, "/favorites/AAA", 200, "{}");
    let client = client(&mock, &store);

    // When: Add and remove are issued back to back
    let (added, removed) = tokio::join!(client.add_favorite("AAA"), client.remove_favorite("AAA"));

    // Then: Both succeed, in request order, and AAA is absent
    assert!(added.expect("add confirmed").is_new);
    removed.expect("remove confirmed");
    let methods: Vec<HttpMethod> = mock.calls().iter().map(|call| call.method).collect();
    assert_eq!(methods, vec![HttpMethod::Post, HttpMethod::Delete]);
    assert!(client.current_favorites().is_empty());
}

#[tokio::test(start_paused = true)]
async fn when_favorites_are_read_during_remove_confirmed_remove_still_wins() {
    // Given: A migrated client whose cached server list still holds AAA
    let store = Arc::new(MemoryStore::new());
    store
        .set(MIGRATION_COMPLETED_KEY, json!(true))
        .expect("seeded");
    let mock = Arc::new(MockHttpClient::new().with_latency(Duration::from_millis(100)));
    mock.respond(
        HttpMethod::Get,
        "/favorites",
        200,
        r#"{"count": 1, "favorites": [{"code": "AAA"}]}"#,
    )
    .respond(HttpMethod::Delete, "/favorites/AAA", 200, "{}");
    let client = client(&mock, &store);
    client.get_favorites().await.expect("primes the cache");

    // When: A read is served from cache while the remove is in flight
    let (removed, read) = tokio::join!(client.remove_favorite("AAA"), client.get_favorites());

    // Then: The read saw the stale server list, but the confirmed remove wins
    removed.expect("remove confirmed");
    assert_eq!(read.expect("read").count, 1);
    assert!(client.current_favorites().is_empty());
    let stored: WatchList =
        serde_json::from_value(store.get(FAVORITES_KEY).expect("read").expect("present"))
            .expect("deserializes");
    assert!(stored.is_empty());
}

#[tokio::test(start_paused = true)]
async fn when_remove_fails_list_is_restored_exactly() {
    // Given: A three item list and a service that keeps failing deletes
    let store = Arc::new(MemoryStore::new());
    seed(
        &*store,
        vec![
            item("AAA", 3_000, Provenance::ServerConfirmed),
            item("BBB", 2_000, Provenance::ServerConfirmed),
            item("CCC", 1_000, Provenance::ServerConfirmed),
        ],
    );
    let mock = Arc::new(MockHttpClient::new());
    mock.respond(HttpMethod::Delete, "/favorites/BBB", 500, "");
    let client = client(&mock, &store);
    let before = client.current_favorites();

    // When: BBB is removed
    let error = client.remove_favorite("BBB").await.expect_err("must fail");

    // Then: The list is identical by symbol set and order
    let after = client.current_favorites();
    assert_eq!(symbols(&after), symbols(&before));
    assert_eq!(*after, *before);
    let CoreError::Mutation(failure) = error else {
        panic!("expected a mutation error");
    };
    assert_eq!(failure.kind(), MutationErrorKind::Generic);
    assert_eq!(failure.api_error().attempts(), 3);

    // And: The persisted copy matches as well
    let stored: WatchList =
        serde_json::from_value(store.get(FAVORITES_KEY).expect("read").expect("present"))
            .expect("deserializes");
    assert_eq!(stored, *before);
}

#[tokio::test(start_paused = true)]
async fn when_remove_times_out_failure_is_classified_as_timeout() {
    // Given: A service slower than the request timeout
    let store = Arc::new(MemoryStore::new());
    seed(&*store, vec![item("AAA", 1_000, Provenance::ServerConfirmed)]);
    let mock = Arc::new(MockHttpClient::new().with_latency(Duration::from_secs(10)));
    mock.respond(HttpMethod::Delete, "/favorites/AAA", 200, "{}");
    let client = client(&mock, &store);

    // When: AAA is removed
    let error = client.remove_favorite("AAA").await.expect_err("must time out");

    // Then: The user sees a timeout message and AAA is back
    let CoreError::Mutation(failure) = error else {
        panic!("expected a mutation error");
    };
    assert_eq!(failure.kind(), MutationErrorKind::Timeout);
    assert_eq!(failure.user_message(), "the request timed out, please try again");
    assert_eq!(symbols(&client.current_favorites()), vec!["AAA"]);
}

#[tokio::test(start_paused = true)]
async fn when_concurrent_mutations_touch_other_symbols_rollback_keeps_them() {
    // Given: Adds of AAA (rejected) and BBB (accepted) racing each other
    let store = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockHttpClient::new().with_latency(Duration::from_millis(100)));
    mock.respond(HttpMethod::Post, "/favorites", 400, "")
        .respond(HttpMethod::Post, "/favorites", 200, "{}");
    let client = client(&mock, &store);

    // When: Both run concurrently
    let (first, second) = tokio::join!(client.add_favorite("AAA"), client.add_favorite("BBB"));

    // Then: Only AAA is rolled back
    assert!(first.is_err());
    assert!(second.is_ok());
    assert_eq!(symbols(&client.current_favorites()), vec!["BBB"]);
}
