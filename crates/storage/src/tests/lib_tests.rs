use super::*;
use futures::StreamExt;
use serde_json::json;
use shared::error::ErrorCode;

fn fields(value: Value) -> Fields {
    value.as_object().cloned().expect("object literal")
}

async fn memory_storage() -> Storage {
    Storage::new("sqlite::memory:")
        .await
        .expect("db")
        .with_hash_cost(MIN_HASH_COST)
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = memory_storage().await;
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("village.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn created_document_is_readable_under_returned_id() {
    let storage = memory_storage().await;
    let id = storage
        .create("villages", fields(json!({ "name": "Green Valley", "id": "forged" })))
        .await
        .expect("create");

    assert_ne!(id, "forged");
    let doc = storage.get("villages", &id).await.expect("get");
    assert_eq!(doc.id, id);
    assert_eq!(doc.fields["name"], json!("Green Valley"));
    assert!(doc.fields.get("id").is_none());
    assert!(doc.fields[CREATED_AT].is_i64());
    assert_eq!(doc.fields[CREATED_AT], doc.fields[UPDATED_AT]);
}

#[tokio::test]
async fn server_timestamps_strictly_increase() {
    let storage = memory_storage().await;
    let first = storage.create("villages", Fields::new()).await.expect("first");
    let second = storage.create("villages", Fields::new()).await.expect("second");

    let a = storage.get("villages", &first).await.expect("a").fields[CREATED_AT].as_i64();
    let b = storage.get("villages", &second).await.expect("b").fields[CREATED_AT].as_i64();
    assert!(a < b);
}

#[tokio::test]
async fn missing_document_is_not_found() {
    let storage = memory_storage().await;
    let err = storage.get("villages", "nope").await.expect_err("missing");
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn update_patches_only_named_fields() {
    let storage = memory_storage().await;
    let id = storage
        .create(
            "villages",
            fields(json!({
                "name": "Green Valley",
                "population": 120,
                "location": { "latitude": 1.5, "address": "Old Road" }
            })),
        )
        .await
        .expect("create");

    storage
        .update(
            "villages",
            &id,
            fields(json!({ "population": 150, "location.address": "New Road" })),
        )
        .await
        .expect("update");

    let doc = storage.get("villages", &id).await.expect("get");
    assert_eq!(doc.fields["name"], json!("Green Valley"));
    assert_eq!(doc.fields["population"], json!(150));
    assert_eq!(doc.fields["location"]["address"], json!("New Road"));
    assert_eq!(doc.fields["location"]["latitude"], json!(1.5));
    assert!(doc.fields[UPDATED_AT].as_i64() > doc.fields[CREATED_AT].as_i64());
}

#[tokio::test]
async fn update_refuses_to_touch_the_id() {
    let storage = memory_storage().await;
    let id = storage.create("villages", Fields::new()).await.expect("create");
    let err = storage
        .update("villages", &id, fields(json!({ "id": "other" })))
        .await
        .expect_err("immutable id");
    assert_eq!(err.code(), ErrorCode::Rejected);

    let nested = storage
        .update("villages", &id, fields(json!({ "id.shadow": "x" })))
        .await
        .expect_err("nested id");
    assert_eq!(nested.code(), ErrorCode::Rejected);
    let doc = storage.get("villages", &id).await.expect("doc");
    assert!(!doc.fields.contains_key("id"));

    storage
        .update("villages", &id, fields(json!({ "identity": "kept" })))
        .await
        .expect("field merely starting with id");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_on_disk_all_land() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("village.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));
    let storage = Storage::new(&database_url).await.expect("db");
    let id = storage
        .create("villages", fields(json!({ "population": 0 })))
        .await
        .expect("create");

    let writers: Vec<_> = (1..=40)
        .map(|population| {
            let storage = storage.clone();
            let id = id.clone();
            tokio::spawn(async move {
                storage
                    .update("villages", &id, fields(json!({ "population": population })))
                    .await
            })
        })
        .collect();

    let mut failures = Vec::new();
    for writer in writers {
        if let Err(err) = writer.await.expect("join") {
            failures.push(err.to_string());
        }
    }
    assert!(failures.is_empty(), "failed updates: {failures:?}");

    let doc = storage.get("villages", &id).await.expect("doc");
    let population = doc.fields["population"].as_i64().expect("population");
    assert!((1..=40).contains(&population));
}

#[tokio::test]
async fn update_of_missing_document_is_not_found() {
    let storage = memory_storage().await;
    let err = storage
        .update("villages", "ghost", fields(json!({ "population": 1 })))
        .await
        .expect_err("missing");
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn put_uses_caller_supplied_id() {
    let storage = memory_storage().await;
    storage
        .put("users", "uid-1", fields(json!({ "name": "Asha" })))
        .await
        .expect("put");
    let doc = storage.get("users", "uid-1").await.expect("get");
    assert_eq!(doc.fields["name"], json!("Asha"));
}

#[tokio::test]
async fn unreadable_body_is_malformed() {
    let storage = memory_storage().await;
    sqlx::query("INSERT INTO documents (collection, id, body) VALUES ('villages', 'bad', 'not json')")
        .execute(storage.pool())
        .await
        .expect("raw insert");

    let err = storage.get("villages", "bad").await.expect_err("malformed");
    assert_eq!(err.code(), ErrorCode::Malformed);
}

#[tokio::test]
async fn query_filters_orders_and_scans_prefix() {
    let storage = memory_storage().await;
    for (name, active) in [
        ("Greenwood", true),
        ("Blue Hills", true),
        ("Green Valley", true),
        ("Greystone", false),
    ] {
        storage
            .create("villages", fields(json!({ "name": name, "isActive": active })))
            .await
            .expect("create");
    }

    let query = Query::collection("villages")
        .where_eq("isActive", true)
        .order_by("name", Direction::Ascending)
        .starts_with("Gree");
    let names: Vec<_> = storage
        .query(&query)
        .await
        .expect("query")
        .into_iter()
        .map(|d| d.fields["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("Green Valley"), json!("Greenwood")]);
}

#[tokio::test]
async fn watch_query_emits_current_then_changes_until_disposed() {
    let storage = memory_storage().await;
    storage
        .create("villages", fields(json!({ "name": "Blue Hills" })))
        .await
        .expect("seed");

    let (mut stream, disposer) = storage
        .watch_query(Query::collection("villages").order_by("name", Direction::Ascending))
        .into_parts();

    let initial = stream.next().await.expect("initial").expect("ok");
    assert_eq!(initial.len(), 1);

    storage
        .create("villages", fields(json!({ "name": "Alder" })))
        .await
        .expect("second");
    let updated = stream.next().await.expect("update").expect("ok");
    assert_eq!(updated.len(), 2);
    assert_eq!(updated[0].fields["name"], json!("Alder"));

    disposer.dispose();
    storage
        .create("villages", fields(json!({ "name": "Cedar" })))
        .await
        .expect("post-dispose write");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn watch_document_tracks_existence() {
    let storage = memory_storage().await;
    let (mut stream, disposer) = storage.watch_document("users", "uid-9").into_parts();

    assert_eq!(stream.next().await.expect("initial").expect("ok"), None);

    storage
        .put("users", "uid-9", fields(json!({ "name": "Ravi" })))
        .await
        .expect("put");
    let doc = stream
        .next()
        .await
        .expect("change")
        .expect("ok")
        .expect("present");
    assert_eq!(doc.id, "uid-9");
    disposer.dispose();
}

#[tokio::test]
async fn watch_reports_transport_faults() {
    let storage = memory_storage().await;
    let (mut stream, _disposer) = storage
        .watch_query(Query::collection("villages"))
        .into_parts();
    stream.next().await.expect("initial").expect("ok");

    storage.close().await;
    storage.hub().notify("villages");

    let err = stream.next().await.expect("fault").expect_err("transport");
    assert_eq!(err.code(), ErrorCode::Transport);
}

#[tokio::test]
async fn credentials_round_trip_and_session() {
    let storage = memory_storage().await;
    let credentials = storage.credentials();

    let id = credentials
        .create_account("asha@village.org", "secret-1")
        .await
        .expect("create");
    assert_eq!(credentials.current_id(), Some(id.clone()));

    credentials.invalidate();
    assert_eq!(credentials.current_id(), None);

    let verified = credentials
        .verify("ASHA@village.org", "secret-1")
        .await
        .expect("verify");
    assert_eq!(verified, id);
    assert_eq!(credentials.current_id(), Some(id.clone()));

    let stored: String = sqlx::query_scalar("SELECT secret_hash FROM accounts WHERE uid = ?")
        .bind(id.as_str())
        .fetch_one(storage.pool())
        .await
        .expect("stored hash");
    assert!(stored.starts_with("$2"));
    assert!(!stored.contains("secret-1"));
}

#[tokio::test]
async fn credentials_reject_bad_input() {
    let storage = memory_storage().await;
    let credentials = storage.credentials();

    let weak = credentials
        .create_account("a@village.org", "123")
        .await
        .expect_err("weak");
    assert_eq!(weak.code(), ErrorCode::Rejected);

    credentials
        .create_account("a@village.org", "123456")
        .await
        .expect("create");
    let duplicate = credentials
        .create_account("a@village.org", "abcdef")
        .await
        .expect_err("duplicate");
    assert_eq!(duplicate.code(), ErrorCode::Rejected);

    credentials.invalidate();
    let wrong = credentials
        .verify("a@village.org", "654321")
        .await
        .expect_err("wrong secret");
    assert_eq!(wrong.code(), ErrorCode::Rejected);
    assert_eq!(credentials.current_id(), None);
}

#[tokio::test]
async fn deleting_account_clears_session_and_login() {
    let storage = memory_storage().await;
    let credentials = storage.credentials();
    let id = credentials
        .create_account("gone@village.org", "123456")
        .await
        .expect("create");

    credentials.delete_account(&id).await.expect("delete");
    assert_eq!(credentials.current_id(), None);
    assert!(credentials.verify("gone@village.org", "123456").await.is_err());
    assert_eq!(
        credentials.delete_account(&id).await.expect_err("twice").code(),
        ErrorCode::NotFound
    );
}

#[tokio::test]
async fn password_reset_is_recorded_for_known_accounts() {
    let storage = memory_storage().await;
    let credentials = storage.credentials();
    credentials
        .create_account("reset@village.org", "123456")
        .await
        .expect("create");

    credentials
        .request_password_reset("reset@village.org")
        .await
        .expect("reset");
    let pending: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM password_reset_requests")
        .fetch_one(storage.pool())
        .await
        .expect("count");
    assert_eq!(pending, 1);

    let unknown = credentials
        .request_password_reset("nobody@village.org")
        .await
        .expect_err("unknown");
    assert_eq!(unknown.code(), ErrorCode::NotFound);
}
