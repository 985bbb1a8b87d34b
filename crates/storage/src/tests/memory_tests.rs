use std::sync::Mutex;

use serde_json::json;
use shared::protocol::ChangeKind;

use super::*;

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[tokio::test]
async fn create_assigns_id_and_timestamps() {
    let repo = InMemoryRepository::new();
    let record = repo
        .create("user_properties", fields(json!({"name": "Apt 101"})))
        .await
        .expect("create");
    assert!(!record.id.as_str().is_empty());
    assert_eq!(record.created_at, record.updated_at);
    assert_eq!(record.fields.get("name"), Some(&json!("Apt 101")));
}

#[tokio::test]
async fn create_honours_caller_id_and_rejects_duplicates() {
    let repo = InMemoryRepository::new();
    let record = repo
        .create("t", fields(json!({"id": "fixed", "a": 1})))
        .await
        .expect("create");
    assert_eq!(record.id.as_str(), "fixed");

    let err = repo
        .create("t", fields(json!({"id": "fixed"})))
        .await
        .expect_err("duplicate");
    assert!(matches!(err, StoreError::DuplicateKey { .. }));
    assert_eq!(repo.table_len("t").await, 1);
}

#[tokio::test]
async fn get_by_id_reports_not_found() {
    let repo = InMemoryRepository::new();
    let err = repo
        .get_by_id("t", &RecordId::from("missing"))
        .await
        .expect_err("missing");
    assert!(err.is_not_found());
    assert_eq!(err.code(), Some("PGRST116"));
}

#[tokio::test]
async fn list_filters_by_owner_newest_first() {
    let repo = InMemoryRepository::new();
    for (owner, name) in [("u1", "first"), ("u2", "other"), ("u1", "second")] {
        repo.create(
            "user_properties",
            fields(json!({"user_id": owner, "name": name})),
        )
        .await
        .expect("create");
    }

    let rows = repo
        .list(
            "user_properties",
            &QueryOptions::new().filter("user_id", "u1"),
        )
        .await
        .expect("list");
    let names: Vec<_> = rows
        .iter()
        .map(|record| record.fields["name"].clone())
        .collect();
    assert_eq!(names, [json!("second"), json!("first")]);
}

#[tokio::test]
async fn list_unknown_table_is_empty() {
    let repo = InMemoryRepository::new();
    let rows = repo
        .list("nothing_here", &QueryOptions::default())
        .await
        .expect("list");
    assert!(rows.is_empty());
}

#[tokio::test]
async fn update_merges_shallowly_and_bumps_updated_at() {
    let repo = InMemoryRepository::new();
    let created = repo
        .create("t", fields(json!({"id": "1", "a": 1, "b": 2})))
        .await
        .expect("create");
    let updated = repo
        .update("t", &created.id, fields(json!({"b": 3})))
        .await
        .expect("update");

    assert_eq!(updated.id.as_str(), "1");
    assert_eq!(updated.fields, fields(json!({"a": 1, "b": 3})));
    assert!(updated.updated_at > created.updated_at);
    assert_eq!(updated.created_at, created.created_at);
}

#[tokio::test]
async fn update_ignores_reserved_columns() {
    let repo = InMemoryRepository::new();
    let created = repo
        .create("t", fields(json!({"id": "1", "a": 1})))
        .await
        .expect("create");
    let updated = repo
        .update(
            "t",
            &created.id,
            fields(json!({"id": "2", "created_at": "1999-01-01T00:00:00Z", "a": 5})),
        )
        .await
        .expect("update");
    assert_eq!(updated.id.as_str(), "1");
    assert_eq!(updated.created_at, created.created_at);
    assert_eq!(updated.fields.get("a"), Some(&json!(5)));
}

#[tokio::test]
async fn update_missing_record_is_an_error() {
    let repo = InMemoryRepository::new();
    let err = repo
        .update("t", &RecordId::from("nope"), fields(json!({"a": 1})))
        .await
        .expect_err("missing");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn delete_returns_removed_record() {
    let repo = InMemoryRepository::new();
    let created = repo
        .create("t", fields(json!({"a": 1})))
        .await
        .expect("create");
    let removed = repo.delete("t", &created.id).await.expect("delete");
    assert_eq!(removed, created);
    assert!(repo
        .delete("t", &created.id)
        .await
        .expect_err("second delete")
        .is_not_found());
}

#[tokio::test]
async fn batch_create_is_all_or_nothing() {
    let repo = InMemoryRepository::new();
    repo.create("t", fields(json!({"id": "taken"})))
        .await
        .expect("create");

    let err = repo
        .batch_create(
            "t",
            vec![fields(json!({"id": "new"})), fields(json!({"id": "taken"}))],
        )
        .await
        .expect_err("clash");
    assert!(matches!(err, StoreError::DuplicateKey { .. }));
    assert_eq!(repo.table_len("t").await, 1);

    let created = repo
        .batch_create("t", vec![fields(json!({"a": 1})), fields(json!({"a": 2}))])
        .await
        .expect("batch");
    assert_eq!(created.len(), 2);
    assert!(created[0].created_at < created[1].created_at);
    assert_eq!(repo.table_len("t").await, 3);
}

#[tokio::test]
async fn batch_delete_skips_missing_ids() {
    let repo = InMemoryRepository::new();
    let created = repo
        .batch_create(
            "t",
            vec![
                fields(json!({"id": "1"})),
                fields(json!({"id": "2"})),
                fields(json!({"id": "3"})),
            ],
        )
        .await
        .expect("batch");
    assert_eq!(created.len(), 3);

    let removed = repo
        .batch_delete("t", &[RecordId::from("1"), RecordId::from("9"), RecordId::from("3")])
        .await
        .expect("batch delete");
    let removed_ids: Vec<_> = removed.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(removed_ids, ["1", "3"]);
    assert_eq!(repo.table_len("t").await, 1);
}

#[tokio::test]
async fn writes_are_published_to_matching_subscribers() {
    let repo = InMemoryRepository::new();
    let seen: Arc<Mutex<Vec<ChangeKind>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let handle = repo.subscribe(
        "notifications",
        BTreeMap::from([("user_id".to_string(), json!("u1"))]),
        Arc::new(move |event: &ChangeEvent| sink.lock().unwrap().push(event.kind)),
    );

    let mine = repo
        .create("notifications", fields(json!({"user_id": "u1"})))
        .await
        .expect("create");
    repo.create("notifications", fields(json!({"user_id": "u2"})))
        .await
        .expect("create other");
    repo.update("notifications", &mine.id, fields(json!({"is_read": true})))
        .await
        .expect("update");
    repo.delete("notifications", &mine.id).await.expect("delete");

    assert!(repo.unsubscribe(handle));
    assert!(!repo.unsubscribe(handle));
    repo.create("notifications", fields(json!({"user_id": "u1"})))
        .await
        .expect("create after unsubscribe");

    assert_eq!(
        *seen.lock().unwrap(),
        [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]
    );
    assert_eq!(repo.changes().subscriber_count(), 0);
}
