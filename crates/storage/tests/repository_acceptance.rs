use serde_json::{json, Value};
use shared::{
    domain::{tables, Fields, QueryOptions},
    error::StoreError,
};
use storage::{EntityRepository, HoldingsService, InMemoryRepository, SqliteRepository};

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

/// One listing lifecycle, run unchanged against each local backend.
async fn listing_lifecycle<R: EntityRepository>(service: HoldingsService<R>) {
    let repo = service.repository();
    let created = repo
        .create(
            tables::USER_PROPERTIES,
            fields(json!({"user_id": "agent-1", "name": "Mapo flat", "price": 850_000_000})),
        )
        .await
        .expect("create");
    assert_eq!(created.fields["name"], json!("Mapo flat"));

    let fetched = repo
        .get_by_id(tables::USER_PROPERTIES, &created.id)
        .await
        .expect("get");
    assert_eq!(fetched, created);

    let updated = repo
        .update(
            tables::USER_PROPERTIES,
            &created.id,
            fields(json!({"price": 820_000_000, "id": "ignored"})),
        )
        .await
        .expect("update");
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.fields["price"], json!(820_000_000));
    assert!(updated.updated_at >= created.updated_at);

    repo.batch_create(
        tables::USER_PROPERTIES,
        vec![
            fields(json!({"user_id": "agent-1", "name": "Jeju land"})),
            fields(json!({"user_id": "agent-2", "name": "Busan villa"})),
        ],
    )
    .await
    .expect("batch create");

    let owned = service
        .user_properties("agent-1", Default::default())
        .await
        .expect("user properties");
    let names: Vec<&Value> = owned.iter().map(|record| &record.fields["name"]).collect();
    assert_eq!(names, vec![&json!("Jeju land"), &json!("Mapo flat")]);

    let removed = repo
        .delete(tables::USER_PROPERTIES, &created.id)
        .await
        .expect("delete");
    assert_eq!(removed.id, created.id);
    let err = repo
        .get_by_id(tables::USER_PROPERTIES, &created.id)
        .await
        .expect_err("gone");
    assert!(matches!(err, StoreError::NotFound { .. }));

    let empty = repo
        .list("never_created", &QueryOptions::new())
        .await
        .expect("unknown table lists empty");
    assert!(empty.is_empty());
}

#[tokio::test]
async fn in_memory_listing_lifecycle() {
    listing_lifecycle(HoldingsService::new(InMemoryRepository::new())).await;
}

#[tokio::test]
async fn sqlite_listing_lifecycle() {
    let repo = SqliteRepository::new("sqlite::memory:").await.expect("db");
    listing_lifecycle(HoldingsService::new(repo)).await;
}
