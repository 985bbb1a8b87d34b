use std::sync::Arc;

use client_core::{
    DataFetchController, FetchOptions, FormController, PaginatedFetchController,
    PaginationOptions, SubmitOutcome,
};
use serde_json::{json, Value};
use shared::{
    domain::{tables, EntityRecord, Fields, QueryOptions},
    validation::{price, required},
};
use storage::{EntityRepository, HoldingsService, InMemoryRepository};

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

async fn seed_listings(repo: &InMemoryRepository, count: usize) {
    let rows = (0..count)
        .map(|n| fields(json!({"user_id": "agent-1", "name": format!("listing {n}")})))
        .collect();
    repo.batch_create(tables::USER_PROPERTIES, rows)
        .await
        .expect("seed");
}

#[tokio::test]
async fn paginated_controller_walks_repository_pages() {
    let repo = Arc::new(InMemoryRepository::new());
    seed_listings(&repo, 7).await;

    let source = Arc::clone(&repo);
    let controller = PaginatedFetchController::new(
        move |page: u32, page_size: u32| {
            let repo = Arc::clone(&source);
            async move {
                let options = QueryOptions::new()
                    .order_by("created_at", true)
                    .limit(page_size)
                    .offset((page - 1) * page_size);
                repo.list(tables::USER_PROPERTIES, &options).await
            }
        },
        PaginationOptions::default().page_size(3),
    );

    controller.mount().await.expect("first page");
    while controller.load_more().await.is_some() {}

    let state = controller.snapshot();
    let names: Vec<Value> = state
        .items
        .iter()
        .map(|record: &EntityRecord| record.fields["name"].clone())
        .collect();
    let expected: Vec<Value> = (0..7).map(|n| json!(format!("listing {n}"))).collect();
    assert_eq!(names, expected);
    assert_eq!(state.page, 3);
    assert!(!state.has_more);
}

#[tokio::test]
async fn form_submission_lands_in_repository_and_refetch_sees_it() {
    let service = Arc::new(HoldingsService::new(Arc::new(InMemoryRepository::new())));

    let reader = Arc::clone(&service);
    let listings = DataFetchController::with_options(
        move || {
            let service = Arc::clone(&reader);
            async move { service.user_properties("agent-1", Default::default()).await }
        },
        FetchOptions::default(),
    );
    listings.mount().await;
    assert_eq!(listings.snapshot().data.map(|rows| rows.len()), Some(0));

    let writer = Arc::clone(&service);
    let form = FormController::builder(fields(json!({"user_id": "agent-1", "name": "", "price": ""})))
        .field("name", vec![required("a listing name")])
        .field("price", vec![price(1_000_000.0)])
        .on_submit(move |values| {
            let service = Arc::clone(&writer);
            async move {
                service
                    .repository()
                    .create(tables::USER_PROPERTIES, values)
                    .await
                    .map(|_| ())
            }
        })
        .build();

    assert_eq!(form.handle_submit().await, SubmitOutcome::Invalid);

    form.handle_change("name", "Seongsu loft");
    form.handle_change("price", 1_250_000_000);
    assert_eq!(form.handle_submit().await, SubmitOutcome::Submitted);

    let rows = listings.refetch().await.expect("refetch");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields["name"], json!("Seongsu loft"));
}

#[tokio::test]
async fn missing_record_surfaces_friendly_message() {
    let repo = Arc::new(InMemoryRepository::new());
    let controller = DataFetchController::new(move || {
        let repo = Arc::clone(&repo);
        async move {
            repo.get_by_id(tables::USER_PROPERTIES, &"missing".into())
                .await
        }
    });
    controller.mount().await;
    assert_eq!(
        controller.snapshot().error.as_deref(),
        Some("The requested data could not be found")
    );
}
