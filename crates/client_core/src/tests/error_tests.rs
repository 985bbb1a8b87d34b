use super::*;
use shared::{
    error::StoreError,
    error_map::{ErrorCatalog, NETWORK_MESSAGE},
};
use std::sync::{Arc, Mutex};

#[test]
fn handle_error_builds_retryable_report() {
    let report = handle_error(StoreError::not_found("properties", "p-1"), Some("load"));
    assert_eq!(report.title, ERROR_REPORT_TITLE);
    assert_eq!(report.message, "The requested data could not be found");
    assert!(report.can_retry);
}

#[test]
fn handle_error_passes_unknown_text_through() {
    let report = handle_error("disk is on fire", None);
    assert_eq!(report.message, "disk is on fire");
}

fn offline_mapper() -> ErrorMapper {
    let catalog = ErrorCatalog::from_toml_str(
        r#"
        fallback = "Try again later"

        [[entries]]
        pattern = "connection refused"
        message = "You appear to be offline"
        "#,
    )
    .expect("catalog parses");
    ErrorMapper::new(Arc::new(catalog))
}

#[test]
fn handle_error_with_uses_the_given_catalog() {
    let mapper = offline_mapper();
    let report = handle_error_with(
        StoreError::Network("connection refused".into()),
        Some("sync"),
        &mapper,
    );
    assert_eq!(report.message, "You appear to be offline");

    let default = handle_error(StoreError::Network("connection refused".into()), Some("sync"));
    assert_eq!(default.message, NETWORK_MESSAGE);
}

#[tokio::test]
async fn guarded_returns_value_on_success() {
    let value = guarded("ok", async { Ok::<_, RawError>(5) }, None).await;
    assert_eq!(value, Some(5));
}

#[tokio::test]
async fn guarded_reports_mapped_error() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&seen);
    let callback = move |message: &str| sink.lock().expect("lock").push(message.to_string());

    let value: Option<u32> = guarded(
        "fetch listings",
        async { Err(StoreError::Network("connection refused".into())) },
        Some(&callback),
    )
    .await;

    assert_eq!(value, None);
    assert_eq!(*seen.lock().expect("lock"), vec![NETWORK_MESSAGE.to_string()]);
}

#[tokio::test]
async fn guarded_with_reports_through_the_given_catalog() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&seen);
    let callback = move |message: &str| sink.lock().expect("lock").push(message.to_string());
    let mapper = offline_mapper();

    let value: Option<u32> = guarded_with(
        "fetch listings",
        async { Err(StoreError::Network("connection refused".into())) },
        Some(&callback),
        &mapper,
    )
    .await;

    assert_eq!(value, None);
    assert_eq!(
        *seen.lock().expect("lock"),
        vec!["You appear to be offline".to_string()]
    );
}

#[tokio::test]
async fn guarded_catches_panics() {
    let seen = Arc::new(Mutex::new(None::<String>));
    let sink = Arc::clone(&seen);
    let callback = move |message: &str| *sink.lock().expect("lock") = Some(message.to_string());

    let value: Option<u32> = guarded(
        "render",
        async {
            if true {
                panic!("layout exploded");
            }
            Ok::<_, RawError>(1)
        },
        Some(&callback),
    )
    .await;

    assert_eq!(value, None);
    assert_eq!(seen.lock().expect("lock").as_deref(), Some("layout exploded"));
}

#[test]
fn panic_message_handles_unknown_payloads() {
    let payload: Box<dyn Any + Send> = Box::new(42_u8);
    assert_eq!(panic_message(payload.as_ref()), "task panicked");
    let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
    assert_eq!(panic_message(payload.as_ref()), "owned");
}
