use super::*;
use chrono::TimeZone;
use serde_json::json;

fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).single().expect("valid time")
}

#[test]
fn window_without_offset_uses_limit_only() {
    let options = QueryOptions::new().limit(5);
    assert_eq!(
        options.window(),
        Window {
            offset: 0,
            len: Some(5)
        }
    );
}

#[test]
fn window_with_offset_defaults_to_ten_rows() {
    let options = QueryOptions::new().offset(20);
    assert_eq!(
        options.window(),
        Window {
            offset: 20,
            len: Some(DEFAULT_RANGE_SIZE)
        }
    );
}

#[test]
fn zero_limit_and_offset_count_as_absent() {
    let options = QueryOptions::new().limit(0).offset(0);
    assert_eq!(options.window(), Window { offset: 0, len: None });
}

#[test]
fn default_query_orders_by_created_at_descending() {
    let options = QueryOptions::default();
    assert_eq!(options.order_by, "created_at");
    assert!(!options.ascending);
}

#[test]
fn null_filters_are_skipped() {
    let options = QueryOptions::new()
        .filter("user_id", "u1")
        .filter("region_code", Value::Null);
    let active: Vec<_> = options.active_filters().collect();
    assert_eq!(active, vec![("user_id", &json!("u1"))]);
}

#[test]
fn parses_row_with_numeric_id() {
    let record = EntityRecord::from_row(json!({
        "id": 42,
        "created_at": "2024-03-01T09:30:00+00:00",
        "updated_at": "2024-03-01T09:30:00.250000Z",
        "price": 120000,
    }))
    .expect("row parses");

    assert_eq!(record.id, RecordId::from("42"));
    assert_eq!(record.created_at, fixed_time());
    assert_eq!(record.fields.get("price"), Some(&json!(120000)));
    assert!(!record.fields.contains_key("id"));
}

#[test]
fn row_without_timestamps_is_rejected() {
    let err = EntityRecord::from_row(json!({ "id": "a" })).expect_err("missing created_at");
    assert!(matches!(err, StoreError::InvalidRecord(_)));
}

#[test]
fn merge_ignores_reserved_columns() {
    let mut fields = Fields::new();
    fields.insert("a".into(), json!(1));
    let mut record = EntityRecord::new(RecordId::from("1"), fields, fixed_time());

    let mut partial = Fields::new();
    partial.insert("id".into(), json!("hijack"));
    partial.insert("a".into(), json!(2));
    let later = fixed_time() + chrono::Duration::seconds(5);
    record.merge(partial, later);

    assert_eq!(record.id.as_str(), "1");
    assert_eq!(record.fields.get("a"), Some(&json!(2)));
    assert_eq!(record.updated_at, later);
    assert_eq!(record.created_at, fixed_time());
}

#[test]
fn row_view_round_trips_through_from_row() {
    let mut fields = Fields::new();
    fields.insert("user_id".into(), json!("u1"));
    let record = EntityRecord::new(RecordId::from("p-1"), fields, fixed_time());

    let parsed = EntityRecord::from_row(Value::Object(record.to_row())).expect("parses");
    assert_eq!(parsed, record);
}
