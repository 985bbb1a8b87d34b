use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value;
use shared::domain::{EntityRecord, QueryOptions};

pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => left == right,
    }
}

/// Total order over column values with null as the greatest value.
pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.filter(|value| !value.is_null());
    let right = right.filter(|value| !value.is_null());
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare_present(a, b),
    }
}

fn compare_present(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (a, b) => type_rank(a)
            .cmp(&type_rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
        Value::Null => 5,
    }
}

pub fn matches_filters(record: &EntityRecord, filters: &BTreeMap<String, Value>) -> bool {
    filters
        .iter()
        .filter(|(_, expected)| !expected.is_null())
        .all(|(column, expected)| {
            record
                .field(column)
                .is_some_and(|actual| values_equal(&actual, expected))
        })
}

pub fn run_query<'a, I>(records: I, options: &QueryOptions) -> Vec<EntityRecord>
where
    I: IntoIterator<Item = &'a EntityRecord>,
{
    let mut selected: Vec<EntityRecord> = records
        .into_iter()
        .filter(|record| matches_filters(record, &options.filters))
        .cloned()
        .collect();

    let column = options.order_by.as_str();
    if !column.is_empty() {
        // Keys are extracted once; `field` allocates for timestamp columns.
        let mut keyed: Vec<(Option<Value>, EntityRecord)> = selected
            .into_iter()
            .map(|record| (record.field(column), record))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| {
            let ordering = compare_values(a.as_ref(), b.as_ref());
            if options.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
        selected = keyed.into_iter().map(|(_, record)| record).collect();
    }

    let window = options.window();
    let rows = selected.into_iter().skip(window.offset);
    match window.len {
        Some(len) => rows.take(len).collect(),
        None => rows.collect(),
    }
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;
