use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::EntityRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub new: Option<EntityRecord>,
    pub old: Option<EntityRecord>,
}

impl ChangeEvent {
    pub fn inserted(table: &str, record: EntityRecord) -> Self {
        Self {
            table: table.to_string(),
            kind: ChangeKind::Insert,
            new: Some(record),
            old: None,
        }
    }

    pub fn updated(table: &str, old: EntityRecord, new: EntityRecord) -> Self {
        Self {
            table: table.to_string(),
            kind: ChangeKind::Update,
            new: Some(new),
            old: Some(old),
        }
    }

    pub fn deleted(table: &str, record: EntityRecord) -> Self {
        Self {
            table: table.to_string(),
            kind: ChangeKind::Delete,
            new: None,
            old: Some(record),
        }
    }

    pub fn record(&self) -> Option<&EntityRecord> {
        self.new.as_ref().or(self.old.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionHandle(pub u64);

pub fn render_channel_filter(filters: &BTreeMap<String, Value>) -> String {
    filters
        .iter()
        .map(|(column, value)| match value {
            Value::String(text) => format!("{column}=eq.{text}"),
            other => format!("{column}=eq.{other}"),
        })
        .collect::<Vec<_>>()
        .join(",")
}
