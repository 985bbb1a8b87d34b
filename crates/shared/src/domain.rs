use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

pub type Fields = Map<String, Value>;

pub const ID_COLUMN: &str = "id";
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";

pub const RESERVED_COLUMNS: [&str; 3] = [ID_COLUMN, CREATED_AT_COLUMN, UPDATED_AT_COLUMN];

pub const DEFAULT_RANGE_SIZE: usize = 10;

pub mod tables {
    pub const USER_PROPERTIES: &str = "user_properties";
    pub const PROPERTY_PRICES: &str = "property_prices";
    pub const REGIONAL_STATISTICS: &str = "regional_statistics";
    pub const USER_ALERTS: &str = "user_alerts";
    pub const USER_WISHLIST: &str = "user_wishlist";
    pub const NOTIFICATIONS: &str = "notifications";
}

macro_rules! string_id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        // Remote stores hand out both uuid and bigint keys.
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                #[derive(Deserialize)]
                #[serde(untagged)]
                enum Raw {
                    Text(String),
                    Int(i64),
                    Unsigned(u64),
                }

                Ok(match Raw::deserialize(deserializer)? {
                    Raw::Text(value) => Self(value),
                    Raw::Int(value) => Self(value.to_string()),
                    Raw::Unsigned(value) => Self(value.to_string()),
                })
            }
        }
    };
}

string_id_newtype!(RecordId);

impl RecordId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) if !text.is_empty() => Some(Self(text.clone())),
            Value::Number(number) => Some(Self(number.to_string())),
            _ => None,
        }
    }
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Fields,
}

impl EntityRecord {
    pub fn new(id: RecordId, fields: Fields, at: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: at,
            updated_at: at,
            fields: strip_reserved(fields),
        }
    }

    pub fn from_row(row: Value) -> Result<Self, StoreError> {
        let Value::Object(mut row) = row else {
            return Err(StoreError::InvalidRecord(format!(
                "expected a JSON object row, got {row}"
            )));
        };

        let id = row
            .remove(ID_COLUMN)
            .as_ref()
            .and_then(RecordId::from_value)
            .ok_or_else(|| StoreError::InvalidRecord("row is missing an id".into()))?;
        let created_at = take_timestamp(&mut row, CREATED_AT_COLUMN)?;
        let updated_at = take_timestamp(&mut row, UPDATED_AT_COLUMN)?;

        Ok(Self {
            id,
            created_at,
            updated_at,
            fields: row,
        })
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            ID_COLUMN => Some(Value::String(self.id.0.clone())),
            CREATED_AT_COLUMN => Some(Value::String(format_timestamp(&self.created_at))),
            UPDATED_AT_COLUMN => Some(Value::String(format_timestamp(&self.updated_at))),
            _ => self.fields.get(name).cloned(),
        }
    }

    pub fn merge(&mut self, partial: Fields, at: DateTime<Utc>) {
        for (key, value) in strip_reserved(partial) {
            self.fields.insert(key, value);
        }
        self.updated_at = at;
    }

    pub fn to_row(&self) -> Fields {
        let mut row = self.fields.clone();
        row.insert(ID_COLUMN.into(), Value::String(self.id.0.clone()));
        row.insert(
            CREATED_AT_COLUMN.into(),
            Value::String(format_timestamp(&self.created_at)),
        );
        row.insert(
            UPDATED_AT_COLUMN.into(),
            Value::String(format_timestamp(&self.updated_at)),
        );
        row
    }
}

pub fn strip_reserved(mut fields: Fields) -> Fields {
    for column in RESERVED_COLUMNS {
        fields.remove(column);
    }
    fields
}

fn take_timestamp(row: &mut Fields, column: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw = row
        .remove(column)
        .ok_or_else(|| StoreError::InvalidRecord(format!("row is missing {column}")))?;
    let text = raw
        .as_str()
        .ok_or_else(|| StoreError::InvalidRecord(format!("{column} is not a string: {raw}")))?;
    DateTime::parse_from_rfc3339(text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| StoreError::InvalidRecord(format!("{column} '{text}' is invalid: {err}")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    #[serde(default = "default_order_by")]
    pub order_by: String,
    #[serde(default)]
    pub ascending: bool,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

fn default_order_by() -> String {
    CREATED_AT_COLUMN.to_string()
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            filters: BTreeMap::new(),
            order_by: default_order_by(),
            ascending: false,
            limit: None,
            offset: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub len: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(column.into(), value.into());
        self
    }

    pub fn filters<I, K, V>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (column, value) in filters {
            self.filters.insert(column.into(), value.into());
        }
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order_by = column.into();
        self.ascending = ascending;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn active_filters(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.filters
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(column, value)| (column.as_str(), value))
    }

    /// A zero limit or offset counts as absent. With an offset the window spans
    /// `offset..=offset + (limit or DEFAULT_RANGE_SIZE) - 1`.
    pub fn window(&self) -> Window {
        let limit = self.limit.filter(|limit| *limit > 0).map(|l| l as usize);
        match self.offset.filter(|offset| *offset > 0) {
            Some(offset) => Window {
                offset: offset as usize,
                len: Some(limit.unwrap_or(DEFAULT_RANGE_SIZE)),
            },
            None => Window {
                offset: 0,
                len: limit,
            },
        }
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
