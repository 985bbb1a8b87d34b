use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NOT_FOUND_CODE: &str = "PGRST116";
pub const DUPLICATE_KEY_CODE: &str = "23505";
pub const FOREIGN_KEY_CODE: &str = "23503";

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Item not found: {table}/{id}")]
    NotFound { table: String, id: String },
    #[error("duplicate key value violates unique constraint on {table}: {detail}")]
    DuplicateKey { table: String, detail: String },
    #[error("foreign key violation on {table}: {detail}")]
    ForeignKeyViolation { table: String, detail: String },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("Failed to fetch: {0}")]
    Network(String),
    #[error("request timeout: {0}")]
    Timeout(String),
    #[error("{message}")]
    Remote {
        code: Option<String>,
        message: String,
    },
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(table: &str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            table: table.to_string(),
            id: id.to_string(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::NotFound { .. } => Some(NOT_FOUND_CODE),
            StoreError::DuplicateKey { .. } => Some(DUPLICATE_KEY_CODE),
            StoreError::ForeignKeyViolation { .. } => Some(FOREIGN_KEY_CODE),
            StoreError::Remote { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawError {
    Text(String),
    Structured {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

impl RawError {
    pub fn structured(code: Option<&str>, message: Option<&str>) -> Self {
        Self::Structured {
            code: code.map(str::to_string),
            message: message.map(str::to_string),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::Structured {
            code: None,
            message: Some(message.into()),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            RawError::Text(_) => None,
            RawError::Structured { code, .. } => code.as_deref(),
        }
    }

    pub fn raw_message(&self) -> Option<&str> {
        match self {
            RawError::Text(text) => Some(text),
            RawError::Structured { message, .. } => message.as_deref(),
        }
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawError::Text(text) => f.write_str(text),
            RawError::Structured { code, message } => match (code, message) {
                (Some(code), Some(message)) => write!(f, "{code}: {message}"),
                (None, Some(message)) => f.write_str(message),
                (Some(code), None) => f.write_str(code),
                (None, None) => f.write_str("unknown error"),
            },
        }
    }
}

impl std::error::Error for RawError {}

impl From<String> for RawError {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for RawError {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<&StoreError> for RawError {
    fn from(value: &StoreError) -> Self {
        Self::Structured {
            code: value.code().map(str::to_string),
            message: Some(value.to_string()),
        }
    }
}

impl From<StoreError> for RawError {
    fn from(value: StoreError) -> Self {
        Self::from(&value)
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for RawError {
    fn from(value: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::message(value.to_string())
    }
}
