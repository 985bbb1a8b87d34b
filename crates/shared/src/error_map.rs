use std::{
    fs,
    path::Path,
    sync::{Arc, LazyLock},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::{RawError, DUPLICATE_KEY_CODE, FOREIGN_KEY_CODE, NOT_FOUND_CODE};

pub const NOT_FOUND_MESSAGE: &str = "The requested data could not be found";
pub const DUPLICATE_MESSAGE: &str = "This data already exists";
pub const FOREIGN_KEY_MESSAGE: &str = "Referenced data cannot be deleted";
pub const NETWORK_MESSAGE: &str = "Please check your network connection";
pub const TIMEOUT_MESSAGE: &str = "The request timed out";
pub const FALLBACK_MESSAGE: &str = "Something went wrong. Please try again shortly.";

static DEFAULT_CATALOG: LazyLock<Arc<ErrorCatalog>> =
    LazyLock::new(|| Arc::new(ErrorCatalog::builtin()));

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read error catalog {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse error catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("error catalog has no entries")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub pattern: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCatalog {
    pub entries: Vec<CatalogEntry>,
    pub fallback: String,
}

impl ErrorCatalog {
    pub fn builtin() -> Self {
        let entries = [
            (NOT_FOUND_CODE, NOT_FOUND_MESSAGE),
            (DUPLICATE_KEY_CODE, DUPLICATE_MESSAGE),
            (FOREIGN_KEY_CODE, FOREIGN_KEY_MESSAGE),
            (
                "Invalid login credentials",
                "The email or password is incorrect",
            ),
            ("Email not confirmed", "Email verification is required"),
            ("User already registered", "This email is already registered"),
            (
                "Password should be at least 6 characters",
                "Password must be at least 6 characters",
            ),
            ("Failed to fetch", NETWORK_MESSAGE),
            ("Network request failed", NETWORK_MESSAGE),
            ("timeout", TIMEOUT_MESSAGE),
        ]
        .into_iter()
        .map(|(pattern, message)| CatalogEntry {
            pattern: pattern.to_string(),
            message: message.to_string(),
        })
        .collect();

        Self {
            entries,
            fallback: FALLBACK_MESSAGE.to_string(),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let catalog: Self = toml::from_str(raw)?;
        if catalog.entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(catalog)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_toml_str(&raw)?;
        debug!(
            path = %path.display(),
            entries = catalog.entries.len(),
            "error catalog loaded"
        );
        Ok(catalog)
    }

    fn by_code(&self, code: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.pattern == code)
            .map(|entry| entry.message.as_str())
    }

    fn by_substring(&self, raw: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| raw.contains(entry.pattern.as_str()))
            .map(|entry| entry.message.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ErrorMapper {
    catalog: Arc<ErrorCatalog>,
}

impl Default for ErrorMapper {
    fn default() -> Self {
        Self {
            catalog: Arc::clone(&DEFAULT_CATALOG),
        }
    }
}

impl ErrorMapper {
    pub fn new(catalog: Arc<ErrorCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ErrorCatalog {
        &self.catalog
    }

    pub fn map(&self, error: &RawError) -> String {
        match error {
            RawError::Text(text) => self.map_parts(Some(text), Some(text)),
            RawError::Structured { code, message } => {
                self.map_parts(code.as_deref(), message.as_deref())
            }
        }
    }

    pub fn map_error(&self, error: impl Into<RawError>) -> String {
        self.map(&error.into())
    }

    fn map_parts(&self, code: Option<&str>, message: Option<&str>) -> String {
        if let Some(found) = code.and_then(|code| self.catalog.by_code(code)) {
            return found.to_string();
        }
        match message {
            Some(message) if !message.is_empty() => self
                .catalog
                .by_substring(message)
                .unwrap_or(message)
                .to_string(),
            _ => self.catalog.fallback.clone(),
        }
    }
}

#[cfg(test)]
#[path = "tests/error_map_tests.rs"]
mod tests;
