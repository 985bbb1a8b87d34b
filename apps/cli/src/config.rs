use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context};
use serde::Deserialize;
use shared::error_map::{ErrorCatalog, ErrorMapper};

pub const SETTINGS_FILE: &str = "estate.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    Memory,
    Rest,
}

impl Backend {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            "rest" => Ok(Self::Rest),
            other => bail!("unknown backend '{other}' (expected sqlite, memory or rest)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub backend: Backend,
    pub database_url: String,
    pub rest_url: Option<String>,
    pub api_key: Option<String>,
    pub page_size: u32,
    pub poll_interval_ms: u64,
    pub log_filter: String,
    pub error_catalog: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            database_url: "sqlite://./data/estate.db".into(),
            rest_url: None,
            api_key: None,
            page_size: 10,
            poll_interval_ms: 5000,
            log_filter: "info".into(),
            error_catalog: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    backend: Option<Backend>,
    database_url: Option<String>,
    rest_url: Option<String>,
    api_key: Option<String>,
    page_size: Option<u32>,
    poll_interval_ms: Option<u64>,
    log_filter: Option<String>,
    error_catalog: Option<PathBuf>,
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_mapper(&self) -> anyhow::Result<ErrorMapper> {
        let Some(path) = &self.error_catalog else {
            return Ok(ErrorMapper::default());
        };
        let catalog = ErrorCatalog::load(path)
            .with_context(|| format!("failed to load error catalog '{}'", path.display()))?;
        Ok(ErrorMapper::new(Arc::new(catalog)))
    }

    fn apply_file(&mut self, file: FileSettings) {
        if let Some(v) = file.backend {
            self.backend = v;
        }
        if let Some(v) = file.database_url {
            self.database_url = v;
        }
        if let Some(v) = file.rest_url {
            self.rest_url = Some(v);
        }
        if let Some(v) = file.api_key {
            self.api_key = Some(v);
        }
        if let Some(v) = file.page_size {
            self.page_size = v;
        }
        if let Some(v) = file.poll_interval_ms {
            self.poll_interval_ms = v;
        }
        if let Some(v) = file.log_filter {
            self.log_filter = v;
        }
        if let Some(v) = file.error_catalog {
            self.error_catalog = Some(v);
        }
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = env("ESTATE_BACKEND") {
            self.backend = Backend::parse(&v)?;
        }

        if let Some(v) = env("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = env("APP__DATABASE_URL") {
            self.database_url = v;
        }

        if let Some(v) = env("ESTATE_REST_URL") {
            self.rest_url = Some(v);
        }
        if let Some(v) = env("ESTATE_API_KEY") {
            self.api_key = Some(v);
        }

        if let Some(v) = env("ESTATE_PAGE_SIZE") {
            self.page_size = v
                .parse()
                .with_context(|| format!("ESTATE_PAGE_SIZE '{v}' is not a page size"))?;
        }
        if let Some(v) = env("ESTATE_POLL_INTERVAL_MS") {
            self.poll_interval_ms = v
                .parse()
                .with_context(|| format!("ESTATE_POLL_INTERVAL_MS '{v}' is not a duration"))?;
        }

        if let Some(v) = env("ESTATE_LOG") {
            self.log_filter = v;
        }
        if let Some(v) = env("ESTATE_ERROR_CATALOG") {
            self.error_catalog = Some(PathBuf::from(v));
        }
        Ok(())
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        let file: FileSettings = toml::from_str(&raw)
            .with_context(|| format!("failed to parse '{}'", path.display()))?;
        settings.apply_file(file);
    }

    settings.apply_env(env)?;
    Ok(settings)
}

pub fn prepare_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    let path = raw_database_url
        .strip_prefix("sqlite:")
        .unwrap_or(raw_database_url);
    format!("sqlite://{}", path.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
