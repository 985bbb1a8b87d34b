use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use shared::{
    domain::{
        format_timestamp, strip_reserved, EntityRecord, Fields, QueryOptions, RecordId,
        CREATED_AT_COLUMN, ID_COLUMN, UPDATED_AT_COLUMN,
    },
    error::{StoreError, StoreResult, DUPLICATE_KEY_CODE, FOREIGN_KEY_CODE, NOT_FOUND_CODE},
};
use tracing::{debug, info};
use url::Url;

use crate::{clock::MonotonicClock, validate_identifier, EntityRepository};

/// Single-row responses: PostgREST answers 406 + PGRST116 when nothing matched.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const UNDEFINED_TABLE_CODES: [&str; 2] = ["42P01", "PGRST205"];

#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RestRepository {
    http: Client,
    base_url: Url,
    api_key: String,
    clock: std::sync::Arc<MonotonicClock>,
}

#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl RestRepository {
    pub fn new(config: RestConfig) -> StoreResult<Self> {
        let mut base_url = Url::parse(&config.base_url).map_err(|err| {
            StoreError::InvalidQuery(format!("invalid REST url '{}': {err}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidQuery(format!(
                "REST url '{}' cannot carry table paths",
                config.base_url
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| StoreError::Backend(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            base_url,
            api_key: config.api_key,
            clock: std::sync::Arc::new(MonotonicClock::new()),
        })
    }

    fn request(&self, method: Method, table: &str) -> StoreResult<RequestBuilder> {
        validate_identifier("table", table)?;
        let url = self
            .base_url
            .join(table)
            .map_err(|err| StoreError::InvalidQuery(format!("bad table path '{table}': {err}")))?;
        Ok(self
            .http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key))
    }

    async fn execute(
        &self,
        table: &str,
        id: Option<&RecordId>,
        request: RequestBuilder,
    ) -> StoreResult<Value> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(remote_error(table, id, status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|err| StoreError::InvalidRecord(format!("undecodable response body: {err}")))
    }

    async fn single(
        &self,
        table: &str,
        id: Option<&RecordId>,
        request: RequestBuilder,
    ) -> StoreResult<EntityRecord> {
        let request = request.header(header::ACCEPT, SINGLE_OBJECT);
        EntityRecord::from_row(self.execute(table, id, request).await?)
    }

    async fn many(&self, table: &str, request: RequestBuilder) -> StoreResult<Vec<EntityRecord>> {
        match self.execute(table, None, request).await? {
            Value::Array(rows) => rows.into_iter().map(EntityRecord::from_row).collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(StoreError::InvalidRecord(format!(
                "expected a JSON array of rows, got {other}"
            ))),
        }
    }

    fn insert_row(&self, data: Fields) -> StoreResult<Fields> {
        let id = match data.get(ID_COLUMN) {
            Some(Value::Null) | None => None,
            Some(raw) => Some(RecordId::from_value(raw).ok_or_else(|| {
                StoreError::InvalidRecord(format!("unsupported id value {raw}"))
            })?),
        };
        let stamp = Value::String(format_timestamp(&self.clock.now()));
        let mut row = strip_reserved(data);
        if let Some(id) = id {
            row.insert(ID_COLUMN.into(), Value::String(id.0));
        }
        row.insert(CREATED_AT_COLUMN.into(), stamp.clone());
        row.insert(UPDATED_AT_COLUMN.into(), stamp);
        Ok(row)
    }
}

#[async_trait]
impl EntityRepository for RestRepository {
    async fn create(&self, table: &str, data: Fields) -> StoreResult<EntityRecord> {
        let row = self.insert_row(data)?;
        let request = self
            .request(Method::POST, table)?
            .header("Prefer", "return=representation")
            .json(&row);
        let record = self.single(table, None, request).await?;
        info!(table, id = %record.id, "record created");
        Ok(record)
    }

    async fn get_by_id(&self, table: &str, id: &RecordId) -> StoreResult<EntityRecord> {
        let request = self
            .request(Method::GET, table)?
            .query(&[("select", "*".to_string()), (ID_COLUMN, eq(id.as_str()))]);
        self.single(table, Some(id), request).await
    }

    async fn list(&self, table: &str, options: &QueryOptions) -> StoreResult<Vec<EntityRecord>> {
        let mut params: Vec<(String, String)> = vec![("select".into(), "*".into())];
        for (column, value) in options.active_filters() {
            validate_identifier("column", column)?;
            params.push((column.to_string(), eq(&scalar_text(value))));
        }
        if !options.order_by.is_empty() {
            validate_identifier("column", &options.order_by)?;
            let direction = if options.ascending { "asc" } else { "desc" };
            params.push(("order".into(), format!("{}.{direction}", options.order_by)));
        }
        let window = options.window();
        if let Some(len) = window.len {
            params.push(("limit".into(), len.to_string()));
        }
        if window.offset > 0 {
            params.push(("offset".into(), window.offset.to_string()));
        }

        let request = self.request(Method::GET, table)?.query(&params);
        match self.many(table, request).await {
            Err(StoreError::Remote { code: Some(code), .. })
                if UNDEFINED_TABLE_CODES.contains(&code.as_str()) =>
            {
                debug!(table, code = %code, "unknown table listed as empty");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    async fn update(
        &self,
        table: &str,
        id: &RecordId,
        partial: Fields,
    ) -> StoreResult<EntityRecord> {
        let mut body = strip_reserved(partial);
        body.insert(
            UPDATED_AT_COLUMN.into(),
            Value::String(format_timestamp(&self.clock.now())),
        );
        let request = self
            .request(Method::PATCH, table)?
            .query(&[(ID_COLUMN, eq(id.as_str()))])
            .header("Prefer", "return=representation")
            .json(&body);
        let record = self.single(table, Some(id), request).await?;
        info!(table, id = %id, "record updated");
        Ok(record)
    }

    async fn delete(&self, table: &str, id: &RecordId) -> StoreResult<EntityRecord> {
        let request = self
            .request(Method::DELETE, table)?
            .query(&[(ID_COLUMN, eq(id.as_str()))])
            .header("Prefer", "return=representation");
        let record = self.single(table, Some(id), request).await?;
        info!(table, id = %id, "record deleted");
        Ok(record)
    }

    async fn batch_create(
        &self,
        table: &str,
        rows: Vec<Fields>,
    ) -> StoreResult<Vec<EntityRecord>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let rows = rows
            .into_iter()
            .map(|data| self.insert_row(data))
            .collect::<StoreResult<Vec<_>>>()?;
        let request = self
            .request(Method::POST, table)?
            .header("Prefer", "return=representation")
            .json(&rows);
        let created = self.many(table, request).await?;
        info!(table, count = created.len(), "records batch created");
        Ok(created)
    }

    async fn batch_delete(&self, table: &str, ids: &[RecordId]) -> StoreResult<Vec<EntityRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = self
            .request(Method::DELETE, table)?
            .query(&[(ID_COLUMN, in_list(ids))])
            .header("Prefer", "return=representation");
        let removed = self.many(table, request).await?;
        info!(table, count = removed.len(), "records batch deleted");
        Ok(removed)
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

fn in_list(ids: &[RecordId]) -> String {
    let quoted = ids
        .iter()
        .map(|id| format!("\"{}\"", id.as_str().replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({quoted})")
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout(err.to_string())
    } else {
        StoreError::Network(err.to_string())
    }
}

fn remote_error(table: &str, id: Option<&RecordId>, status: StatusCode, body: &str) -> StoreError {
    let parsed: PostgrestError = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .clone()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("request failed with status {status}"));
    let detail = match parsed.details.as_deref() {
        Some(details) if !details.is_empty() => format!("{message} ({details})"),
        _ => message.clone(),
    };

    match parsed.code.as_deref() {
        Some(NOT_FOUND_CODE) => StoreError::not_found(
            table,
            id.map(RecordId::as_str).unwrap_or_default(),
        ),
        Some(DUPLICATE_KEY_CODE) => StoreError::DuplicateKey {
            table: table.to_string(),
            detail,
        },
        Some(FOREIGN_KEY_CODE) => StoreError::ForeignKeyViolation {
            table: table.to_string(),
            detail,
        },
        _ if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT => {
            StoreError::Timeout(message)
        }
        code => StoreError::Remote {
            code: code.map(str::to_string),
            message,
        },
    }
}

#[cfg(test)]
#[path = "tests/rest_tests.rs"]
mod tests;
