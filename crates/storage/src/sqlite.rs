use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use shared::{
    domain::{
        format_timestamp, strip_reserved, EntityRecord, Fields, QueryOptions, RecordId,
        CREATED_AT_COLUMN, ID_COLUMN, UPDATED_AT_COLUMN,
    },
    error::{StoreError, StoreResult},
    protocol::{ChangeEvent, SubscriptionHandle},
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use tracing::info;

use crate::{
    changes::{ChangeCallback, ChangeFeed, ChangeHub},
    clock::MonotonicClock,
    validate_identifier, EntityRepository,
};

const SELECT_COLUMNS: &str = "id, data, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteRepository {
    pool: Pool<Sqlite>,
    clock: Arc<MonotonicClock>,
    changes: Arc<ChangeHub>,
}

impl SqliteRepository {
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .map_err(backend)?
            .create_if_missing(true);
        // Every in-memory connection is a separate database; keep exactly one alive.
        let pool_options = if database_url.starts_with("sqlite::memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(backend)?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|err| StoreError::Backend(format!("migration failed: {err}")))?;

        Ok(Self {
            pool,
            clock: Arc::new(MonotonicClock::new()),
            changes: Arc::new(ChangeHub::new()),
        })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn changes(&self) -> &Arc<ChangeHub> {
        &self.changes
    }

    pub async fn health_check(&self) -> StoreResult<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|err| StoreError::Backend(format!("sqlite ping failed: {err}")))?;
        Ok(())
    }

    fn prepare_insert(&self, data: Fields) -> StoreResult<EntityRecord> {
        let id = match data.get(ID_COLUMN) {
            Some(Value::Null) | None => RecordId::generate(),
            Some(raw) => RecordId::from_value(raw).ok_or_else(|| {
                StoreError::InvalidRecord(format!("unsupported id value {raw}"))
            })?,
        };
        Ok(EntityRecord::new(id, strip_reserved(data), self.clock.now()))
    }
}

async fn insert_record<'e, E>(executor: E, table: &str, record: &EntityRecord) -> StoreResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO entity_records (table_name, id, data, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(table)
    .bind(record.id.as_str())
    .bind(encode_fields(&record.fields)?)
    .bind(format_timestamp(&record.created_at))
    .bind(format_timestamp(&record.updated_at))
    .execute(executor)
    .await
    .map_err(|err| map_sqlx_error(table, err))?;
    Ok(())
}

async fn delete_record<'e, E>(
    executor: E,
    table: &str,
    id: &RecordId,
) -> StoreResult<Option<EntityRecord>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!(
        "DELETE FROM entity_records WHERE table_name = ? AND id = ? RETURNING {SELECT_COLUMNS}"
    ))
    .bind(table)
    .bind(id.as_str())
    .fetch_optional(executor)
    .await
    .map_err(|err| map_sqlx_error(table, err))?;
    row.as_ref().map(decode_row).transpose()
}

#[async_trait]
impl EntityRepository for SqliteRepository {
    async fn create(&self, table: &str, data: Fields) -> StoreResult<EntityRecord> {
        validate_identifier("table", table)?;
        let record = self.prepare_insert(data)?;
        insert_record(&self.pool, table, &record).await?;
        info!(table, id = %record.id, "record created");
        self.changes
            .publish(&ChangeEvent::inserted(table, record.clone()));
        Ok(record)
    }

    async fn get_by_id(&self, table: &str, id: &RecordId) -> StoreResult<EntityRecord> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM entity_records WHERE table_name = ? AND id = ?"
        ))
        .bind(table)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| map_sqlx_error(table, err))?;
        match row {
            Some(row) => decode_row(&row),
            None => Err(StoreError::not_found(table, id)),
        }
    }

    async fn list(&self, table: &str, options: &QueryOptions) -> StoreResult<Vec<EntityRecord>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {SELECT_COLUMNS} FROM entity_records WHERE table_name = "
        ));
        query.push_bind(table);

        for (column, value) in options.active_filters() {
            validate_identifier("column", column)?;
            query.push(" AND ");
            push_column(&mut query, column);
            if is_row_column(column) {
                query.push(" = ");
                query.push_bind(scalar_text(value));
            } else {
                query.push(" = json_extract(");
                query.push_bind(value.to_string());
                query.push(", '$')");
            }
        }

        if !options.order_by.is_empty() {
            validate_identifier("column", &options.order_by)?;
            let direction = if options.ascending { "ASC" } else { "DESC" };
            // `(x IS NULL)` first: nulls last ascending, first descending.
            query.push(" ORDER BY (");
            push_column(&mut query, &options.order_by);
            query.push(format!(" IS NULL) {direction}, "));
            push_column(&mut query, &options.order_by);
            query.push(format!(" {direction}, rowid {direction}"));
        }

        let window = options.window();
        query.push(" LIMIT ");
        query.push_bind(window.len.map(|len| len as i64).unwrap_or(-1));
        query.push(" OFFSET ");
        query.push_bind(window.offset as i64);

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|err| map_sqlx_error(table, err))?;
        rows.iter().map(decode_row).collect()
    }

    async fn update(
        &self,
        table: &str,
        id: &RecordId,
        partial: Fields,
    ) -> StoreResult<EntityRecord> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM entity_records WHERE table_name = ? AND id = ?"
        ))
        .bind(table)
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| map_sqlx_error(table, err))?;
        let Some(row) = row else {
            return Err(StoreError::not_found(table, id));
        };

        let old = decode_row(&row)?;
        let mut new = old.clone();
        new.merge(partial, self.clock.now());

        sqlx::query(
            "UPDATE entity_records SET data = ?, updated_at = ? WHERE table_name = ? AND id = ?",
        )
        .bind(encode_fields(&new.fields)?)
        .bind(format_timestamp(&new.updated_at))
        .bind(table)
        .bind(id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|err| map_sqlx_error(table, err))?;
        tx.commit().await.map_err(backend)?;

        info!(table, id = %id, "record updated");
        self.changes
            .publish(&ChangeEvent::updated(table, old, new.clone()));
        Ok(new)
    }

    async fn delete(&self, table: &str, id: &RecordId) -> StoreResult<EntityRecord> {
        let removed = delete_record(&self.pool, table, id)
            .await?
            .ok_or_else(|| StoreError::not_found(table, id))?;
        info!(table, id = %id, "record deleted");
        self.changes
            .publish(&ChangeEvent::deleted(table, removed.clone()));
        Ok(removed)
    }

    async fn batch_create(
        &self,
        table: &str,
        rows: Vec<Fields>,
    ) -> StoreResult<Vec<EntityRecord>> {
        validate_identifier("table", table)?;
        let records = rows
            .into_iter()
            .map(|data| self.prepare_insert(data))
            .collect::<StoreResult<Vec<_>>>()?;

        // Dropping the transaction on an early return rolls the batch back.
        let mut tx = self.pool.begin().await.map_err(backend)?;
        for record in &records {
            insert_record(&mut *tx, table, record).await?;
        }
        tx.commit().await.map_err(backend)?;

        info!(table, count = records.len(), "records batch created");
        for record in &records {
            self.changes
                .publish(&ChangeEvent::inserted(table, record.clone()));
        }
        Ok(records)
    }

    async fn batch_delete(&self, table: &str, ids: &[RecordId]) -> StoreResult<Vec<EntityRecord>> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = delete_record(&mut *tx, table, id).await? {
                removed.push(record);
            }
        }
        tx.commit().await.map_err(backend)?;

        info!(table, count = removed.len(), "records batch deleted");
        for record in &removed {
            self.changes
                .publish(&ChangeEvent::deleted(table, record.clone()));
        }
        Ok(removed)
    }
}

impl ChangeFeed for SqliteRepository {
    fn subscribe(
        &self,
        table: &str,
        filters: BTreeMap<String, Value>,
        callback: ChangeCallback,
    ) -> SubscriptionHandle {
        self.changes.subscribe(table, filters, callback)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.changes.unsubscribe(handle)
    }
}

fn is_row_column(column: &str) -> bool {
    matches!(column, ID_COLUMN | CREATED_AT_COLUMN | UPDATED_AT_COLUMN)
}

fn push_column(query: &mut QueryBuilder<'_, Sqlite>, column: &str) {
    if is_row_column(column) {
        query.push(column);
    } else {
        query.push(format!("json_extract(data, '$.\"{column}\"')"));
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn encode_fields(fields: &Fields) -> StoreResult<String> {
    serde_json::to_string(fields)
        .map_err(|err| StoreError::InvalidRecord(format!("failed to encode fields: {err}")))
}

fn decode_row(row: &SqliteRow) -> StoreResult<EntityRecord> {
    let id: String = row.try_get("id").map_err(backend)?;
    let data: String = row.try_get("data").map_err(backend)?;
    let created_at: String = row.try_get("created_at").map_err(backend)?;
    let updated_at: String = row.try_get("updated_at").map_err(backend)?;

    let fields = match serde_json::from_str::<Value>(&data) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => {
            return Err(StoreError::InvalidRecord(format!(
                "stored data for {id} is not an object: {other}"
            )))
        }
        Err(err) => {
            return Err(StoreError::InvalidRecord(format!(
                "stored data for {id} is not JSON: {err}"
            )))
        }
    };

    Ok(EntityRecord {
        id: RecordId(id),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        fields,
    })
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| StoreError::InvalidRecord(format!("bad stored timestamp '{raw}': {err}")))
}

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn map_sqlx_error(table: &str, err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return StoreError::DuplicateKey {
                table: table.to_string(),
                detail: db_err.message().to_string(),
            };
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::ForeignKeyViolation {
                table: table.to_string(),
                detail: db_err.message().to_string(),
            };
        }
    }
    backend(err)
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> StoreResult<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };
    let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) else {
        return Ok(());
    };
    fs::create_dir_all(parent).map_err(|err| {
        StoreError::Backend(format!(
            "failed to create parent directory '{}' for database url '{database_url}': {err}",
            parent.display()
        ))
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() {
        return None;
    }
    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/sqlite_tests.rs"]
mod tests;
