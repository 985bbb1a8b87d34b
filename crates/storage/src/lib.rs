use async_trait::async_trait;

use shared::domain::{EntityRecord, Fields, QueryOptions, RecordId};
use shared::error::StoreResult;

mod changes;
mod clock;
mod memory;
pub mod query;
mod rest;
mod services;
mod sqlite;

pub use changes::{ChangeCallback, ChangeFeed, ChangeHub};
pub use clock::MonotonicClock;
pub use memory::InMemoryRepository;
pub use rest::{RestConfig, RestRepository};
pub use services::HoldingsService;
pub use sqlite::SqliteRepository;

#[async_trait]
pub trait EntityRepository: Send + Sync {
    async fn create(&self, table: &str, data: Fields) -> StoreResult<EntityRecord>;

    async fn get_by_id(&self, table: &str, id: &RecordId) -> StoreResult<EntityRecord>;

    /// Never fails for an unknown table; the result is simply empty.
    async fn list(&self, table: &str, options: &QueryOptions) -> StoreResult<Vec<EntityRecord>>;

    async fn update(&self, table: &str, id: &RecordId, partial: Fields)
        -> StoreResult<EntityRecord>;

    async fn delete(&self, table: &str, id: &RecordId) -> StoreResult<EntityRecord>;

    async fn batch_create(&self, table: &str, rows: Vec<Fields>)
        -> StoreResult<Vec<EntityRecord>>;

    async fn batch_delete(&self, table: &str, ids: &[RecordId]) -> StoreResult<Vec<EntityRecord>>;
}

#[async_trait]
impl<R> EntityRepository for std::sync::Arc<R>
where
    R: EntityRepository + ?Sized,
{
    async fn create(&self, table: &str, data: Fields) -> StoreResult<EntityRecord> {
        (**self).create(table, data).await
    }

    async fn get_by_id(&self, table: &str, id: &RecordId) -> StoreResult<EntityRecord> {
        (**self).get_by_id(table, id).await
    }

    async fn list(&self, table: &str, options: &QueryOptions) -> StoreResult<Vec<EntityRecord>> {
        (**self).list(table, options).await
    }

    async fn update(
        &self,
        table: &str,
        id: &RecordId,
        partial: Fields,
    ) -> StoreResult<EntityRecord> {
        (**self).update(table, id, partial).await
    }

    async fn delete(&self, table: &str, id: &RecordId) -> StoreResult<EntityRecord> {
        (**self).delete(table, id).await
    }

    async fn batch_create(
        &self,
        table: &str,
        rows: Vec<Fields>,
    ) -> StoreResult<Vec<EntityRecord>> {
        (**self).batch_create(table, rows).await
    }

    async fn batch_delete(&self, table: &str, ids: &[RecordId]) -> StoreResult<Vec<EntityRecord>> {
        (**self).batch_delete(table, ids).await
    }
}

pub(crate) fn validate_identifier(kind: &str, name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(shared::error::StoreError::InvalidQuery(format!(
            "invalid {kind} name '{name}'"
        )))
    }
}
