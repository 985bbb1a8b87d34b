use std::{collections::BTreeMap, collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{strip_reserved, EntityRecord, Fields, QueryOptions, RecordId, ID_COLUMN},
    error::{StoreError, StoreResult},
    protocol::{ChangeEvent, SubscriptionHandle},
};
use tokio::sync::RwLock;
use tracing::info;

use crate::{
    changes::{ChangeCallback, ChangeFeed, ChangeHub},
    clock::MonotonicClock,
    query::run_query,
    EntityRepository,
};

#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<HashMap<String, Vec<EntityRecord>>>,
    clock: MonotonicClock,
    changes: Arc<ChangeHub>,
    latency: Option<Duration>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn changes(&self) -> &Arc<ChangeHub> {
        &self.changes
    }

    pub async fn table_len(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(Vec::len)
            .unwrap_or_default()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn build_record(
        &self,
        table: &str,
        taken: impl Fn(&RecordId) -> bool,
        data: Fields,
    ) -> StoreResult<EntityRecord> {
        let id = match data.get(ID_COLUMN) {
            Some(Value::Null) | None => RecordId::generate(),
            Some(raw) => RecordId::from_value(raw).ok_or_else(|| {
                StoreError::InvalidRecord(format!("unsupported id value {raw}"))
            })?,
        };
        if taken(&id) {
            return Err(StoreError::DuplicateKey {
                table: table.to_string(),
                detail: format!("Key (id)=({id}) already exists."),
            });
        }
        Ok(EntityRecord::new(id, strip_reserved(data), self.clock.now()))
    }
}

#[async_trait]
impl EntityRepository for InMemoryRepository {
    async fn create(&self, table: &str, data: Fields) -> StoreResult<EntityRecord> {
        self.simulate_latency().await;
        let record = {
            let mut tables = self.tables.write().await;
            let rows = tables.entry(table.to_string()).or_default();
            let record = self.build_record(table, |id| rows.iter().any(|r| &r.id == id), data)?;
            rows.push(record.clone());
            record
        };
        info!(table, id = %record.id, "record created");
        self.changes
            .publish(&ChangeEvent::inserted(table, record.clone()));
        Ok(record)
    }

    async fn get_by_id(&self, table: &str, id: &RecordId) -> StoreResult<EntityRecord> {
        self.simulate_latency().await;
        self.tables
            .read()
            .await
            .get(table)
            .and_then(|rows| rows.iter().find(|record| &record.id == id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(table, id))
    }

    async fn list(&self, table: &str, options: &QueryOptions) -> StoreResult<Vec<EntityRecord>> {
        self.simulate_latency().await;
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .map(|rows| run_query(rows.iter(), options))
            .unwrap_or_default())
    }

    async fn update(
        &self,
        table: &str,
        id: &RecordId,
        partial: Fields,
    ) -> StoreResult<EntityRecord> {
        self.simulate_latency().await;
        let (old, new) = {
            let mut tables = self.tables.write().await;
            let record = tables
                .get_mut(table)
                .and_then(|rows| rows.iter_mut().find(|record| &record.id == id))
                .ok_or_else(|| StoreError::not_found(table, id))?;
            let old = record.clone();
            record.merge(partial, self.clock.now());
            (old, record.clone())
        };
        info!(table, id = %id, "record updated");
        self.changes
            .publish(&ChangeEvent::updated(table, old, new.clone()));
        Ok(new)
    }

    async fn delete(&self, table: &str, id: &RecordId) -> StoreResult<EntityRecord> {
        self.simulate_latency().await;
        let removed = {
            let mut tables = self.tables.write().await;
            let rows = tables
                .get_mut(table)
                .ok_or_else(|| StoreError::not_found(table, id))?;
            let index = rows
                .iter()
                .position(|record| &record.id == id)
                .ok_or_else(|| StoreError::not_found(table, id))?;
            rows.remove(index)
        };
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
        self.simulate_latency().await;
        let created = {
            let mut tables = self.tables.write().await;
            let existing = tables.entry(table.to_string()).or_default();
            // Build everything first so a bad row leaves the table untouched.
            let mut staged: Vec<EntityRecord> = Vec::with_capacity(rows.len());
            for data in rows {
                let record = self.build_record(
                    table,
                    |id| existing.iter().chain(staged.iter()).any(|r| &r.id == id),
                    data,
                )?;
                staged.push(record);
            }
            existing.extend(staged.iter().cloned());
            staged
        };
        info!(table, count = created.len(), "records batch created");
        for record in &created {
            self.changes
                .publish(&ChangeEvent::inserted(table, record.clone()));
        }
        Ok(created)
    }

    async fn batch_delete(&self, table: &str, ids: &[RecordId]) -> StoreResult<Vec<EntityRecord>> {
        self.simulate_latency().await;
        let removed: Vec<EntityRecord> = {
            let mut tables = self.tables.write().await;
            match tables.get_mut(table) {
                Some(rows) => {
                    let (gone, kept): (Vec<_>, Vec<_>) = rows
                        .drain(..)
                        .partition(|record| ids.contains(&record.id));
                    *rows = kept;
                    gone
                }
                None => Vec::new(),
            }
        };
        info!(table, count = removed.len(), "records batch deleted");
        for record in &removed {
            self.changes
                .publish(&ChangeEvent::deleted(table, record.clone()));
        }
        Ok(removed)
    }
}

impl ChangeFeed for InMemoryRepository {
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

#[cfg(test)]
#[path = "tests/memory_tests.rs"]
mod tests;
