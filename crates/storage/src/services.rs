use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{json, Value};
use shared::{
    domain::{format_timestamp, tables, EntityRecord, Fields, QueryOptions, RecordId},
    error::StoreResult,
};
use tracing::info;

use crate::EntityRepository;

const NOTIFICATION_LIMIT: u32 = 50;

#[derive(Debug, Clone)]
pub struct HoldingsService<R> {
    repository: R,
}

impl<R: EntityRepository> HoldingsService<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub async fn user_properties(
        &self,
        user_id: &str,
        extra_filters: BTreeMap<String, Value>,
    ) -> StoreResult<Vec<EntityRecord>> {
        let options = QueryOptions::new()
            .filter("user_id", user_id)
            .filters(extra_filters)
            .order_by("created_at", false);
        self.repository
            .list(tables::USER_PROPERTIES, &options)
            .await
    }

    pub async fn property_price_history(&self, property_id: &str) -> StoreResult<Vec<EntityRecord>> {
        let options = QueryOptions::new()
            .filter("property_id", property_id)
            .order_by("date", true);
        self.repository
            .list(tables::PROPERTY_PRICES, &options)
            .await
    }

    pub async fn regional_statistics(
        &self,
        region_code: Option<&str>,
    ) -> StoreResult<Option<EntityRecord>> {
        let mut options = QueryOptions::new().order_by("date", false).limit(1);
        if let Some(code) = region_code.filter(|code| !code.is_empty()) {
            options = options.filter("region_code", code);
        }
        let rows = self
            .repository
            .list(tables::REGIONAL_STATISTICS, &options)
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn user_alerts(
        &self,
        user_id: &str,
        active_only: bool,
    ) -> StoreResult<Vec<EntityRecord>> {
        let mut options = QueryOptions::new()
            .filter("user_id", user_id)
            .order_by("created_at", false);
        if active_only {
            options = options.filter("is_active", true);
        }
        self.repository.list(tables::USER_ALERTS, &options).await
    }

    pub async fn user_wishlist(&self, user_id: &str) -> StoreResult<Vec<EntityRecord>> {
        let options = QueryOptions::new()
            .filter("user_id", user_id)
            .order_by("created_at", false);
        self.repository.list(tables::USER_WISHLIST, &options).await
    }

    pub async fn user_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
    ) -> StoreResult<Vec<EntityRecord>> {
        let mut options = QueryOptions::new()
            .filter("user_id", user_id)
            .order_by("created_at", false)
            .limit(NOTIFICATION_LIMIT);
        if unread_only {
            options = options.filter("is_read", false);
        }
        self.repository.list(tables::NOTIFICATIONS, &options).await
    }

    pub async fn mark_notification_read(&self, id: &RecordId) -> StoreResult<EntityRecord> {
        self.repository
            .update(tables::NOTIFICATIONS, id, read_marker())
            .await
    }

    pub async fn mark_all_notifications_read(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<EntityRecord>> {
        let options = QueryOptions::new()
            .filter("user_id", user_id)
            .filter("is_read", false)
            .order_by("created_at", true);
        let unread = self
            .repository
            .list(tables::NOTIFICATIONS, &options)
            .await?;

        let mut updated = Vec::with_capacity(unread.len());
        for notification in unread {
            updated.push(
                self.repository
                    .update(tables::NOTIFICATIONS, &notification.id, read_marker())
                    .await?,
            );
        }
        info!(user_id, count = updated.len(), "notifications marked read");
        Ok(updated)
    }
}

fn read_marker() -> Fields {
    let mut fields = Fields::new();
    fields.insert("is_read".into(), json!(true));
    fields.insert("read_at".into(), json!(format_timestamp(&Utc::now())));
    fields
}

#[cfg(test)]
#[path = "tests/services_tests.rs"]
mod tests;
