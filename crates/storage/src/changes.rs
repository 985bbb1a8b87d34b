use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use serde_json::Value;
use shared::protocol::{render_channel_filter, ChangeEvent, SubscriptionHandle};
use tracing::debug;

use crate::query::matches_filters;

pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

pub trait ChangeFeed: Send + Sync {
    fn subscribe(
        &self,
        table: &str,
        filters: BTreeMap<String, Value>,
        callback: ChangeCallback,
    ) -> SubscriptionHandle;

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool;
}

struct Subscriber {
    table: String,
    filters: BTreeMap<String, Value>,
    callback: ChangeCallback,
}

#[derive(Default)]
pub struct ChangeHub {
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<SubscriptionHandle, Subscriber>>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    pub fn publish(&self, event: &ChangeEvent) {
        let targets: Vec<ChangeCallback> = {
            let subscribers = self.lock();
            subscribers
                .values()
                .filter(|subscriber| subscriber.table == event.table)
                .filter(|subscriber| {
                    event
                        .record()
                        .is_some_and(|record| matches_filters(record, &subscriber.filters))
                })
                .map(|subscriber| Arc::clone(&subscriber.callback))
                .collect()
        };
        for callback in targets {
            callback(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<SubscriptionHandle, Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChangeFeed for ChangeHub {
    fn subscribe(
        &self,
        table: &str,
        filters: BTreeMap<String, Value>,
        callback: ChangeCallback,
    ) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::SeqCst));
        debug!(
            table,
            filter = %render_channel_filter(&filters),
            handle = handle.0,
            "change feed subscribed"
        );
        self.lock().insert(
            handle,
            Subscriber {
                table: table.to_string(),
                filters,
                callback,
            },
        );
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let removed = self.lock().remove(&handle).is_some();
        debug!(handle = handle.0, removed, "change feed unsubscribed");
        removed
    }
}
