use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use shared::{error::RawError, error_map::ErrorMapper};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::{
    paginated::{PageCore, DEFAULT_PAGE_SIZE},
    state::{erase_page_producer, PageState},
};

pub const VISIBILITY_THRESHOLD: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityEntry {
    pub target: String,
    pub intersection_ratio: f64,
}

impl VisibilityEntry {
    pub fn new(target: impl Into<String>, intersection_ratio: f64) -> Self {
        Self {
            target: target.into(),
            intersection_ratio,
        }
    }
}

pub struct InfiniteScrollController<T> {
    core: Arc<PageCore<T>>,
    target: Arc<Mutex<Option<String>>>,
}

impl<T> Clone for InfiniteScrollController<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            target: Arc::clone(&self.target),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> InfiniteScrollController<T> {
    pub fn new<F, Fut, E>(producer: F, page_size: u32) -> Self
    where
        F: Fn(u32, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
        E: Into<RawError> + 'static,
    {
        Self::with_mapper(producer, page_size, ErrorMapper::default())
    }

    pub fn with_default_page_size<F, Fut, E>(producer: F) -> Self
    where
        F: Fn(u32, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
        E: Into<RawError> + 'static,
    {
        Self::new(producer, DEFAULT_PAGE_SIZE)
    }

    pub fn with_mapper<F, Fut, E>(producer: F, page_size: u32, mapper: ErrorMapper) -> Self
    where
        F: Fn(u32, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
        E: Into<RawError> + 'static,
    {
        Self {
            core: Arc::new(PageCore::new(
                erase_page_producer(producer),
                1,
                page_size.max(1),
                mapper,
            )),
            target: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn mount(&self) -> Result<usize, String> {
        self.core.load(1, true).await
    }

    pub fn observe(&self, target: impl Into<String>) {
        let target = target.into();
        debug!(target = %target, "observing sentinel");
        *self.lock_target() = Some(target);
    }

    pub fn unobserve(&self) {
        if let Some(target) = self.lock_target().take() {
            debug!(target = %target, "sentinel released");
        }
    }

    pub fn observed(&self) -> Option<String> {
        self.lock_target().clone()
    }

    pub async fn on_visibility(&self, entry: &VisibilityEntry) -> bool {
        let observed = self.lock_target().as_deref() == Some(entry.target.as_str());
        if !observed || entry.intersection_ratio < VISIBILITY_THRESHOLD {
            return false;
        }
        self.core.advance().await.is_some()
    }

    pub fn snapshot(&self) -> PageState<T> {
        self.core.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PageState<T>> {
        self.core.subscribe()
    }

    pub fn changes(&self) -> WatchStream<PageState<T>> {
        WatchStream::new(self.subscribe())
    }

    fn lock_target(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.target.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/infinite_tests.rs"]
mod tests;
