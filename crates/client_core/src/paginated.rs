use std::{future::Future, sync::Arc};

use shared::{error::RawError, error_map::ErrorMapper};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use crate::state::{erase_page_producer, PageProducer, PageState};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone)]
pub struct PaginationOptions {
    pub initial_page: u32,
    pub page_size: u32,
    pub mapper: ErrorMapper,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            initial_page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            mapper: ErrorMapper::default(),
        }
    }
}

impl PaginationOptions {
    pub fn initial_page(mut self, page: u32) -> Self {
        self.initial_page = page.max(1);
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn mapper(mut self, mapper: ErrorMapper) -> Self {
        self.mapper = mapper;
        self
    }
}

pub(crate) struct PageCore<T> {
    producer: PageProducer<T>,
    state: watch::Sender<PageState<T>>,
    page_size: u32,
    mapper: ErrorMapper,
}

impl<T: Clone + Send + Sync + 'static> PageCore<T> {
    pub(crate) fn new(
        producer: PageProducer<T>,
        first_page: u32,
        page_size: u32,
        mapper: ErrorMapper,
    ) -> Self {
        let (state, _) = watch::channel(PageState::new(first_page));
        Self {
            producer,
            state,
            page_size,
            mapper,
        }
    }

    pub(crate) async fn load(&self, page: u32, append: bool) -> Result<usize, String> {
        self.state.send_modify(|state| {
            state.page = page;
            state.begin();
        });
        self.settle(page, append).await
    }

    /// Claims the next page if nothing is loading and more data is expected.
    /// The check and the claim happen under one state lock, so concurrent
    /// callers cannot both advance.
    pub(crate) async fn advance(&self) -> Option<Result<usize, String>> {
        let mut claimed = None;
        self.state.send_if_modified(|state| {
            if state.loading || !state.has_more {
                return false;
            }
            state.page += 1;
            state.begin();
            claimed = Some(state.page);
            true
        });
        let page = claimed?;
        Some(self.settle(page, true).await)
    }

    async fn settle(&self, page: u32, append: bool) -> Result<usize, String> {
        debug!(page, append, page_size = self.page_size, "page fetch started");
        match (self.producer)(page, self.page_size).await {
            Ok(batch) => {
                let received = batch.len();
                self.state
                    .send_modify(|state| state.receive(batch, self.page_size, append));
                debug!(page, received, "page fetch succeeded");
                Ok(received)
            }
            Err(err) => {
                let message = self.mapper.map(&err);
                warn!(page, error = %err, message = %message, "page fetch failed");
                self.state.send_modify(|state| state.fail(message.clone()));
                Err(message)
            }
        }
    }

    pub(crate) fn snapshot(&self) -> PageState<T> {
        self.state.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<PageState<T>> {
        self.state.subscribe()
    }
}

pub struct PaginatedFetchController<T> {
    core: Arc<PageCore<T>>,
    initial_page: u32,
}

impl<T> Clone for PaginatedFetchController<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            initial_page: self.initial_page,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> PaginatedFetchController<T> {
    pub fn new<F, Fut, E>(producer: F, options: PaginationOptions) -> Self
    where
        F: Fn(u32, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
        E: Into<RawError> + 'static,
    {
        Self {
            core: Arc::new(PageCore::new(
                erase_page_producer(producer),
                options.initial_page,
                options.page_size,
                options.mapper,
            )),
            initial_page: options.initial_page,
        }
    }

    pub async fn mount(&self) -> Result<usize, String> {
        self.core.load(self.initial_page, false).await
    }

    pub async fn load_more(&self) -> Option<Result<usize, String>> {
        self.core.advance().await
    }

    pub async fn refresh(&self) -> Result<usize, String> {
        self.core.load(self.initial_page, false).await
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
}

#[cfg(test)]
#[path = "tests/paginated_tests.rs"]
mod tests;
