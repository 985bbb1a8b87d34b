use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use shared::{error::RawError, error_map::ErrorMapper};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use crate::state::{dependencies_changed, erase_producer, Dependency, FetchState, Producer};

pub type SuccessHook<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&str) + Send + Sync>;

pub struct FetchOptions<T> {
    pub immediate: bool,
    pub dependencies: Vec<Dependency>,
    pub on_success: Option<SuccessHook<T>>,
    pub on_error: Option<ErrorHook>,
    pub mapper: ErrorMapper,
}

impl<T> Default for FetchOptions<T> {
    fn default() -> Self {
        Self {
            immediate: true,
            dependencies: Vec::new(),
            on_success: None,
            on_error: None,
            mapper: ErrorMapper::default(),
        }
    }
}

impl<T> FetchOptions<T> {
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn dependencies(mut self, dependencies: impl IntoIterator<Item = Dependency>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    pub fn on_success(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn mapper(mut self, mapper: ErrorMapper) -> Self {
        self.mapper = mapper;
        self
    }
}

pub(crate) struct FetchCore<T> {
    producer: Producer<T>,
    state: watch::Sender<FetchState<T>>,
    on_success: Option<SuccessHook<T>>,
    on_error: Option<ErrorHook>,
    mapper: ErrorMapper,
}

impl<T: Clone + Send + Sync + 'static> FetchCore<T> {
    pub(crate) fn new(
        producer: Producer<T>,
        initial: FetchState<T>,
        on_success: Option<SuccessHook<T>>,
        on_error: Option<ErrorHook>,
        mapper: ErrorMapper,
    ) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            producer,
            state,
            on_success,
            on_error,
            mapper,
        }
    }

    pub(crate) async fn run(&self) -> Result<T, String> {
        self.state.send_modify(FetchState::begin);
        debug!("fetch started");
        match (self.producer)().await {
            Ok(data) => {
                self.state.send_modify(|state| state.succeed(data.clone()));
                debug!("fetch succeeded");
                if let Some(hook) = &self.on_success {
                    hook(&data);
                }
                Ok(data)
            }
            Err(err) => {
                let message = self.mapper.map(&err);
                warn!(error = %err, message = %message, "fetch failed");
                self.state.send_modify(|state| state.fail(message.clone()));
                if let Some(hook) = &self.on_error {
                    hook(&message);
                }
                Err(message)
            }
        }
    }

    pub(crate) fn set_data(&self, data: Option<T>) {
        self.state.send_modify(|state| state.data = data);
    }

    pub(crate) fn snapshot(&self) -> FetchState<T> {
        self.state.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.state.subscribe()
    }
}

pub struct DataFetchController<T> {
    core: Arc<FetchCore<T>>,
    immediate: bool,
    dependencies: Arc<Mutex<Vec<Dependency>>>,
}

impl<T> Clone for DataFetchController<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            immediate: self.immediate,
            dependencies: Arc::clone(&self.dependencies),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> DataFetchController<T> {
    pub fn new<F, Fut, E>(producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<RawError> + 'static,
    {
        Self::with_options(producer, FetchOptions::default())
    }

    pub fn with_options<F, Fut, E>(producer: F, options: FetchOptions<T>) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<RawError> + 'static,
    {
        let FetchOptions {
            immediate,
            dependencies,
            on_success,
            on_error,
            mapper,
        } = options;
        Self {
            core: Arc::new(FetchCore::new(
                erase_producer(producer),
                FetchState::initial(immediate),
                on_success,
                on_error,
                mapper,
            )),
            immediate,
            dependencies: Arc::new(Mutex::new(dependencies)),
        }
    }

    pub async fn mount(&self) {
        if self.immediate {
            let _ = self.core.run().await;
        }
    }

    /// Returns this attempt's outcome; the visible state belongs to whichever
    /// attempt settles last.
    pub async fn fetch(&self) -> Result<T, String> {
        self.core.run().await
    }

    pub async fn refetch(&self) -> Result<T, String> {
        self.fetch().await
    }

    pub async fn update_dependencies(
        &self,
        dependencies: impl IntoIterator<Item = Dependency>,
    ) -> bool {
        let next: Vec<Dependency> = dependencies.into_iter().collect();
        let changed = {
            let mut current = self
                .dependencies
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let changed = dependencies_changed(&current, &next);
            *current = next;
            changed
        };
        if !(changed && self.immediate) {
            return false;
        }
        debug!("dependencies changed, refetching");
        let _ = self.core.run().await;
        true
    }

    pub fn set_data(&self, data: Option<T>) {
        self.core.set_data(data);
    }

    pub fn snapshot(&self) -> FetchState<T> {
        self.core.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.core.subscribe()
    }

    pub fn changes(&self) -> WatchStream<FetchState<T>> {
        WatchStream::new(self.subscribe())
    }
}

#[cfg(test)]
#[path = "tests/fetch_tests.rs"]
mod tests;
