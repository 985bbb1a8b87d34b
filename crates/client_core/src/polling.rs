use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use shared::{error::RawError, error_map::ErrorMapper};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant},
};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

use crate::{
    fetch::{ErrorHook, FetchCore, SuccessHook},
    state::{erase_producer, FetchState},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

pub struct PollingOptions<T> {
    pub interval: Duration,
    pub immediate: bool,
    pub on_success: Option<SuccessHook<T>>,
    pub on_error: Option<ErrorHook>,
    pub mapper: ErrorMapper,
}

impl<T> Default for PollingOptions<T> {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            immediate: true,
            on_success: None,
            on_error: None,
            mapper: ErrorMapper::default(),
        }
    }
}

impl<T> PollingOptions<T> {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
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

/// Re-runs a producer on a fixed period.
///
/// Each tick spawns its own fetch; a slow fetch does not delay the next tick
/// and the last to settle owns the visible state. Dropping the controller
/// stops the ticker but leaves in-flight fetches to finish.
pub struct PollingController<T> {
    core: Arc<FetchCore<T>>,
    interval: Duration,
    immediate: bool,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Clone + Send + Sync + 'static> PollingController<T> {
    pub fn new<F, Fut, E>(producer: F, options: PollingOptions<T>) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<RawError> + 'static,
    {
        let PollingOptions {
            interval,
            immediate,
            on_success,
            on_error,
            mapper,
        } = options;
        Self {
            core: Arc::new(FetchCore::new(
                erase_producer(producer),
                FetchState::default(),
                on_success,
                on_error,
                mapper,
            )),
            // A zero period would spin the ticker.
            interval: interval.max(Duration::from_millis(1)),
            immediate,
            ticker: Mutex::new(None),
        }
    }

    pub fn mount(&self) {
        if self.immediate {
            self.start_polling();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.lock_ticker().is_some()
    }

    pub fn start_polling(&self) -> bool {
        let mut ticker = self.lock_ticker();
        if ticker.is_some() {
            return false;
        }

        let core = Arc::clone(&self.core);
        let period = self.interval;
        let first_tick = if self.immediate {
            Instant::now()
        } else {
            Instant::now() + period
        };
        *ticker = Some(tokio::spawn(async move {
            let mut interval = interval_at(first_tick, period);
            loop {
                interval.tick().await;
                let core = Arc::clone(&core);
                tokio::spawn(async move {
                    let _ = core.run().await;
                });
            }
        }));
        info!(interval_ms = period.as_millis() as u64, "polling started");
        true
    }

    pub fn stop_polling(&self) -> bool {
        match self.lock_ticker().take() {
            Some(handle) => {
                handle.abort();
                info!("polling stopped");
                true
            }
            None => false,
        }
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

impl<T> PollingController<T> {
    fn lock_ticker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Drop for PollingController<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_ticker().take() {
            debug!("polling controller dropped, stopping ticker");
            handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/polling_tests.rs"]
mod tests;
