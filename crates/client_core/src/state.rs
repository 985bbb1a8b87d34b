use std::{future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use shared::error::RawError;

pub(crate) type Producer<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, RawError>> + Send + Sync>;

pub(crate) type PageProducer<T> =
    Arc<dyn Fn(u32, u32) -> BoxFuture<'static, Result<Vec<T>, RawError>> + Send + Sync>;

pub(crate) fn erase_producer<T, F, Fut, E>(producer: F) -> Producer<T>
where
    T: 'static,
    E: Into<RawError> + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Arc::new(move || producer().map(|result| result.map_err(Into::into)).boxed())
}

pub(crate) fn erase_page_producer<T, F, Fut, E>(producer: F) -> PageProducer<T>
where
    T: 'static,
    E: Into<RawError> + 'static,
    F: Fn(u32, u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
{
    Arc::new(move |page, page_size| {
        producer(page, page_size)
            .map(|result| result.map_err(Into::into))
            .boxed()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Idle,
    Loading,
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

impl<T> FetchState<T> {
    pub(crate) fn initial(loading: bool) -> Self {
        Self {
            loading,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> FetchPhase {
        if self.loading {
            FetchPhase::Loading
        } else if self.error.is_some() {
            FetchPhase::Failure
        } else if self.data.is_some() {
            FetchPhase::Success
        } else {
            FetchPhase::Idle
        }
    }

    pub(crate) fn begin(&mut self) {
        self.loading = true;
        self.error = None;
    }

    pub(crate) fn succeed(&mut self, data: T) {
        self.data = Some(data);
        self.loading = false;
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.error = Some(message);
        self.loading = false;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageState<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub has_more: bool,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> PageState<T> {
    pub(crate) fn new(page: u32) -> Self {
        Self {
            items: Vec::new(),
            page,
            has_more: true,
            loading: false,
            error: None,
        }
    }

    pub(crate) fn begin(&mut self) {
        self.loading = true;
        self.error = None;
    }

    /// A full page suggests more data; an exact multiple costs one empty fetch.
    pub(crate) fn receive(&mut self, batch: Vec<T>, page_size: u32, append: bool) {
        self.has_more = batch.len() == page_size as usize;
        if append {
            self.items.extend(batch);
        } else {
            self.items = batch;
        }
        self.loading = false;
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.error = Some(message);
        self.loading = false;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dependency {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

pub fn dependencies_changed(previous: &[Dependency], next: &[Dependency]) -> bool {
    previous.len() != next.len() || previous.iter().zip(next).any(|(a, b)| a != b)
}

impl From<bool> for Dependency {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Dependency {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Dependency {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for Dependency {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for Dependency {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Dependency {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Dependency {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Dependency>> From<Option<T>> for Dependency {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
