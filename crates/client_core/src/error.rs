use std::{any::Any, future::Future, panic::AssertUnwindSafe};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use shared::{error::RawError, error_map::ErrorMapper};
use tracing::error;

pub const ERROR_REPORT_TITLE: &str = "An error occurred";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub title: String,
    pub message: String,
    pub can_retry: bool,
}

pub fn log_error(error: &RawError, context: &str) {
    error!(
        context,
        code = error.code().unwrap_or_default(),
        message = error.raw_message().unwrap_or_default(),
        "operation failed"
    );
}

pub fn handle_error(error: impl Into<RawError>, context: Option<&str>) -> ErrorReport {
    handle_error_with(error, context, &ErrorMapper::default())
}

pub fn handle_error_with(
    error: impl Into<RawError>,
    context: Option<&str>,
    mapper: &ErrorMapper,
) -> ErrorReport {
    let error = error.into();
    log_error(&error, context.unwrap_or_default());
    ErrorReport {
        title: ERROR_REPORT_TITLE.to_string(),
        message: mapper.map(&error),
        can_retry: true,
    }
}

pub async fn guarded<T, E, Fut>(
    context: &str,
    future: Fut,
    on_error: Option<&(dyn Fn(&str) + Send + Sync)>,
) -> Option<T>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<RawError>,
{
    guarded_with(context, future, on_error, &ErrorMapper::default()).await
}

pub async fn guarded_with<T, E, Fut>(
    context: &str,
    future: Fut,
    on_error: Option<&(dyn Fn(&str) + Send + Sync)>,
    mapper: &ErrorMapper,
) -> Option<T>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<RawError>,
{
    let failure = match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => return Some(value),
        Ok(Err(err)) => err.into(),
        Err(payload) => RawError::message(panic_message(payload.as_ref())),
    };
    log_error(&failure, context);
    if let Some(callback) = on_error {
        callback(&mapper.map(&failure));
    }
    None
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
