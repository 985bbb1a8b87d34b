use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use shared::validation::{combine, Validator};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldState {
    pub value: Value,
    pub error: Option<String>,
    pub touched: bool,
}

#[derive(Clone)]
pub struct FormFieldController {
    initial: Value,
    validator: Option<Validator>,
    state: Arc<watch::Sender<FieldState>>,
}

impl FormFieldController {
    pub fn new(initial: impl Into<Value>, validators: Vec<Validator>) -> Self {
        let initial = initial.into();
        let validator = (!validators.is_empty()).then(|| combine(validators));
        let (state, _) = watch::channel(FieldState {
            value: initial.clone(),
            error: None,
            touched: false,
        });
        Self {
            initial,
            validator,
            state: Arc::new(state),
        }
    }

    pub fn value(&self) -> Value {
        self.state.borrow().value.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    pub fn touched(&self) -> bool {
        self.state.borrow().touched
    }

    pub fn is_valid(&self) -> bool {
        self.state.borrow().error.is_none()
    }

    pub fn handle_change(&self, value: impl Into<Value>) {
        let value = value.into();
        self.state.send_modify(|state| {
            state.value = value;
            state.error = None;
        });
    }

    pub fn handle_blur(&self) -> bool {
        self.state.send_modify(|state| state.touched = true);
        self.validate()
    }

    pub fn validate(&self) -> bool {
        let Some(validator) = &self.validator else {
            return true;
        };
        let mut valid = true;
        self.state.send_modify(|state| {
            state.error = validator.check(&state.value);
            valid = state.error.is_none();
        });
        valid
    }

    pub fn reset(&self) {
        self.state.send_replace(FieldState {
            value: self.initial.clone(),
            error: None,
            touched: false,
        });
    }

    pub fn set_value(&self, value: impl Into<Value>) {
        let value = value.into();
        self.state.send_modify(|state| state.value = value);
    }

    pub fn set_error(&self, error: Option<String>) {
        self.state.send_modify(|state| state.error = error);
    }

    pub fn snapshot(&self) -> FieldState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FieldState> {
        self.state.subscribe()
    }

    pub fn changes(&self) -> WatchStream<FieldState> {
        WatchStream::new(self.subscribe())
    }
}

#[cfg(test)]
#[path = "tests/field_tests.rs"]
mod tests;
