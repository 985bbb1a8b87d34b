use std::{collections::BTreeMap, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use shared::{
    domain::Fields,
    error::RawError,
    error_map::ErrorMapper,
    validation::{combine, Validator},
};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::error::log_error;

pub type SubmitHandler =
    Arc<dyn Fn(Fields) -> BoxFuture<'static, Result<(), RawError>> + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormState {
    pub values: Fields,
    pub errors: BTreeMap<String, Option<String>>,
    pub touched: BTreeMap<String, bool>,
    pub is_submitting: bool,
}

impl FormState {
    fn initial(values: Fields) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.values().all(Option::is_none)
    }

    pub fn error(&self, field: &str) -> Option<&str> {
        self.errors.get(field).and_then(|error| error.as_deref())
    }

    pub fn is_touched(&self, field: &str) -> bool {
        self.touched.get(field).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Invalid,
    Submitted,
    Failed(String),
}

pub struct FormBuilder {
    initial: Fields,
    schema: BTreeMap<String, Validator>,
    on_submit: Option<SubmitHandler>,
    mapper: ErrorMapper,
}

impl FormBuilder {
    pub fn field(mut self, name: impl Into<String>, validators: Vec<Validator>) -> Self {
        self.schema.insert(name.into(), combine(validators));
        self
    }

    pub fn on_submit<F, Fut, E>(mut self, handler: F) -> Self
    where
        F: Fn(Fields) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<RawError> + 'static,
    {
        self.on_submit = Some(Arc::new(move |values| {
            handler(values)
                .map(|result| result.map_err(Into::into))
                .boxed()
        }));
        self
    }

    pub fn mapper(mut self, mapper: ErrorMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn build(self) -> FormController {
        let (state, _) = watch::channel(FormState::initial(self.initial.clone()));
        FormController {
            inner: Arc::new(FormInner {
                initial: self.initial,
                schema: self.schema,
                on_submit: self.on_submit,
                mapper: self.mapper,
                state,
            }),
        }
    }
}

struct FormInner {
    initial: Fields,
    schema: BTreeMap<String, Validator>,
    on_submit: Option<SubmitHandler>,
    mapper: ErrorMapper,
    state: watch::Sender<FormState>,
}

#[derive(Clone)]
pub struct FormController {
    inner: Arc<FormInner>,
}

impl FormController {
    pub fn builder(initial: Fields) -> FormBuilder {
        FormBuilder {
            initial,
            schema: BTreeMap::new(),
            on_submit: None,
            mapper: ErrorMapper::default(),
        }
    }

    pub fn handle_change(&self, field: &str, value: impl Into<Value>) {
        let value = value.into();
        self.inner.state.send_modify(|state| {
            state.values.insert(field.to_string(), value);
            if let Some(error) = state.errors.get_mut(field) {
                *error = None;
            }
        });
    }

    pub fn handle_blur(&self, field: &str) -> Option<String> {
        let mut result = None;
        self.inner.state.send_modify(|state| {
            state.touched.insert(field.to_string(), true);
            if let Some(validator) = self.inner.schema.get(field) {
                let error = validator.check(state.values.get(field).unwrap_or(&Value::Null));
                result = error.clone();
                state.errors.insert(field.to_string(), error);
            }
        });
        result
    }

    pub fn validate_form(&self) -> bool {
        let mut valid = true;
        self.inner.state.send_modify(|state| {
            state.errors = self.run_schema(&state.values);
            valid = state.is_valid();
        });
        valid
    }

    pub async fn handle_submit(&self) -> SubmitOutcome {
        let mut values = Fields::new();
        let mut valid = true;
        self.inner.state.send_modify(|state| {
            let fields: Vec<String> = state
                .values
                .keys()
                .chain(self.inner.schema.keys())
                .cloned()
                .collect();
            for field in fields {
                state.touched.insert(field, true);
            }
            state.errors = self.run_schema(&state.values);
            valid = state.is_valid();
            if valid {
                state.is_submitting = true;
                values = state.values.clone();
            }
        });
        if !valid {
            debug!("form submit blocked by validation");
            return SubmitOutcome::Invalid;
        }

        let _submitting = SubmittingGuard(&self.inner.state);
        let Some(handler) = &self.inner.on_submit else {
            return SubmitOutcome::Submitted;
        };
        match handler(values).await {
            Ok(()) => {
                debug!("form submitted");
                SubmitOutcome::Submitted
            }
            Err(err) => {
                log_error(&err, "form submission");
                SubmitOutcome::Failed(self.inner.mapper.map(&err))
            }
        }
    }

    pub fn reset_form(&self) {
        self.inner
            .state
            .send_replace(FormState::initial(self.inner.initial.clone()));
    }

    pub fn set_field_value(&self, field: &str, value: impl Into<Value>) {
        let value = value.into();
        self.inner.state.send_modify(|state| {
            state.values.insert(field.to_string(), value);
        });
    }

    pub fn set_field_error(&self, field: &str, error: Option<String>) {
        self.inner.state.send_modify(|state| {
            state.errors.insert(field.to_string(), error);
        });
    }

    pub fn get_field_props(&self, field: &str) -> FieldProps {
        let state = self.inner.state.borrow();
        let value = match state.values.get(field) {
            None | Some(Value::Null) => Value::String(String::new()),
            Some(value) => value.clone(),
        };
        FieldProps {
            name: field.to_string(),
            value,
            error: state.error(field).map(str::to_string),
            touched: state.is_touched(field),
            form: self.clone(),
        }
    }

    pub fn values(&self) -> Fields {
        self.inner.state.borrow().values.clone()
    }

    pub fn is_valid(&self) -> bool {
        self.inner.state.borrow().is_valid()
    }

    pub fn snapshot(&self) -> FormState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FormState> {
        self.inner.state.subscribe()
    }

    pub fn changes(&self) -> WatchStream<FormState> {
        WatchStream::new(self.subscribe())
    }

    fn run_schema(&self, values: &Fields) -> BTreeMap<String, Option<String>> {
        self.inner
            .schema
            .iter()
            .filter_map(|(field, validator)| {
                validator
                    .check(values.get(field).unwrap_or(&Value::Null))
                    .map(|error| (field.clone(), Some(error)))
            })
            .collect()
    }
}

/// Clears `is_submitting` however the submit future ends, including drop.
struct SubmittingGuard<'a>(&'a watch::Sender<FormState>);

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|state| state.is_submitting = false);
    }
}

#[derive(Clone)]
pub struct FieldProps {
    pub name: String,
    pub value: Value,
    pub error: Option<String>,
    pub touched: bool,
    form: FormController,
}

impl FieldProps {
    pub fn on_change(&self, value: impl Into<Value>) {
        self.form.handle_change(&self.name, value);
    }

    pub fn on_blur(&self) -> Option<String> {
        self.form.handle_blur(&self.name)
    }
}

impl std::fmt::Debug for FieldProps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldProps")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("error", &self.error)
            .field("touched", &self.touched)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
