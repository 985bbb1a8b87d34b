use std::{borrow::Cow, fmt, sync::Arc, sync::LazyLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_ADDRESS_LEN: usize = 5;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^01[0-9]-?[0-9]{3,4}-?[0-9]{4}$").expect("phone pattern compiles"));

type ValidatorFn = dyn Fn(&Value) -> Option<String> + Send + Sync;

#[derive(Clone)]
pub struct Validator(Arc<ValidatorFn>);

impl Validator {
    pub fn new(check: impl Fn(&Value) -> Option<String> + Send + Sync + 'static) -> Self {
        Self(Arc::new(check))
    }

    pub fn check(&self, value: &Value) -> Option<String> {
        (self.0)(value)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator(..)")
    }
}

pub fn combine(validators: impl IntoIterator<Item = Validator>) -> Validator {
    let chain: Vec<Validator> = validators.into_iter().collect();
    Validator::new(move |value| chain.iter().find_map(|validator| validator.check(value)))
}

pub fn required(field_name: &str) -> Validator {
    let field_name = field_name.to_string();
    Validator::new(move |value| validate_required(value, &field_name))
}

pub fn email() -> Validator {
    Validator::new(validate_email)
}

pub fn password() -> Validator {
    Validator::new(validate_password)
}

pub fn phone() -> Validator {
    Validator::new(validate_phone)
}

pub fn length(min: Option<usize>, max: Option<usize>, field_name: &str) -> Validator {
    let field_name = field_name.to_string();
    Validator::new(move |value| validate_length(value, min, max, &field_name))
}

pub fn range(min: Option<f64>, max: Option<f64>, field_name: &str) -> Validator {
    let field_name = field_name.to_string();
    Validator::new(move |value| validate_range(value, min, max, &field_name))
}

pub fn address() -> Validator {
    Validator::new(validate_address)
}

pub fn price(min: f64) -> Validator {
    Validator::new(move |value| validate_price(value, min))
}

pub fn date() -> Validator {
    Validator::new(validate_date)
}

pub fn validate_required(value: &Value, field_name: &str) -> Option<String> {
    let blank = match value {
        Value::String(text) => text.trim().is_empty(),
        other => is_falsy(other),
    };
    blank.then(|| format!("Please enter {field_name}"))
}

pub fn validate_email(value: &Value) -> Option<String> {
    let Some(text) = present_text(value) else {
        return Some("Please enter your email".into());
    };
    if !EMAIL_PATTERN.is_match(&text) {
        return Some("Please enter a valid email address".into());
    }
    None
}

pub fn validate_password(value: &Value) -> Option<String> {
    let Some(text) = present_text(value) else {
        return Some("Please enter your password".into());
    };
    if text.chars().count() < MIN_PASSWORD_LEN {
        return Some(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        ));
    }
    None
}

pub fn validate_phone(value: &Value) -> Option<String> {
    let text = present_text(value)?;
    let digits = text.replace('-', "");
    if !PHONE_PATTERN.is_match(&digits) {
        return Some("Please enter a valid phone number (e.g. 010-1234-5678)".into());
    }
    None
}

pub fn validate_length(
    value: &Value,
    min: Option<usize>,
    max: Option<usize>,
    field_name: &str,
) -> Option<String> {
    let text = present_text(value)?;
    let len = text.chars().count();
    if let Some(min) = min.filter(|min| *min > 0) {
        if len < min {
            return Some(format!("{field_name} must be at least {min} characters"));
        }
    }
    if let Some(max) = max.filter(|max| *max > 0) {
        if len > max {
            return Some(format!("{field_name} must be at most {max} characters"));
        }
    }
    None
}

pub fn validate_range(
    value: &Value,
    min: Option<f64>,
    max: Option<f64>,
    field_name: &str,
) -> Option<String> {
    if value.is_null() || value.as_str() == Some("") {
        return None;
    }
    let Some(number) = as_number(value) else {
        return Some(format!("{field_name} must be a number"));
    };
    if let Some(min) = min {
        if number < min {
            return Some(format!(
                "{field_name} must be at least {}",
                format_amount(min)
            ));
        }
    }
    if let Some(max) = max {
        if number > max {
            return Some(format!(
                "{field_name} must be at most {}",
                format_amount(max)
            ));
        }
    }
    None
}

pub fn validate_address(value: &Value) -> Option<String> {
    let Some(text) = present_text(value) else {
        return Some("Please enter an address".into());
    };
    if text.chars().count() < MIN_ADDRESS_LEN {
        return Some(format!(
            "Address must be at least {MIN_ADDRESS_LEN} characters"
        ));
    }
    None
}

/// Zero is a legitimate price; only absent values count as missing.
pub fn validate_price(value: &Value, min: f64) -> Option<String> {
    let missing = match value {
        Value::Number(_) => false,
        other => is_falsy(other),
    };
    if missing {
        return Some("Please enter a price".into());
    }
    let Some(number) = as_number(value) else {
        return Some("Please enter a valid price".into());
    };
    if number < min {
        return Some(format!("Price must be at least {}", format_amount(min)));
    }
    None
}

pub fn validate_date(value: &Value) -> Option<String> {
    if is_falsy(value) {
        return Some("Please select a date".into());
    }
    let parsable = match value {
        Value::String(text) => parse_date(text.trim()),
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .is_some(),
        _ => false,
    };
    (!parsable).then(|| "Please select a valid date".to_string())
}

fn parse_date(text: &str) -> bool {
    DateTime::parse_from_rfc3339(text).is_ok()
        || NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M").is_ok()
}

pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn present_text(value: &Value) -> Option<Cow<'_, str>> {
    if is_falsy(value) {
        return None;
    }
    match value {
        Value::String(text) => Some(Cow::Borrowed(text.as_str())),
        Value::Number(number) => Some(Cow::Owned(number.to_string())),
        Value::Bool(flag) => Some(Cow::Owned(flag.to_string())),
        _ => None,
    }
}

pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                Some(0.0)
            } else {
                text.parse::<f64>().ok().filter(|number| number.is_finite())
            }
        }
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::Array(_) | Value::Object(_) => None,
    }
}

pub fn format_amount(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let amount = (amount.abs() * 1000.0).round() / 1000.0;
    let whole = amount.trunc() as u64;
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let fraction = format!("{:.3}", amount.fract());
    let fraction = fraction.trim_start_matches('0').trim_end_matches('0');
    if fraction == "." || fraction.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}{fraction}")
    }
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;
