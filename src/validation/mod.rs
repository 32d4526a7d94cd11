use bigdecimal::BigDecimal;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub const COUNTERPARTY_MAX_LEN: usize = 32;
pub const PY_REF_MAX_LEN: usize = 128;
pub const CURRENCY_LEN: usize = 3;
pub const AMOUNT_INPUT_MAX_LEN: usize = 64;
pub const DESCRIPTION_MAX_LEN: usize = 160;
pub const AMOUNT_MAX_INTEGER_DIGITS: i64 = 18;
pub const AMOUNT_MAX_SCALE: i64 = 6;

/// Caller-supplied request fields, as received from the router layer.
pub type Details = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "is required"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Reads a scalar detail as text. Numbers are accepted so that `"amount": 1000`
/// and `"amount": "1000"` behave the same.
pub fn detail_string(details: &Details, field: &str) -> Option<String> {
    let raw = match details.get(field)? {
        Value::String(s) => sanitize_string(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };

    if raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

pub fn require_detail(
    details: &Details,
    field: &'static str,
    max_len: usize,
) -> Result<String, ValidationError> {
    let value = detail_string(details, field).unwrap_or_default();
    validate_required(field, &value)?;
    validate_max_len(field, &value, max_len)?;
    Ok(value)
}

pub fn parse_amount(raw: &str) -> Result<BigDecimal, ValidationError> {
    validate_max_len("amount", raw, AMOUNT_INPUT_MAX_LEN)?;
    let raw = raw.trim();
    if raw.contains(['e', 'E']) {
        return Err(ValidationError::new("amount", "must be written without an exponent"));
    }
    let amount = BigDecimal::from_str(raw)
        .map_err(|_| ValidationError::new("amount", "must be a decimal number"))?;

    if amount <= BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    // Bounded so the value can always be rendered back to plain text.
    let (digits, scale) = amount.as_bigint_and_exponent();
    let digit_count = digits.to_string().trim_start_matches('-').len() as i64;
    if scale > AMOUNT_MAX_SCALE {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} decimal places", AMOUNT_MAX_SCALE),
        ));
    }
    if digit_count - scale > AMOUNT_MAX_INTEGER_DIGITS {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} integer digits", AMOUNT_MAX_INTEGER_DIGITS),
        ));
    }

    Ok(amount)
}

pub fn validate_currency(currency: &str) -> ValidationResult {
    if currency.len() != CURRENCY_LEN || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            "currency",
            "must be a three-letter uppercase ISO code",
        ));
    }

    Ok(())
}
