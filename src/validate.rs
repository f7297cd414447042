//! Input validation for incoming chat requests.
//!
//! The payload must be a JSON object carrying a string `message` that is
//! non-empty after trimming. Anything else is rejected before any outbound
//! call is made.

use serde_json::Value;

use crate::error::{PipelineError, PipelineResult};

/// Name of the required request field.
pub const MESSAGE_FIELD: &str = "message";

/// Validates a raw request body and returns the trimmed query.
pub fn validate_payload(body: &[u8]) -> PipelineResult<String> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(PipelineError::Validation("request body is empty".to_string()));
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| PipelineError::Validation(format!("request body is not valid JSON: {}", e)))?;

    validate_value(&value)
}

/// Validates an already-parsed JSON payload.
pub fn validate_value(value: &Value) -> PipelineResult<String> {
    let object = value
        .as_object()
        .ok_or_else(|| {
            PipelineError::Validation("request body must be a JSON object".to_string())
        })?;

    match object.get(MESSAGE_FIELD) {
        None | Some(Value::Null) => Err(PipelineError::Validation(format!(
            "'{}' is required",
            MESSAGE_FIELD
        ))),
        Some(Value::String(s)) => validate_message(s),
        Some(_) => Err(PipelineError::Validation(format!(
            "'{}' must be a string",
            MESSAGE_FIELD
        ))),
    }
}

/// Validates a bare message string and returns it trimmed.
pub fn validate_message(message: &str) -> PipelineResult<String> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::Validation(format!(
            "'{}' must not be empty",
            MESSAGE_FIELD
        )));
    }
    Ok(trimmed.to_string())
}
