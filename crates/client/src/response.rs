//! Turns a raw HTTP response into a [`Payload`] or an [`ApiError`].

use habitkit_core::{ApiError, Payload};
use reqwest::StatusCode;
use serde_json::{Map, Value};

/// The upstream `{success, data, error?, message?}` wrapper.
#[derive(Debug, Clone, PartialEq)]
struct Envelope {
    success: bool,
    data: Value,
    error: Option<String>,
    message: Option<String>,
}

impl Envelope {
    /// Shape check: an object with a boolean `success`.
    fn from_object(obj: &Map<String, Value>) -> Option<Self> {
        let success = obj.get("success")?.as_bool()?;
        Some(Self {
            success,
            data: obj.get("data").cloned().unwrap_or(Value::Null),
            error: obj.get("error").and_then(Value::as_str).map(str::to_string),
            message: obj.get("message").and_then(Value::as_str).map(str::to_string),
        })
    }
}

/// Classifies a response by status and body.
pub fn classify(status: StatusCode, body: &[u8]) -> Result<Payload, ApiError> {
    if status.is_success() {
        classify_success(body)
    } else {
        Err(classify_failure(status, body))
    }
}

fn classify_success(body: &[u8]) -> Result<Payload, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Payload::Empty);
    }
    let value: Value = serde_json::from_slice(body).map_err(ApiError::decode)?;
    let envelope = match &value {
        Value::Object(obj) => Envelope::from_object(obj),
        _ => None,
    };
    match envelope {
        Some(env) if env.success => Ok(Payload::Wrapped(env.data)),
        Some(env) => Err(ApiError::ApiLogic {
            message: env
                .message
                .or_else(|| env.error.clone())
                .unwrap_or_else(|| "request was not successful".to_string()),
            code: env.error,
        }),
        None => Ok(Payload::Raw(value)),
    }
}

fn classify_failure(status: StatusCode, body: &[u8]) -> ApiError {
    let envelope = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.as_object().and_then(Envelope::from_object));
    let (code, message) = match envelope {
        Some(env) => (env.error, env.message),
        None => (None, None),
    };
    ApiError::HttpStatus {
        status: status.as_u16(),
        code,
        message: message.unwrap_or_else(|| status.to_string()),
    }
}
