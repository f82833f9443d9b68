//! Shape-classified success bodies.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

/// Successful response body, classified once by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `data` of a `{success: true, data}` envelope.
    Wrapped(Value),
    /// JSON that did not look like an envelope; returned as-is.
    Raw(Value),
    /// 2xx with no body.
    Empty,
}

impl Payload {
    /// True for a body-less success.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Borrow the JSON value; `None` for [`Payload::Empty`].
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Wrapped(v) | Self::Raw(v) => Some(v),
            Self::Empty => None,
        }
    }

    /// Unwraps to a JSON value, mapping `Empty` to `null`.
    pub fn into_value(self) -> Value {
        match self {
            Self::Wrapped(v) | Self::Raw(v) => v,
            Self::Empty => Value::Null,
        }
    }

    /// Deserializes the payload into `T`, reporting shape mismatches as
    /// [`ApiError::Decode`].
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        serde_json::from_value(self.into_value()).map_err(ApiError::decode)
    }
}
