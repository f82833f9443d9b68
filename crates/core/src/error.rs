//! Failure taxonomy for upstream calls.

use serde::{Deserialize, Serialize};

/// Coarse classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// Request never produced a response.
    Network,
    /// Non-2xx status.
    HttpStatus,
    /// 2xx with `success: false`.
    ApiLogicError,
    /// Body could not be decoded.
    Decode,
}

/// Any non-success outcome of an upstream call.
///
/// Produced by the request client for every failed call; callers decide
/// whether it is fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Transport failure: timeout, refused connection, DNS, truncated body.
    #[error("network error: {message}")]
    Network {
        /// Transport error text.
        message: String,
    },

    /// Non-2xx response. `code`/`message` come from the error envelope when
    /// the body carried one.
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        /// Response status code.
        status: u16,
        /// Upstream error code from the envelope.
        code: Option<String>,
        /// Envelope message, or the status line.
        message: String,
    },

    /// 2xx response whose envelope says `success: false`.
    #[error("API error{}: {message}", code.as_deref().map(|c| format!(" {c}")).unwrap_or_default())]
    ApiLogic {
        /// Upstream error code, when present.
        code: Option<String>,
        /// Upstream message.
        message: String,
    },

    /// 2xx response that is not valid JSON, or data of an unexpected shape.
    #[error("decode error: {message}")]
    Decode {
        /// Parser error text.
        message: String,
    },
}

impl ApiError {
    /// Wraps a transport error.
    pub fn network<E: std::fmt::Display>(e: E) -> Self {
        Self::Network {
            message: e.to_string(),
        }
    }

    /// Wraps a deserialization error.
    pub fn decode<E: std::fmt::Display>(e: E) -> Self {
        Self::Decode {
            message: e.to_string(),
        }
    }

    /// Coarse kind, for callers that branch on category only.
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::Network { .. } => ApiErrorKind::Network,
            Self::HttpStatus { .. } => ApiErrorKind::HttpStatus,
            Self::ApiLogic { .. } => ApiErrorKind::ApiLogicError,
            Self::Decode { .. } => ApiErrorKind::Decode,
        }
    }

    /// HTTP status, only for [`ApiError::HttpStatus`].
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Upstream error code (e.g. `NotFound`, `NotAuthorized`) when known.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::HttpStatus { code, .. } | Self::ApiLogic { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Human-readable message, whatever the variant.
    pub fn message(&self) -> &str {
        match self {
            Self::Network { message }
            | Self::HttpStatus { message, .. }
            | Self::ApiLogic { message, .. }
            | Self::Decode { message } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_and_code() {
        let e = ApiError::HttpStatus {
            status: 404,
            code: Some("NotFound".into()),
            message: "Task not found.".into(),
        };
        assert_eq!(e.to_string(), "HTTP 404: Task not found.");
        assert_eq!(e.status_code(), Some(404));
        assert_eq!(e.code(), Some("NotFound"));
        assert_eq!(e.kind(), ApiErrorKind::HttpStatus);

        let e = ApiError::ApiLogic {
            code: Some("BadRequest".into()),
            message: "nope".into(),
        };
        assert_eq!(e.to_string(), "API error BadRequest: nope");

        let e = ApiError::ApiLogic {
            code: None,
            message: "nope".into(),
        };
        assert_eq!(e.to_string(), "API error: nope");
    }
}
