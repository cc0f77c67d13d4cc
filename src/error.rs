//! Gateway error types and the uniform error envelope.
//!
//! [`GatewayError`] is the central error type for the gateway. Configuration
//! variants abort startup; request-level variants are converted into a
//! structured error body and always answered with HTTP 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::codec::CodecError;
use crate::domain::BrokerError;
use crate::routing::MethodSet;

/// Structured error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "kind": "invalid_method",
///     "message": "invalid HTTP method - accepted methods: [GET]",
///     "details": { "acceptedMethods": ["GET"] }
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code, kind tag and message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Stable machine-readable error kind.
    pub kind: &'static str,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Gateway error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category             |
/// |-----------|----------------------|
/// | 1000–1999 | Request              |
/// | 2000–2999 | Configuration        |
/// | 3000–3999 | Server / lifecycle   |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// An alias declaration did not have the `[METHOD] ALIAS` shape.
    #[error("invalid alias format: {0:?}")]
    InvalidAlias(String),

    /// The reverse-proxy target is not a usable URL.
    #[error("invalid reverse proxy target {target:?}: {reason}")]
    InvalidProxyTarget {
        /// The configured target string.
        target: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Settings could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The request method is not accepted by the bound action.
    #[error("invalid HTTP method - accepted methods: [{accepted}]")]
    InvalidMethod {
        /// Methods the handler accepts.
        accepted: MethodSet,
    },

    /// Request form or body could not be turned into call parameters.
    #[error("invalid request params: {0}")]
    InvalidParams(String),

    /// The remote action call returned an error.
    #[error("call to {action} failed: {source}")]
    CallFailed {
        /// Full action name.
        action: String,
        /// Error reported by the broker.
        #[source]
        source: BrokerError,
    },

    /// The route authorizer rejected the request.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Encoding or decoding through the codec failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was being bound.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The lifecycle task is no longer running.
    #[error("server lifecycle is closed")]
    LifecycleClosed,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidMethod { .. } => 1001,
            Self::InvalidParams(_) => 1002,
            Self::CallFailed { .. } => 1003,
            Self::Unauthorized(_) => 1004,
            Self::Codec(_) => 1005,
            Self::InvalidAlias(_) => 2001,
            Self::InvalidProxyTarget { .. } => 2002,
            Self::Config(_) => 2003,
            Self::Bind { .. } => 3001,
            Self::LifecycleClosed => 3002,
            Self::Internal(_) => 3000,
        }
    }

    /// Returns the stable kind tag for this variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidMethod { .. } => "invalid_method",
            Self::InvalidParams(_) => "invalid_params",
            Self::CallFailed { .. } => "call_failed",
            Self::Unauthorized(_) => "unauthorized",
            Self::Codec(_) => "codec",
            Self::InvalidAlias(_) => "invalid_alias",
            Self::InvalidProxyTarget { .. } => "invalid_proxy_target",
            Self::Config(_) => "config",
            Self::Bind { .. } => "bind",
            Self::LifecycleClosed => "lifecycle_closed",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// The gateway answers every error with 500 so that clients see one
    /// envelope regardless of the failure kind.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Builds the structured error body for this error.
    #[must_use]
    pub fn to_response_body(&self) -> ErrorResponse {
        let details = match self {
            Self::InvalidMethod { accepted } => Some(serde_json::json!({
                "acceptedMethods": accepted.names(),
            })),
            Self::CallFailed { source, .. } => source.data().cloned(),
            _ => None,
        };
        ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                kind: self.kind(),
                message: self.to_string(),
                details,
            },
        }
    }

    /// Returns the error body as a generic structured value, ready to be
    /// written through a codec.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self.to_response_body()).unwrap_or_default()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = axum::Json(self.to_response_body()).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::routing::HttpMethod;

    #[test]
    fn invalid_method_lists_accepted_methods() {
        let err = GatewayError::InvalidMethod {
            accepted: MethodSet::only(HttpMethod::Get),
        };
        let value = err.to_value();
        assert_eq!(value["error"]["kind"], "invalid_method");
        assert_eq!(value["error"]["code"], 1001);
        assert_eq!(
            value["error"]["details"]["acceptedMethods"],
            serde_json::json!(["GET"])
        );
    }

    #[test]
    fn call_failure_carries_broker_data() {
        let err = GatewayError::CallFailed {
            action: "math.div".to_string(),
            source: BrokerError::Action {
                message: "division by zero".to_string(),
                data: Some(serde_json::json!({ "divisor": 0 })),
            },
        };
        let value = err.to_value();
        assert_eq!(value["error"]["kind"], "call_failed");
        assert_eq!(value["error"]["details"]["divisor"], 0);
        let Some(message) = value["error"]["message"].as_str() else {
            panic!("message should be a string");
        };
        assert!(message.contains("math.div"));
        assert!(message.contains("division by zero"));
    }

    #[test]
    fn every_error_is_a_server_error() {
        let errors = [
            GatewayError::InvalidParams("bad".to_string()),
            GatewayError::Unauthorized("nope".to_string()),
            GatewayError::LifecycleClosed,
        ];
        for err in errors {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn into_response_uses_500() {
        let response = GatewayError::Internal("boom".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
