//! Action request handling.
//!
//! One request, one call:
//!
//! ```text
//! method check → authorization → params → call → encode
//! ```
//!
//! Every failure along the way is answered with HTTP 500 and the error
//! envelope encoded through the configured codec. Success is always 200.
//!
//! Request bodies are buffered whole with no size cap; put a
//! `tower_http::limit` layer in front of the router if one is needed.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::{Instrument, Level};
use uuid::Uuid;

use super::params::{RawParams, collect_params};
use crate::app_state::AppState;
use crate::codec::Codec;
use crate::config::LogLevel;
use crate::error::GatewayError;
use crate::routing::{BoundHandler, PathParams};

/// Handles one request for a bound action.
pub async fn handle(
    state: &AppState,
    bound: Arc<BoundHandler>,
    path_params: PathParams,
    request: Request<Body>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "action",
        request_id = %request_id,
        action = %bound.action(),
        method = %request.method(),
    );
    async move {
        match call_action(state, &bound, path_params, request).await {
            Ok(result) => encode_response(state.codec.as_ref(), StatusCode::OK, &result),
            Err(e) => {
                tracing::warn!(error = %e, "action request failed");
                error_response(state.codec.as_ref(), &e)
            }
        }
    }
    .instrument(span)
    .await
}

async fn call_action(
    state: &AppState,
    bound: &BoundHandler,
    path_params: PathParams,
    request: Request<Body>,
) -> Result<Value, GatewayError> {
    let accepted = bound.accepted_methods();
    if !accepted.accepts(request.method()) {
        return Err(GatewayError::InvalidMethod { accepted });
    }

    if bound.requires_authorization() {
        match &state.authorizer {
            Some(authorizer) => authorizer.authorize(bound.action(), request.headers()).await?,
            None => tracing::debug!("route requires authorization but no authorizer is installed"),
        }
    }

    let (parts, body) = request.into_parts();
    let body = to_bytes(body, usize::MAX)
        .await
        .map_err(|e| GatewayError::InvalidParams(e.to_string()))?;
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let raw = RawParams {
        query: parts.uri.query(),
        content_type,
        body: &body,
    };
    let params = collect_params(state.codec.as_ref(), raw, path_params)?;
    if let Some(level) = state.logging.request_params {
        log_value(level, "call params", &params);
    }

    let action = bound.action().as_str();
    let result = state
        .invoker
        .call(action, params)
        .await
        .map_err(|source| GatewayError::CallFailed {
            action: action.to_string(),
            source,
        })?;
    if let Some(level) = state.logging.response_data {
        log_value(level, "call result", &result);
    }
    Ok(result)
}

/// Encodes `value` with `codec` and writes it with `status`.
pub fn encode_response(codec: &dyn Codec, status: StatusCode, value: &Value) -> Response {
    match codec.encode(value) {
        Ok(bytes) => (status, [(header::CONTENT_TYPE, codec.content_type())], bytes).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode response");
            GatewayError::from(e).into_response()
        }
    }
}

/// Writes the error envelope for `err` through `codec`.
pub fn error_response(codec: &dyn Codec, err: &GatewayError) -> Response {
    encode_response(codec, err.status_code(), &err.to_value())
}

fn log_value(level: LogLevel, message: &str, value: &Value) {
    match level {
        LogLevel::Trace => tracing::event!(Level::TRACE, data = %value, "{message}"),
        LogLevel::Debug => tracing::event!(Level::DEBUG, data = %value, "{message}"),
        LogLevel::Info => tracing::event!(Level::INFO, data = %value, "{message}"),
        LogLevel::Warn => tracing::event!(Level::WARN, data = %value, "{message}"),
        LogLevel::Error => tracing::event!(Level::ERROR, data = %value, "{message}"),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use async_trait::async_trait;
    use axum::http::{HeaderMap, Method};
    use serde_json::json;

    use super::*;
    use crate::app_state::{Authorizer, DataLogging, GatewayContext};
    use crate::domain::{ActionName, BrokerError, LocalBroker, LocalService};
    use crate::routing::{AliasSpec, Dispatcher};

    #[derive(Debug)]
    struct DenyAll;

    #[async_trait]
    impl Authorizer for DenyAll {
        async fn authorize(&self, action: &ActionName, _headers: &HeaderMap) -> Result<(), GatewayError> {
            Err(GatewayError::Unauthorized(format!("{action} is closed")))
        }
    }

    async fn state() -> AppState {
        let broker = Arc::new(LocalBroker::new());
        let service = LocalService::new("math")
            .action("add", |params: Value| async move {
                let a: i64 = params["a"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0);
                let b: i64 = params["b"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0);
                Ok(json!({ "sum": a + b }))
            })
            .action("echo", |params: Value| async move { Ok(params) })
            .action("fail", |_| async move {
                Err(BrokerError::Action {
                    message: "boom".to_string(),
                    data: Some(json!({ "retry": false })),
                })
            });
        let Ok(()) = broker.register(service).await else {
            panic!("register should succeed");
        };
        let context = GatewayContext::new(Arc::clone(&broker), broker);
        AppState::new(&context, Dispatcher::default(), DataLogging::default())
    }

    fn bound(alias: Option<&str>, action: &str, authorization: bool) -> Arc<BoundHandler> {
        let alias = alias.map(|a| {
            let Ok(spec) = AliasSpec::parse(a) else {
                panic!("bad alias {a}");
            };
            spec
        });
        let Some(action) = ActionName::parse(action) else {
            panic!("bad action {action}");
        };
        Arc::new(BoundHandler::new("/", alias, action, authorization))
    }

    fn request(method: Method, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap_or_default()
    }

    async fn body_json(response: Response) -> Value {
        let Ok(bytes) = to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body should be readable");
        };
        let Ok(value) = serde_json::from_slice(&bytes) else {
            panic!("body should be JSON");
        };
        value
    }

    #[tokio::test]
    async fn query_params_reach_the_call() {
        let state = state().await;
        let response = handle(
            &state,
            bound(None, "math.add", false),
            Vec::new(),
            request(Method::GET, "/math/add?a=1&b=2", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "sum": 3 }));
    }

    #[tokio::test]
    async fn json_body_is_decoded_when_no_form_values() {
        let state = state().await;
        let response = handle(
            &state,
            bound(None, "math.echo", false),
            vec![("id".to_string(), "7".to_string())],
            request(Method::POST, "/math/echo", r#"{"x": [1, 2]}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "x": [1, 2], "id": "7" }));
    }

    #[tokio::test]
    async fn disallowed_method_is_500_with_accepted_list() {
        let state = state().await;
        let response = handle(
            &state,
            bound(Some("GET sum"), "math.add", false),
            Vec::new(),
            request(Method::POST, "/sum", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "invalid_method");
        assert_eq!(body["error"]["details"]["acceptedMethods"], json!(["GET"]));
    }

    #[tokio::test]
    async fn methods_outside_the_four_are_rejected() {
        let state = state().await;
        let response = handle(
            &state,
            bound(None, "math.add", false),
            Vec::new(),
            request(Method::PATCH, "/math/add", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn malformed_body_is_500_without_calling() {
        let state = state().await;
        let response = handle(
            &state,
            bound(None, "math.fail", false),
            Vec::new(),
            request(Method::POST, "/math/fail", "{ nope"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        // A call would have produced `call_failed`.
        assert_eq!(body["error"]["kind"], "codec");
    }

    #[tokio::test]
    async fn call_failure_is_500_with_error_data() {
        let state = state().await;
        let response = handle(
            &state,
            bound(None, "math.fail", false),
            Vec::new(),
            request(Method::GET, "/math/fail", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "call_failed");
        assert_eq!(body["error"]["details"], json!({ "retry": false }));
    }

    #[tokio::test]
    async fn unknown_action_is_500() {
        let state = state().await;
        let response = handle(
            &state,
            bound(None, "math.mul", false),
            Vec::new(),
            request(Method::GET, "/math/mul", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn authorizer_is_consulted_for_protected_routes() {
        let mut state = state().await;
        state.authorizer = Some(Arc::new(DenyAll));

        let open = handle(
            &state,
            bound(None, "math.add", false),
            Vec::new(),
            request(Method::GET, "/math/add?a=1&b=1", ""),
        )
        .await;
        assert_eq!(open.status(), StatusCode::OK);

        let closed = handle(
            &state,
            bound(None, "math.add", true),
            Vec::new(),
            request(Method::GET, "/math/add?a=1&b=1", ""),
        )
        .await;
        assert_eq!(closed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(closed).await["error"]["kind"], "unauthorized");
    }

    #[tokio::test]
    async fn protected_route_without_authorizer_still_calls() {
        let state = state().await;
        let response = handle(
            &state,
            bound(None, "math.add", true),
            Vec::new(),
            request(Method::GET, "/math/add?a=2&b=2", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
