//! HTTP layer: action handling, parameter extraction, reverse proxy and
//! router composition.
//!
//! Every built router has a single fallback route. The fallback resolves the
//! request path through the build's [`Dispatcher`](crate::routing::Dispatcher);
//! unmatched paths go to the reverse proxy when it owns them and otherwise
//! answer 404.

pub mod handler;
pub mod params;
pub mod proxy;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Builds the router for one rebuild.
pub fn build_router(state: AppState, cors: bool) -> Router {
    let router = Router::new()
        .fallback(dispatch)
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    if let Some((bound, params)) = state.dispatcher.resolve(request.uri().path()) {
        return handler::handle(&state, bound, params, request).await;
    }
    if let Some(proxy) = &state.proxy
        && proxy.owns(request.uri().path())
    {
        return proxy.forward(request).await;
    }
    tracing::debug!(path = %request.uri().path(), "no action bound");
    StatusCode::NOT_FOUND.into_response()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use axum::body::to_bytes;
    use axum::http::{Method, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::app_state::{DataLogging, GatewayContext};
    use crate::config::{ReverseProxyOverrides, ReverseProxySettings, RouteConfig};
    use crate::domain::{LocalBroker, LocalService, ServiceDescriptor};
    use crate::routing::{Dispatcher, Route, RouteTableBuilder};

    async fn context() -> GatewayContext {
        let broker = Arc::new(LocalBroker::new());
        let math = LocalService::new("math").action("add", |params: Value| async move {
            let a: i64 = params["a"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0);
            let b: i64 = params["b"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0);
            Ok(json!({ "sum": a + b }))
        });
        let users = LocalService::new("users")
            .action("get", |params: Value| async move { Ok(json!({ "id": params["id"] })) });
        for service in [math, users] {
            let Ok(()) = broker.register(service).await else {
                panic!("register should succeed");
            };
        }
        GatewayContext::new(Arc::clone(&broker), broker)
    }

    fn dispatcher(routes: Vec<RouteConfig>, prefix: &str) -> Dispatcher {
        let routes: Vec<Route> = routes
            .iter()
            .map(|config| {
                let Ok(route) = Route::from_config(config) else {
                    panic!("route should validate");
                };
                route
            })
            .collect();
        let listing = vec![
            ServiceDescriptor::new("math", ["add"]),
            ServiceDescriptor::new("users", ["get"]),
        ];
        Dispatcher::new(RouteTableBuilder::new(routes.into()).build(&listing), prefix)
    }

    async fn send(router: Router, method: Method, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::empty())
            .unwrap_or_default();
        let Ok(response) = router.oneshot(request).await else {
            panic!("router is infallible");
        };
        let status = response.status();
        let Ok(bytes) = to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body should be readable");
        };
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn default_settings_expose_dotted_paths() {
        let context = context().await;
        let state = AppState::new(
            &context,
            dispatcher(vec![RouteConfig::default()], "/"),
            DataLogging::default(),
        );
        let (status, body) = send(build_router(state, false), Method::GET, "/math/add?a=1&b=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "sum": 3 }));
    }

    #[tokio::test]
    async fn unmapped_path_is_404() {
        let context = context().await;
        let state = AppState::new(
            &context,
            dispatcher(vec![RouteConfig::default()], "/"),
            DataLogging::default(),
        );
        let (status, _) = send(build_router(state, false), Method::GET, "/math/mul").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn alias_path_params_are_passed_to_the_call() {
        let context = context().await;
        let route = RouteConfig {
            path: "/v1".to_string(),
            aliases: vec![("GET users/{id}".to_string(), "users.get".to_string())],
            ..RouteConfig::default()
        };
        let state = AppState::new(&context, dispatcher(vec![route], "/"), DataLogging::default());
        let router = build_router(state, true);

        let (status, body) = send(router.clone(), Method::GET, "/v1/users/42").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "id": "42" }));

        let (status, body) = send(router, Method::DELETE, "/v1/users/42").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["kind"], "invalid_method");
    }

    #[tokio::test]
    async fn proxy_mode_mounts_actions_under_gateway_path() {
        let context = context().await;
        let Ok(settings) = ReverseProxySettings::merge(&ReverseProxyOverrides {
            target: Some("http://127.0.0.1:9".to_string()),
            target_path: Some("/static".to_string()),
            gateway_path: Some("/api".to_string()),
        }) else {
            panic!("proxy settings should validate");
        };
        let state = AppState::new(
            &context,
            dispatcher(vec![RouteConfig::default()], settings.gateway_path.as_str()),
            DataLogging::default(),
        )
        .with_proxy(proxy::ReverseProxy::new(settings));
        let router = build_router(state, false);

        let (status, body) = send(router.clone(), Method::GET, "/api/math/add?a=2&b=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "sum": 5 }));

        // Owned by the proxy, but the upstream is unreachable.
        let (status, _) = send(router.clone(), Method::GET, "/static/app.js").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        // Neither bound nor under the target path.
        let (status, _) = send(router, Method::GET, "/math/add").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
