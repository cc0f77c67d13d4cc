//! Shared application state injected into the gateway's Axum handlers.
//!
//! [`GatewayContext`] holds the collaborators that live as long as the
//! gateway. [`AppState`] adds what one rebuild produced (the dispatcher and
//! the optional reverse proxy) and is handed to the router of that build.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::api::proxy::ReverseProxy;
use crate::codec::{Codec, JsonCodec};
use crate::config::LogLevel;
use crate::domain::{ActionInvoker, ActionName, ServiceRegistry};
use crate::error::GatewayError;
use crate::routing::Dispatcher;

/// Authorization hook consulted for routes declared with
/// `authorization: true`.
#[async_trait]
pub trait Authorizer: Send + Sync + std::fmt::Debug {
    /// Decides whether a request may call `action`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthorized`] (or any other error) to reject
    /// the request. The error is answered with the uniform 500 envelope.
    async fn authorize(&self, action: &ActionName, headers: &HeaderMap) -> Result<(), GatewayError>;
}

/// Levels at which the handler logs call data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataLogging {
    /// Level for call params, `None` to skip.
    pub request_params: Option<LogLevel>,
    /// Level for call results, `None` to skip.
    pub response_data: Option<LogLevel>,
}

/// Long-lived gateway collaborators.
#[derive(Debug, Clone)]
pub struct GatewayContext {
    /// Source of the service listing and change events.
    pub registry: Arc<dyn ServiceRegistry>,
    /// RPC transport.
    pub invoker: Arc<dyn ActionInvoker>,
    /// Body codec.
    pub codec: Arc<dyn Codec>,
    /// Optional authorization hook.
    pub authorizer: Option<Arc<dyn Authorizer>>,
}

impl GatewayContext {
    /// Creates a context with the JSON codec and no authorizer.
    ///
    /// The same broker may serve as both registry and invoker.
    #[must_use]
    pub fn new<R, I>(registry: Arc<R>, invoker: Arc<I>) -> Self
    where
        R: ServiceRegistry + 'static,
        I: ActionInvoker + 'static,
    {
        let registry: Arc<dyn ServiceRegistry> = registry;
        let invoker: Arc<dyn ActionInvoker> = invoker;
        Self {
            registry,
            invoker,
            codec: Arc::new(JsonCodec),
            authorizer: None,
        }
    }

    /// Replaces the body codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Installs an authorizer.
    #[must_use]
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }
}

/// State for the router of one rebuild.
#[derive(Debug, Clone)]
pub struct AppState {
    /// URL dispatcher over this build's handlers.
    pub dispatcher: Arc<Dispatcher>,
    /// RPC transport.
    pub invoker: Arc<dyn ActionInvoker>,
    /// Body codec.
    pub codec: Arc<dyn Codec>,
    /// Optional authorization hook.
    pub authorizer: Option<Arc<dyn Authorizer>>,
    /// Call data logging levels.
    pub logging: DataLogging,
    /// Upstream forwarding for paths the dispatcher does not own.
    pub proxy: Option<Arc<ReverseProxy>>,
}

impl AppState {
    /// Creates the state for one build.
    #[must_use]
    pub fn new(context: &GatewayContext, dispatcher: Dispatcher, logging: DataLogging) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            invoker: Arc::clone(&context.invoker),
            codec: Arc::clone(&context.codec),
            authorizer: context.authorizer.as_ref().map(Arc::clone),
            logging,
            proxy: None,
        }
    }

    /// Attaches upstream forwarding.
    #[must_use]
    pub fn with_proxy(mut self, proxy: ReverseProxy) -> Self {
        self.proxy = Some(Arc::new(proxy));
        self
    }
}
