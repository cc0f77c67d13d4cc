//! In-process service broker.
//!
//! [`LocalBroker`] is both a [`ServiceRegistry`] and an [`ActionInvoker`]:
//! services register async action closures, and every registration change
//! is published on the broker's [`EventBus`]. It backs the demo binary and
//! the test-suite; production deployments plug their own transport in.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};

use super::broker::{
    ActionDescriptor, ActionInvoker, BrokerError, ListOptions, ServiceDescriptor, ServiceRegistry,
};
use super::{ActionName, EventBus, RegistryEvent};

/// Boxed future returned by a local action.
pub type ActionFuture = BoxFuture<'static, Result<Value, BrokerError>>;

type ActionFn = Arc<dyn Fn(Value) -> ActionFuture + Send + Sync>;

/// A service definition: a name plus its actions in declaration order.
pub struct LocalService {
    name: String,
    actions: Vec<(String, ActionFn)>,
    available: bool,
}

impl LocalService {
    /// Starts a service definition with no actions.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            available: true,
        }
    }

    /// Adds an action. A later action with the same name replaces the
    /// earlier one.
    #[must_use]
    pub fn action<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BrokerError>> + Send + 'static,
    {
        let name = name.into();
        let handler: ActionFn = Arc::new(move |params| handler(params).boxed());
        self.actions.retain(|(existing, _)| *existing != name);
        self.actions.push((name, handler));
        self
    }

    /// Returns the service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self, with_actions: bool) -> ServiceDescriptor {
        let actions = if with_actions {
            self.actions
                .iter()
                .map(|(name, _)| ActionDescriptor { name: name.clone() })
                .collect()
        } else {
            Vec::new()
        };
        ServiceDescriptor {
            name: self.name.clone(),
            actions,
        }
    }
}

impl fmt::Debug for LocalService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalService")
            .field("name", &self.name)
            .field(
                "actions",
                &self.actions.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field("available", &self.available)
            .finish()
    }
}

/// In-memory registry and RPC transport.
///
/// Services are kept in registration order so listings are deterministic.
///
/// # Concurrency
///
/// The service table sits behind a `tokio::sync::RwLock`. Calls clone the
/// action closure under a read lock and run it after releasing the lock,
/// so slow actions never block registration changes.
#[derive(Debug)]
pub struct LocalBroker {
    services: RwLock<Vec<LocalService>>,
    events: EventBus,
}

impl LocalBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            services: RwLock::new(Vec::new()),
            events: EventBus::default(),
        }
    }

    /// Returns the broker's event bus.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    /// Registers a service and publishes `service.added`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::DuplicateService`] if a service with the same
    /// name is already registered.
    pub async fn register(&self, service: LocalService) -> Result<(), BrokerError> {
        let name = service.name.clone();
        {
            let mut services = self.services.write().await;
            if services.iter().any(|s| s.name == name) {
                return Err(BrokerError::DuplicateService(name));
            }
            services.push(service);
        }
        tracing::info!(service = %name, "service registered");
        self.events.publish(RegistryEvent::added(name));
        Ok(())
    }

    /// Removes a service and publishes `service.removed`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ServiceNotFound`] if no such service exists.
    pub async fn remove(&self, name: &str) -> Result<(), BrokerError> {
        {
            let mut services = self.services.write().await;
            let before = services.len();
            services.retain(|s| s.name != name);
            if services.len() == before {
                return Err(BrokerError::ServiceNotFound(name.to_string()));
            }
        }
        tracing::info!(service = %name, "service removed");
        self.events.publish(RegistryEvent::removed(name));
        Ok(())
    }

    /// Marks a service available or unavailable. Publishes `service.added`
    /// or `service.removed` when the availability actually changes.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ServiceNotFound`] if no such service exists.
    pub async fn set_available(&self, name: &str, available: bool) -> Result<(), BrokerError> {
        let changed = {
            let mut services = self.services.write().await;
            let service = services
                .iter_mut()
                .find(|s| s.name == name)
                .ok_or_else(|| BrokerError::ServiceNotFound(name.to_string()))?;
            let changed = service.available != available;
            service.available = available;
            changed
        };
        if changed {
            let event = if available {
                RegistryEvent::added(name)
            } else {
                RegistryEvent::removed(name)
            };
            self.events.publish(event);
        }
        Ok(())
    }

    /// Returns the number of registered services.
    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    /// Returns `true` if no services are registered.
    pub async fn is_empty(&self) -> bool {
        self.services.read().await.is_empty()
    }
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceRegistry for LocalBroker {
    async fn list_services(
        &self,
        options: ListOptions,
    ) -> Result<Vec<ServiceDescriptor>, BrokerError> {
        let services = self.services.read().await;
        Ok(services
            .iter()
            .filter(|s| s.available || !options.only_available)
            .map(|s| s.descriptor(options.with_actions))
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl ActionInvoker for LocalBroker {
    async fn call(&self, action: &str, params: Value) -> Result<Value, BrokerError> {
        let name = ActionName::parse(action)
            .ok_or_else(|| BrokerError::ActionNotFound(action.to_string()))?;

        let handler = {
            let services = self.services.read().await;
            let service = services
                .iter()
                .find(|s| s.name == name.service())
                .ok_or_else(|| BrokerError::ActionNotFound(action.to_string()))?;
            if !service.available {
                return Err(BrokerError::ServiceUnavailable(service.name.clone()));
            }
            service
                .actions
                .iter()
                .find(|(n, _)| n == name.name())
                .map(|(_, handler)| Arc::clone(handler))
                .ok_or_else(|| BrokerError::ActionNotFound(action.to_string()))?
        };

        handler(params).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn math_service() -> LocalService {
        LocalService::new("math")
            .action("add", |params: Value| async move {
                let a = params["a"].as_i64().unwrap_or_default();
                let b = params["b"].as_i64().unwrap_or_default();
                Ok(serde_json::json!({ "sum": a + b }))
            })
            .action("fail", |_| async { Err(BrokerError::action("always fails")) })
    }

    #[tokio::test]
    async fn register_and_list() {
        let broker = LocalBroker::new();
        let Ok(()) = broker.register(math_service()).await else {
            panic!("register failed");
        };

        let Ok(listing) = broker.list_services(ListOptions::default()).await else {
            panic!("list failed");
        };
        assert_eq!(listing, vec![ServiceDescriptor::new("math", ["add", "fail"])]);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let broker = LocalBroker::new();
        let _ = broker.register(math_service()).await;
        let result = broker.register(math_service()).await;
        assert!(matches!(result, Err(BrokerError::DuplicateService(_))));
        assert_eq!(broker.len().await, 1);
    }

    #[tokio::test]
    async fn call_runs_action() {
        let broker = LocalBroker::new();
        let _ = broker.register(math_service()).await;

        let result = broker
            .call("math.add", serde_json::json!({ "a": 1, "b": 2 }))
            .await;
        let Ok(value) = result else {
            panic!("call failed");
        };
        assert_eq!(value, serde_json::json!({ "sum": 3 }));
    }

    #[tokio::test]
    async fn call_propagates_action_errors() {
        let broker = LocalBroker::new();
        let _ = broker.register(math_service()).await;

        let result = broker.call("math.fail", Value::Null).await;
        assert!(matches!(result, Err(BrokerError::Action { .. })));

        let result = broker.call("math.missing", Value::Null).await;
        assert!(matches!(result, Err(BrokerError::ActionNotFound(_))));
    }

    #[tokio::test]
    async fn unavailable_services_are_hidden_and_not_callable() {
        let broker = LocalBroker::new();
        let _ = broker.register(math_service()).await;
        let _ = broker.set_available("math", false).await;

        let Ok(listing) = broker.list_services(ListOptions::default()).await else {
            panic!("list failed");
        };
        assert!(listing.is_empty());

        let all = ListOptions {
            only_available: false,
            with_actions: false,
        };
        let Ok(listing) = broker.list_services(all).await else {
            panic!("list failed");
        };
        assert_eq!(listing, vec![ServiceDescriptor::new("math", Vec::<String>::new())]);

        let result = broker.call("math.add", Value::Null).await;
        assert!(matches!(result, Err(BrokerError::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn changes_publish_events() {
        let broker = LocalBroker::new();
        let mut rx = broker.subscribe();

        let _ = broker.register(math_service()).await;
        let _ = broker.set_available("math", false).await;
        // No change, no event.
        let _ = broker.set_available("math", false).await;
        let _ = broker.remove("math").await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.event_type_str());
        }
        assert_eq!(
            kinds,
            vec![
                "registry.service.added",
                "registry.service.removed",
                "registry.service.removed",
            ]
        );
        assert!(broker.is_empty().await);
    }

    #[tokio::test]
    async fn remove_unknown_service_is_error() {
        let broker = LocalBroker::new();
        let result = broker.remove("ghost").await;
        assert!(matches!(result, Err(BrokerError::ServiceNotFound(_))));
    }
}
