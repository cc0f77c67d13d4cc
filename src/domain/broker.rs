//! Collaborator interfaces: the service registry and the RPC transport.
//!
//! The gateway never talks to a transport directly. It lists services
//! through a [`ServiceRegistry`], watches it for changes, and forwards calls
//! through an [`ActionInvoker`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use super::{ActionName, RegistryEvent};

/// Error reported by a registry or an action call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// No available service exposes the action.
    #[error("action {0} not found")]
    ActionNotFound(String),

    /// The service exists but is currently unavailable.
    #[error("service {0} is not available")]
    ServiceUnavailable(String),

    /// A service with the same name is already registered.
    #[error("service {0} is already registered")]
    DuplicateService(String),

    /// No service with that name is registered.
    #[error("service {0} is not registered")]
    ServiceNotFound(String),

    /// The registry could not be queried.
    #[error("registry unavailable: {0}")]
    Registry(String),

    /// The action ran and returned an error.
    #[error("{message}")]
    Action {
        /// Error message.
        message: String,
        /// Optional structured error data.
        data: Option<Value>,
    },
}

impl BrokerError {
    /// Shorthand for an [`BrokerError::Action`] error without data.
    #[must_use]
    pub fn action(message: impl Into<String>) -> Self {
        Self::Action {
            message: message.into(),
            data: None,
        }
    }

    /// Returns the structured error data, if any.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Action { data, .. } => data.as_ref(),
            _ => None,
        }
    }
}

/// Options for [`ServiceRegistry::list_services`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// Skip services that are registered but not available.
    pub only_available: bool,
    /// Include each service's action list.
    pub with_actions: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            only_available: true,
            with_actions: true,
        }
    }
}

/// Read-only snapshot of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Short action name (without the service prefix).
    pub name: String,
}

/// Read-only snapshot of one service and its actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Service name.
    pub name: String,
    /// Actions exposed by the service.
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
}

impl ServiceDescriptor {
    /// Creates a descriptor from a service name and short action names.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            actions: actions
                .into_iter()
                .map(|a| ActionDescriptor { name: a.into() })
                .collect(),
        }
    }

    /// Returns the fully-qualified names of all actions, in listing order.
    pub fn action_names(&self) -> impl Iterator<Item = ActionName> + '_ {
        self.actions
            .iter()
            .map(|action| ActionName::new(&self.name, &action.name))
    }
}

/// Source of the live service listing and its change notifications.
#[async_trait]
pub trait ServiceRegistry: Send + Sync + fmt::Debug {
    /// Lists the services currently known to the registry.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Registry`] if the registry cannot be queried.
    async fn list_services(&self, options: ListOptions)
    -> Result<Vec<ServiceDescriptor>, BrokerError>;

    /// Subscribes to `service.added` / `service.removed` notifications.
    fn subscribe(&self) -> broadcast::Receiver<RegistryEvent>;
}

/// RPC transport used to execute actions.
#[async_trait]
pub trait ActionInvoker: Send + Sync + fmt::Debug {
    /// Calls `action` with `params` and waits for its result.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] if the action is unknown, its service is
    /// unavailable, or the action itself fails.
    async fn call(&self, action: &str, params: Value) -> Result<Value, BrokerError>;
}
