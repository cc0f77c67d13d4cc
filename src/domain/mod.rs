//! Domain layer: action names, collaborator interfaces, and registry events.
//!
//! This module holds the gateway's view of the outside world: the
//! [`ServiceRegistry`] it lists services from, the [`ActionInvoker`] it
//! forwards calls through, the [`RegistryEvent`]s that trigger rebuilds,
//! and an in-process [`LocalBroker`] implementing both interfaces.

pub mod action_name;
pub mod broker;
pub mod event_bus;
pub mod local_broker;
pub mod registry_event;

pub use action_name::ActionName;
pub use broker::{
    ActionDescriptor, ActionInvoker, BrokerError, ListOptions, ServiceDescriptor, ServiceRegistry,
};
pub use event_bus::EventBus;
pub use local_broker::{LocalBroker, LocalService};
pub use registry_event::RegistryEvent;
