//! Registry change notifications.
//!
//! The registry emits a [`RegistryEvent`] whenever a service appears or
//! disappears. The gateway only cares that a rebuild is due; the payload is
//! carried for logging.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Event published by a service registry.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// A service became available.
    ServiceAdded {
        /// Service name.
        service: String,
        /// When the registry noticed the service.
        timestamp: DateTime<Utc>,
    },

    /// A service went away or became unavailable.
    ServiceRemoved {
        /// Service name.
        service: String,
        /// When the registry noticed the removal.
        timestamp: DateTime<Utc>,
    },
}

impl RegistryEvent {
    /// Creates a `ServiceAdded` event stamped now.
    #[must_use]
    pub fn added(service: impl Into<String>) -> Self {
        Self::ServiceAdded {
            service: service.into(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a `ServiceRemoved` event stamped now.
    #[must_use]
    pub fn removed(service: impl Into<String>) -> Self {
        Self::ServiceRemoved {
            service: service.into(),
            timestamp: Utc::now(),
        }
    }

    /// Returns the service the event is about.
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::ServiceAdded { service, .. } | Self::ServiceRemoved { service, .. } => service,
        }
    }

    /// Returns the event name as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::ServiceAdded { .. } => "registry.service.added",
            Self::ServiceRemoved { .. } => "registry.service.removed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names() {
        assert_eq!(
            RegistryEvent::added("math").event_type_str(),
            "registry.service.added"
        );
        assert_eq!(
            RegistryEvent::removed("math").event_type_str(),
            "registry.service.removed"
        );
    }

    #[test]
    fn service_accessor() {
        assert_eq!(RegistryEvent::removed("users").service(), "users");
    }

    #[test]
    fn serializes_with_tag() {
        let json = serde_json::to_string(&RegistryEvent::added("math")).unwrap_or_default();
        assert!(json.contains("\"event_type\":\"service_added\""));
        assert!(json.contains("\"service\":\"math\""));
    }
}
