//! Fully-qualified action names.
//!
//! [`ActionName`] wraps a `"<service>.<name>"` string and remembers where
//! the service segment ends, so whitelist rules can compare segments
//! without re-parsing.

use std::fmt;

use serde::{Serialize, Serializer};

/// Fully-qualified action name of the form `"<service>.<name>"`.
///
/// The split happens at the last `.`, so versioned services such as
/// `"v2.users"` keep their dots in the service segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionName {
    full: String,
    dot: usize,
}

impl ActionName {
    /// Builds an action name from a service name and a short action name.
    #[must_use]
    pub fn new(service: &str, action: &str) -> Self {
        Self {
            full: format!("{service}.{action}"),
            dot: service.len(),
        }
    }

    /// Parses a full action name. Returns `None` unless the string has a
    /// non-empty service segment and a non-empty name segment.
    #[must_use]
    pub fn parse(full: &str) -> Option<Self> {
        let (service, name) = full.rsplit_once('.')?;
        if service.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            full: full.to_string(),
            dot: service.len(),
        })
    }

    /// Returns the service segment.
    #[must_use]
    pub fn service(&self) -> &str {
        self.full.get(..self.dot).unwrap_or_default()
    }

    /// Returns the action-name segment.
    #[must_use]
    pub fn name(&self) -> &str {
        self.full.get(self.dot.saturating_add(1)..).unwrap_or_default()
    }

    /// Returns the full `"<service>.<name>"` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// Returns the default URL path for the action: dots become slashes.
    #[must_use]
    pub fn to_path(&self) -> String {
        self.full.replace('.', "/")
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

impl AsRef<str> for ActionName {
    fn as_ref(&self) -> &str {
        &self.full
    }
}

impl Serialize for ActionName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.full)
    }
}
