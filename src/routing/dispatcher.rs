//! Request dispatch over a rebuilt handler table.
//!
//! # Design Decisions
//! - Immutable after construction; a rebuild creates a new dispatcher
//! - First registered pattern wins; an exact duplicate of an earlier
//!   pattern is shadowed and reported once at build time
//! - O(n) scan in registration order (route tables are small)

use std::collections::HashSet;
use std::sync::Arc;

use super::pattern::{PathParams, PathPattern};
use super::table::{BoundHandler, RouteSignature};

/// Ordered URL dispatcher for one rebuild.
#[derive(Debug, Default)]
pub struct Dispatcher {
    entries: Vec<(PathPattern, Arc<BoundHandler>)>,
}

impl Dispatcher {
    /// Mounts `handlers` under `prefix` (use `"/"` for the root).
    #[must_use]
    pub fn new(handlers: Vec<BoundHandler>, prefix: &str) -> Self {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let pattern = PathPattern::parse(handler.pattern()).with_prefix(prefix);
            if !seen.insert(pattern.as_str().to_string()) {
                tracing::warn!(
                    pattern = %pattern,
                    action = %handler.action(),
                    "pattern already bound; later binding is shadowed"
                );
                continue;
            }
            tracing::trace!(pattern = %pattern, action = %handler.action(), "action bound");
            entries.push((pattern, Arc::new(handler)));
        }
        Self { entries }
    }

    /// Finds the first handler whose pattern matches `path`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<(Arc<BoundHandler>, PathParams)> {
        self.entries.iter().find_map(|(pattern, handler)| {
            pattern
                .matches(path)
                .map(|params| (Arc::clone(handler), params))
        })
    }

    /// Returns the number of reachable bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the reachable bindings with their mounted patterns.
    #[must_use]
    pub fn signatures(&self) -> Vec<RouteSignature> {
        self.entries
            .iter()
            .map(|(pattern, handler)| RouteSignature {
                pattern: pattern.as_str().to_string(),
                ..handler.signature()
            })
            .collect()
    }
}
