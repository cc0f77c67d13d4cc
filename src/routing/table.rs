//! Route table construction: live services × route rules → bound handlers.
//!
//! For each route, in declaration order, every `(service, action)` pair of
//! the listing is run through the route's whitelist, then through its
//! alias table. The result is an ordered list of [`BoundHandler`]s that is
//! rebuilt from scratch on every registry change.

use std::sync::{Arc, OnceLock};

use serde::Serialize;

use super::alias::{AliasSpec, AliasTable, MethodSet, derive_path, normalize_path};
use super::whitelist::Whitelist;
use crate::config::{MappingPolicy, RouteConfig};
use crate::domain::{ActionName, ListOptions, ServiceDescriptor, ServiceRegistry};
use crate::error::GatewayError;

/// A validated route: path prefix plus compiled whitelist and aliases.
#[derive(Debug, Clone)]
pub struct Route {
    /// Normalized path prefix.
    pub path: String,
    /// Compiled whitelist.
    pub whitelist: Whitelist,
    /// Whether unaliased actions are exposed.
    pub policy: MappingPolicy,
    /// Reverse alias lookup.
    pub aliases: AliasTable,
    /// Whether requests through this route need authorization.
    pub authorization: bool,
}

impl Route {
    /// Validates a route declaration.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidAlias`] if any alias is malformed.
    pub fn from_config(config: &RouteConfig) -> Result<Self, GatewayError> {
        let aliases = AliasTable::from_declarations(
            config
                .aliases
                .iter()
                .map(|(alias, action)| (alias.as_str(), action.as_str())),
        )?;
        Ok(Self {
            path: normalize_path(&config.path),
            whitelist: Whitelist::new(config.whitelist.as_slice()),
            policy: config.mapping_policy,
            aliases,
            authorization: config.authorization,
        })
    }
}

/// One action bound to one URL pattern under one route.
///
/// The URL pattern and accepted methods are derived on first use and
/// cached for the life of the handler. Handlers are never mutated after a
/// rebuild; the next rebuild allocates a fresh set.
#[derive(Debug)]
pub struct BoundHandler {
    route_path: String,
    alias: Option<AliasSpec>,
    action: ActionName,
    authorization: bool,
    pattern: OnceLock<String>,
    methods: OnceLock<MethodSet>,
}

impl BoundHandler {
    /// Creates a handler for `action` under `route_path`.
    #[must_use]
    pub fn new(
        route_path: impl Into<String>,
        alias: Option<AliasSpec>,
        action: ActionName,
        authorization: bool,
    ) -> Self {
        Self {
            route_path: route_path.into(),
            alias,
            action,
            authorization,
            pattern: OnceLock::new(),
            methods: OnceLock::new(),
        }
    }

    /// Returns the route path the handler was bound under.
    #[must_use]
    pub fn route_path(&self) -> &str {
        &self.route_path
    }

    /// Returns the alias, if the action was bound through one.
    #[must_use]
    pub fn alias(&self) -> Option<&AliasSpec> {
        self.alias.as_ref()
    }

    /// Returns the action this handler calls.
    #[must_use]
    pub fn action(&self) -> &ActionName {
        &self.action
    }

    /// Returns `true` if the route asked for authorization.
    #[must_use]
    pub fn requires_authorization(&self) -> bool {
        self.authorization
    }

    /// Returns the URL pattern relative to the gateway mount point.
    pub fn pattern(&self) -> &str {
        self.pattern
            .get_or_init(|| derive_path(&self.route_path, self.alias.as_ref(), &self.action))
    }

    /// Returns the accepted HTTP methods.
    pub fn accepted_methods(&self) -> MethodSet {
        *self.methods.get_or_init(|| {
            self.alias
                .as_ref()
                .map_or_else(MethodSet::all, AliasSpec::accepted_methods)
        })
    }

    /// Returns the `(pattern, methods, action)` triple that identifies the
    /// binding independently of the handler instance.
    #[must_use]
    pub fn signature(&self) -> RouteSignature {
        RouteSignature {
            pattern: self.pattern().to_string(),
            methods: self.accepted_methods().names(),
            action: self.action.to_string(),
        }
    }
}

/// Instance-independent description of a binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RouteSignature {
    /// URL pattern.
    pub pattern: String,
    /// Accepted methods in canonical order.
    pub methods: Vec<&'static str>,
    /// Full action name.
    pub action: String,
}

/// Builds ordered handler lists from a service listing and route rules.
#[derive(Debug, Clone)]
pub struct RouteTableBuilder {
    routes: Arc<[Route]>,
}

impl RouteTableBuilder {
    /// Creates a builder over validated routes.
    #[must_use]
    pub fn new(routes: Arc<[Route]>) -> Self {
        Self { routes }
    }

    /// Returns the routes the builder applies.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Binds every whitelisted action of `services` under every route.
    ///
    /// Ordering is route declaration order, then listing order. The same
    /// action may be bound once per route whose whitelist accepts it.
    #[must_use]
    pub fn build(&self, services: &[ServiceDescriptor]) -> Vec<BoundHandler> {
        let mut handlers = Vec::new();
        for route in self.routes.iter() {
            let before = handlers.len();
            for action in services.iter().flat_map(ServiceDescriptor::action_names) {
                if !route.whitelist.matches(&action) {
                    continue;
                }
                let alias = route.aliases.get(action.as_str()).cloned();
                if alias.is_none() && route.policy == MappingPolicy::Restrict {
                    continue;
                }
                handlers.push(BoundHandler::new(
                    route.path.clone(),
                    alias,
                    action,
                    route.authorization,
                ));
            }
            tracing::debug!(
                route = %route.path,
                bound = handlers.len().saturating_sub(before),
                "route actions bound"
            );
        }
        handlers
    }

    /// Fetches the live listing from `registry` and builds handlers.
    ///
    /// A registry failure is logged and treated as an empty listing, so
    /// the gateway keeps serving with zero bound actions.
    pub async fn fetch_and_build(&self, registry: &dyn ServiceRegistry) -> Vec<BoundHandler> {
        let services = match registry.list_services(ListOptions::default()).await {
            Ok(services) => services,
            Err(e) => {
                tracing::error!(error = %e, "could not load services from the registry");
                Vec::new()
            }
        };
        self.build(&services)
    }
}
