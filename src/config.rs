//! Gateway configuration: typed settings, defaults, loading and validation.
//!
//! Process-level knobs come from environment variables (or a `.env` file
//! via `dotenvy`). Routes and the reverse proxy are described by a JSON
//! settings document whose path is given in `GATEWAY_SETTINGS`.
//!
//! | Variable                 | Default         | Meaning                           |
//! |--------------------------|-----------------|-----------------------------------|
//! | `GATEWAY_SETTINGS`       | unset           | Path to a JSON [`GatewaySettings`]  |
//! | `GATEWAY_IP`             | `0.0.0.0`       | Listen IP, overrides the document |
//! | `GATEWAY_PORT`           | `3100`          | Listen port, overrides the document |
//! | `GATEWAY_DEMO_SERVICES`  | `true`          | Register the demo services        |
//! | `GATEWAY_EVENT_CAPACITY` | `1024`          | Rebuild trigger queue capacity    |
//! | `GATEWAY_LOG_FORMAT`     | `text`          | `json` for JSON log lines (binary) |

use std::fmt;
use std::sync::Arc;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use url::Url;

use crate::error::GatewayError;
use crate::routing::{Route, normalize_path};

/// Which whitelisted actions a route exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingPolicy {
    /// Expose every whitelisted action, aliased or not.
    #[default]
    All,
    /// Expose only whitelisted actions that have an alias.
    Restrict,
}

/// Log level used for request/response data logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// `TRACE`
    Trace,
    /// `DEBUG`
    Debug,
    /// `INFO`
    Info,
    /// `WARN`
    Warn,
    /// `ERROR`
    Error,
}

/// One route declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouteConfig {
    /// URL path prefix for the route.
    pub path: String,
    /// Ordered whitelist patterns.
    pub whitelist: Vec<String>,
    /// Mapping policy.
    pub mapping_policy: MappingPolicy,
    /// `(alias, action)` declarations in document order.
    #[serde(deserialize_with = "ordered_aliases")]
    pub aliases: Vec<(String, String)>,
    /// Whether requests through this route need authorization.
    pub authorization: bool,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            whitelist: vec!["**".to_string()],
            mapping_policy: MappingPolicy::All,
            aliases: Vec::new(),
            authorization: false,
        }
    }
}

/// Reverse-proxy settings as written; absent fields take defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReverseProxyOverrides {
    /// Upstream URL.
    pub target: Option<String>,
    /// Path prefix forwarded to the upstream.
    pub target_path: Option<String>,
    /// Path prefix served by the gateway itself.
    pub gateway_path: Option<String>,
}

/// Validated reverse-proxy settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseProxySettings {
    /// Upstream base URL.
    pub target: Url,
    /// Normalized path prefix forwarded to the upstream.
    pub target_path: String,
    /// Normalized path prefix served by the gateway.
    pub gateway_path: String,
}

impl ReverseProxySettings {
    /// Default upstream.
    pub const DEFAULT_TARGET: &'static str = "http://localhost:3000";
    /// Default upstream path prefix.
    pub const DEFAULT_TARGET_PATH: &'static str = "/";
    /// Default gateway path prefix.
    pub const DEFAULT_GATEWAY_PATH: &'static str = "/api";

    /// Merges overrides over the defaults and validates the target.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidProxyTarget`] if the target is not an
    /// absolute `http` URL with a host.
    pub fn merge(overrides: &ReverseProxyOverrides) -> Result<Self, GatewayError> {
        let target = overrides
            .target
            .as_deref()
            .unwrap_or(Self::DEFAULT_TARGET);
        let invalid = |reason: String| GatewayError::InvalidProxyTarget {
            target: target.to_string(),
            reason,
        };
        let url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }
        Ok(Self {
            target: url,
            target_path: normalize_path(
                overrides
                    .target_path
                    .as_deref()
                    .unwrap_or(Self::DEFAULT_TARGET_PATH),
            ),
            gateway_path: normalize_path(
                overrides
                    .gateway_path
                    .as_deref()
                    .unwrap_or(Self::DEFAULT_GATEWAY_PATH),
            ),
        })
    }
}

/// Gateway settings document.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewaySettings {
    /// Listen IP or host name.
    pub ip: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// Route declarations, in precedence order.
    pub routes: Vec<RouteConfig>,
    /// Optional development reverse proxy. `false` or `null` disables it,
    /// `true` enables it with the defaults.
    #[serde(deserialize_with = "proxy_toggle")]
    pub reverse_proxy: Option<ReverseProxyOverrides>,
    /// Level at which call params are logged; `null` disables.
    pub log_request_params: Option<LogLevel>,
    /// Level at which call results are logged; `null` disables.
    pub log_response_data: Option<LogLevel>,
    /// Wrap the router in a permissive CORS layer.
    pub cors: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".to_string(),
            port: 3100,
            routes: vec![RouteConfig::default()],
            reverse_proxy: None,
            log_request_params: Some(LogLevel::Debug),
            log_response_data: None,
            cors: false,
        }
    }
}

impl GatewaySettings {
    /// Parses a JSON settings document. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the document is not valid JSON
    /// or has the wrong shape.
    pub fn from_json(json: &str) -> Result<Self, GatewayError> {
        serde_json::from_str(json).map_err(|e| GatewayError::Config(e.to_string()))
    }

    /// Validates the settings once, at load time.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidAlias`] for a malformed alias and
    /// [`GatewayError::InvalidProxyTarget`] for an unusable proxy target.
    pub fn validate(&self) -> Result<ValidatedSettings, GatewayError> {
        let routes = self
            .routes
            .iter()
            .map(Route::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        let reverse_proxy = self
            .reverse_proxy
            .as_ref()
            .map(ReverseProxySettings::merge)
            .transpose()?;
        Ok(ValidatedSettings {
            ip: self.ip.clone(),
            port: self.port,
            routes: routes.into(),
            reverse_proxy,
            log_request_params: self.log_request_params,
            log_response_data: self.log_response_data,
            cors: self.cors,
        })
    }
}

/// Settings after validation, ready for the server lifecycle.
#[derive(Debug, Clone)]
pub struct ValidatedSettings {
    /// Listen IP or host name.
    pub ip: String,
    /// Listen port.
    pub port: u16,
    /// Validated routes, in precedence order.
    pub routes: Arc<[Route]>,
    /// Merged reverse-proxy settings, if enabled.
    pub reverse_proxy: Option<ReverseProxySettings>,
    /// Level at which call params are logged.
    pub log_request_params: Option<LogLevel>,
    /// Level at which call results are logged.
    pub log_response_data: Option<LogLevel>,
    /// Wrap the router in a permissive CORS layer.
    pub cors: bool,
}

impl ValidatedSettings {
    /// Returns the `ip:port` address to listen on.
    #[must_use]
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Process configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway settings (document plus env overrides).
    pub settings: GatewaySettings,
    /// Whether the binary registers its demo services.
    pub demo_services: bool,
    /// Capacity of the rebuild trigger queue.
    pub event_capacity: usize,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the settings file cannot be read
    /// or parsed, or if `GATEWAY_PORT` is not a valid port.
    pub fn from_env() -> Result<Self, GatewayError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`GatewayConfig::from_env`].
    pub fn from_vars<F>(var: F) -> Result<Self, GatewayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match var("GATEWAY_SETTINGS") {
            Some(path) => {
                let json = std::fs::read_to_string(&path)
                    .map_err(|e| GatewayError::Config(format!("cannot read {path}: {e}")))?;
                GatewaySettings::from_json(&json)?
            }
            None => GatewaySettings::default(),
        };

        if let Some(ip) = var("GATEWAY_IP") {
            settings.ip = ip;
        }
        if let Some(port) = var("GATEWAY_PORT") {
            settings.port = port
                .parse()
                .map_err(|_| GatewayError::Config(format!("invalid GATEWAY_PORT {port:?}")))?;
        }

        Ok(Self {
            settings,
            demo_services: parse_bool(var("GATEWAY_DEMO_SERVICES").as_deref(), true),
            event_capacity: var("GATEWAY_EVENT_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1024),
        })
    }
}

/// Parses a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
/// (case-insensitive). Returns `default` otherwise.
fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

/// Deserializes a JSON object into `(key, value)` pairs, keeping document
/// order.
fn ordered_aliases<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct AliasVisitor;

    impl<'de> Visitor<'de> for AliasVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of alias to action name")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(pair) = map.next_entry::<String, String>()? {
                pairs.push(pair);
            }
            Ok(pairs)
        }
    }

    deserializer.deserialize_map(AliasVisitor)
}

/// Accepts either a reverse-proxy object or a boolean switch.
fn proxy_toggle<'de, D>(deserializer: D) -> Result<Option<ReverseProxyOverrides>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Toggle {
        Switch(bool),
        Overrides(ReverseProxyOverrides),
    }

    Ok(match Option::<Toggle>::deserialize(deserializer)? {
        None | Some(Toggle::Switch(false)) => None,
        Some(Toggle::Switch(true)) => Some(ReverseProxyOverrides::default()),
        Some(Toggle::Overrides(overrides)) => Some(overrides),
    })
}
