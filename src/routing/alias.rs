//! Alias declarations, HTTP method sets, and URL path derivation.
//!
//! A route's aliases map an alias string (`"ALIAS"` or `"METHOD ALIAS"`)
//! to a full action name. [`AliasTable`] inverts that map once per route
//! so handlers can look up the alias for the action they bind.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use axum::http::Method;

use crate::domain::ActionName;
use crate::error::GatewayError;

/// HTTP methods an action can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl HttpMethod {
    /// Every bindable method, in canonical order.
    pub const ALL: [Self; 4] = [Self::Get, Self::Post, Self::Put, Self::Delete];

    /// Parses a method name, ignoring case.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
    }

    /// Maps an HTTP request method. Methods the gateway never binds yield
    /// `None`.
    #[must_use]
    pub fn from_http(method: &Method) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == method.as_str())
    }

    /// Returns the upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Get => 1,
            Self::Post => 1 << 1,
            Self::Put => 1 << 2,
            Self::Delete => 1 << 3,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of accepted [`HttpMethod`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodSet(u8);

impl MethodSet {
    /// All four bindable methods.
    #[must_use]
    pub const fn all() -> Self {
        Self(0b1111)
    }

    /// A set holding a single method.
    #[must_use]
    pub const fn only(method: HttpMethod) -> Self {
        Self(method.bit())
    }

    /// Returns `true` if the set holds `method`.
    #[must_use]
    pub const fn contains(self, method: HttpMethod) -> bool {
        self.0 & method.bit() != 0
    }

    /// Returns `true` if a request with this method is accepted.
    #[must_use]
    pub fn accepts(self, method: &Method) -> bool {
        HttpMethod::from_http(method).is_some_and(|m| self.contains(m))
    }

    /// Iterates over the methods in canonical order.
    pub fn iter(self) -> impl Iterator<Item = HttpMethod> {
        HttpMethod::ALL.into_iter().filter(move |m| self.contains(*m))
    }

    /// Returns the method names in canonical order.
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        self.iter().map(HttpMethod::as_str).collect()
    }
}

impl fmt::Display for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(", "))
    }
}

/// A parsed alias declaration: optional method plus path token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasSpec {
    raw: String,
    method: Option<HttpMethod>,
    path: String,
}

impl AliasSpec {
    /// Parses `"ALIAS"` or `"METHOD ALIAS"`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidAlias`] unless the string splits into
    /// exactly one or two whitespace-separated tokens, and, with two
    /// tokens, the first one is `GET`, `POST`, `PUT` or `DELETE`.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let invalid = || GatewayError::InvalidAlias(raw.to_string());
        let mut tokens = raw.split_whitespace();
        let (method, path) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(path), None, None) => (None, path),
            (Some(method), Some(path), None) => {
                (Some(HttpMethod::parse(method).ok_or_else(invalid)?), path)
            }
            _ => return Err(invalid()),
        };
        Ok(Self {
            raw: raw.to_string(),
            method,
            path: path.to_string(),
        })
    }

    /// Returns the declaration as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the method restriction, if any.
    #[must_use]
    pub fn method(&self) -> Option<HttpMethod> {
        self.method
    }

    /// Returns the path token.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Methods accepted by an action bound through this alias.
    #[must_use]
    pub fn accepted_methods(&self) -> MethodSet {
        self.method.map_or_else(MethodSet::all, MethodSet::only)
    }
}

/// Reverse lookup from full action name to its alias.
///
/// When two aliases target the same action, the first declaration wins
/// and the later one is logged and ignored.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    by_action: HashMap<String, AliasSpec>,
}

impl AliasTable {
    /// Builds the table from `(alias, action)` declarations in order.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidAlias`] for the first malformed alias.
    pub fn from_declarations<'a, I>(declarations: I) -> Result<Self, GatewayError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut by_action = HashMap::new();
        for (alias, action) in declarations {
            let spec = AliasSpec::parse(alias)?;
            match by_action.entry(action.to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(spec);
                }
                Entry::Occupied(slot) => {
                    let kept: &AliasSpec = slot.get();
                    tracing::warn!(
                        action,
                        kept = kept.as_str(),
                        ignored = alias,
                        "action aliased twice; keeping the first alias"
                    );
                }
            }
        }
        Ok(Self { by_action })
    }

    /// Returns the alias bound to `action`, if any.
    #[must_use]
    pub fn get(&self, action: &str) -> Option<&AliasSpec> {
        self.by_action.get(action)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.by_action.len()
    }
}

/// Ensures a leading `/` and collapses every run of `/` into one.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len().saturating_add(1));
    out.push('/');
    for c in path.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Derives the URL path for an action under `route_path`.
///
/// The alias path token is used when present, otherwise the action name
/// with dots turned into slashes.
#[must_use]
pub fn derive_path(route_path: &str, alias: Option<&AliasSpec>, action: &ActionName) -> String {
    let tail = alias.map_or_else(|| action.to_path(), |a| a.path().to_string());
    normalize_path(&format!("{route_path}/{tail}"))
}
