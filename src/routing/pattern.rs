//! URL patterns with `{name}` placeholders.

use std::fmt;

use super::alias::normalize_path;

/// Path parameters captured by a pattern, in segment order.
pub type PathParams = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled URL pattern such as `/api/users/{id}`.
///
/// Matching is segment-by-segment and strict: the request path must have
/// exactly as many segments as the pattern, so `/math/add/` does not match
/// `/math/add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compiles a pattern. The path is normalized first.
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let raw = normalize_path(path);
        let segments = split(&raw)
            .map(|segment| {
                segment
                    .strip_prefix('{')
                    .and_then(|s| s.strip_suffix('}'))
                    .filter(|name| !name.is_empty() && !name.contains(['{', '}']))
                    .map_or_else(
                        || Segment::Literal(segment.to_string()),
                        |name| Segment::Param(name.to_string()),
                    )
            })
            .collect();
        Self { raw, segments }
    }

    /// Returns the normalized pattern string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns a copy of this pattern mounted under `prefix`.
    #[must_use]
    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self::parse(&format!("{prefix}/{}", self.raw))
    }

    /// Matches a request path, returning the captured parameters.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let mut params = PathParams::new();
        let mut parts = split(path);
        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => params.push((name.clone(), part.to_string())),
            }
        }
        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Splits an absolute path into segments. The root path has none.
fn split(path: &str) -> impl Iterator<Item = &str> {
    let rest = path.strip_prefix('/').unwrap_or(path);
    rest.split('/').filter(move |_| !rest.is_empty())
}
