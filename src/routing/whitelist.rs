//! Whitelist matching: which actions a route exposes.
//!
//! Each pattern is one of:
//!
//! | Pattern        | Matches                                   |
//! |----------------|-------------------------------------------|
//! | `**` or `*.*`  | every action                              |
//! | `<svc>.*`      | actions whose service segment is `<svc>`  |
//! | `*.<name>`     | actions whose name segment is `<name>`    |
//! | anything else  | regular expression over the full name     |
//!
//! Regular expressions are used as written and may match anywhere in the
//! action name; anchor them (`^math\.\w+$`) to require a full match.
//! Patterns that do not compile are skipped with a warning.

use regex::Regex;

use crate::domain::ActionName;

/// One compiled whitelist rule.
#[derive(Debug, Clone)]
enum Rule {
    Any,
    Service(String),
    Action(String),
    Pattern(Regex),
}

impl Rule {
    fn compile(pattern: &str) -> Option<Self> {
        if pattern == "**" || pattern == "*.*" {
            return Some(Self::Any);
        }
        if let Some(service) = pattern.strip_suffix(".*")
            && !service.is_empty()
        {
            return Some(Self::Service(service.to_string()));
        }
        if let Some(action) = pattern.strip_prefix("*.")
            && !action.is_empty()
        {
            return Some(Self::Action(action.to_string()));
        }
        match Regex::new(pattern) {
            Ok(regex) => Some(Self::Pattern(regex)),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "ignoring invalid whitelist pattern");
                None
            }
        }
    }

    fn matches(&self, action: &ActionName) -> bool {
        match self {
            Self::Any => true,
            Self::Service(service) => action.service() == service,
            Self::Action(name) => action.name() == name,
            Self::Pattern(regex) => regex.is_match(action.as_str()),
        }
    }
}

/// A compiled, ordered whitelist.
///
/// An empty whitelist excludes every action.
#[derive(Debug, Clone)]
pub struct Whitelist {
    rules: Vec<Rule>,
}

impl Whitelist {
    /// Compiles a pattern list. Invalid regular expressions are dropped.
    #[must_use]
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            rules: patterns
                .iter()
                .filter_map(|p| Rule::compile(p.as_ref()))
                .collect(),
        }
    }

    /// Returns `true` if any rule accepts the action.
    #[must_use]
    pub fn matches(&self, action: &ActionName) -> bool {
        self.rules.iter().any(|rule| rule.matches(action))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.rules.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for Whitelist {
    fn default() -> Self {
        Self { rules: vec![Rule::Any] }
    }
}

/// Decides whether `action` passes the `patterns` whitelist.
///
/// Convenience wrapper that compiles the patterns on every call; route
/// tables use a pre-compiled [`Whitelist`] instead. Returns `false` for
/// names without a service segment.
#[must_use]
pub fn matches<S: AsRef<str>>(patterns: &[S], action: &str) -> bool {
    ActionName::parse(action).is_some_and(|name| Whitelist::new(patterns).matches(&name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIONS: [&str; 5] = [
        "math.add",
        "math.sub",
        "mathematics.add",
        "users.list",
        "v2.users.add",
    ];

    #[test]
    fn double_star_matches_everything() {
        for action in ACTIONS {
            assert!(matches(&["**"], action), "{action}");
            assert!(matches(&["*.*"], action), "{action}");
        }
    }

    #[test]
    fn service_wildcard_needs_exact_service() {
        assert!(matches(&["math.*"], "math.add"));
        assert!(matches(&["math.*"], "math.sub"));
        assert!(!matches(&["math.*"], "mathematics.add"));
        assert!(!matches(&["math.*"], "users.list"));
        assert!(matches(&["v2.users.*"], "v2.users.add"));
    }

    #[test]
    fn action_wildcard_needs_exact_name() {
        assert!(matches(&["*.add"], "math.add"));
        assert!(matches(&["*.add"], "mathematics.add"));
        assert!(matches(&["*.add"], "v2.users.add"));
        assert!(!matches(&["*.add"], "math.sub"));
        assert!(!matches(&["*.ad"], "math.add"));
    }

    #[test]
    fn anchored_regex_matches_exactly() {
        for action in ACTIONS {
            assert_eq!(matches(&[r"^math\.add$"], action), action == "math.add");
        }
        assert!(matches(&[r"^math\.\w+$"], "math.sub"));
        assert!(!matches(&[r"^math$"], "math.add"));
    }

    #[test]
    fn unanchored_regex_matches_anywhere() {
        assert!(matches(&["users"], "users.list"));
        assert!(matches(&[r"math\.\w"], "math.add"));
        assert!(matches(&["list$"], "users.list"));
        assert!(!matches(&["^list"], "users.list"));
        assert!(!matches(&["orders"], "users.list"));
    }

    #[test]
    fn invalid_regex_is_skipped_not_fatal() {
        let whitelist = Whitelist::new(&["(unclosed", "users.*"]);
        assert_eq!(whitelist.len(), 1);
        assert!(!matches(&["(unclosed"], "math.add"));
        assert!(matches(&["(unclosed", "users.*"], "users.list"));
    }

    #[test]
    fn empty_whitelist_excludes_everything() {
        let empty: [&str; 0] = [];
        for action in ACTIONS {
            assert!(!matches(&empty, action));
        }
        assert!(Whitelist::new(&empty).is_empty());
    }

    #[test]
    fn first_matching_rule_wins_across_list() {
        assert!(matches(&["users.*", "*.sub"], "math.sub"));
        assert!(!matches(&["users.*", "*.sub"], "math.add"));
    }

    #[test]
    fn default_whitelist_accepts_all() {
        let Some(name) = ActionName::parse("any.thing") else {
            return;
        };
        assert!(Whitelist::default().matches(&name));
    }
}
