//! Route table.
//!
//! Patterns are slash-delimited; a segment written as `<name>` captures
//! exactly one non-empty path segment, every other segment must match
//! literally. Routes are tried in registration order and the first
//! structural match wins, so more specific patterns have to be registered
//! before more general ones when they could overlap.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::http::response::ResponseWriter;
use crate::http::{HttpMethod, http_method_from_str};
use crate::net::connection::Connection;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;

/// A route handler. `RouteArgs` is empty, never absent, when the pattern
/// has no captures.
pub type Handler =
    Arc<dyn Fn(&Connection, &mut ResponseWriter, &RouteArgs) -> HandlerResult + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("routes can only be bound to GET, POST, PUT or DELETE, not {0:?}")]
    UnsupportedMethod(String),

    #[error("invalid route pattern {0:?}: {1}")]
    InvalidPattern(String, &'static str),
}

/// A captured segment, coerced to an integer when it parses as one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RouteValue {
    Int(i64),
    Str(String),
}

impl RouteValue {
    fn from_segment(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(n) => RouteValue::Int(n),
            Err(_) => RouteValue::Str(raw.to_string()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            RouteValue::Int(n) => Some(*n),
            RouteValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RouteValue::Str(s) => Some(s),
            RouteValue::Int(_) => None,
        }
    }
}

impl fmt::Display for RouteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteValue::Int(n) => write!(f, "{}", n),
            RouteValue::Str(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RouteArgs {
    values: IndexMap<String, RouteValue>,
}

impl RouteArgs {
    pub fn get(&self, name: &str) -> Option<&RouteValue> {
        self.values.get(name)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(RouteValue::as_int)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(RouteValue::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
}

struct Route {
    pattern: String,
    method: HttpMethod,
    segments: Vec<Segment>,
    handler: Handler,
}

impl Route {
    fn compile(pattern: &str) -> Result<Vec<Segment>, RouteError> {
        let mut segments = Vec::new();
        for part in pattern.split('/').filter(|s| !s.is_empty()) {
            if let Some(name) = part.strip_prefix('<').and_then(|p| p.strip_suffix('>')) {
                if name.is_empty() {
                    return Err(RouteError::InvalidPattern(
                        pattern.to_string(),
                        "capture without a name",
                    ));
                }
                if segments.contains(&Segment::Capture(name.to_string())) {
                    return Err(RouteError::InvalidPattern(
                        pattern.to_string(),
                        "capture name used twice",
                    ));
                }
                segments.push(Segment::Capture(name.to_string()));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }
        Ok(segments)
    }

    fn matches(&self, parts: &[&str]) -> Option<RouteArgs> {
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut args = RouteArgs::default();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Capture(name) if !part.is_empty() => {
                    args.values
                        .insert(name.clone(), RouteValue::from_segment(part));
                }
                _ => return None,
            }
        }
        Some(args)
    }
}

/// Splits a request path into segments, ignoring one trailing slash.
fn path_segments(path: &str) -> Vec<&str> {
    let path = path.strip_suffix('/').unwrap_or(path);
    let path = path.strip_prefix('/').unwrap_or(path);
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').collect()
    }
}

pub struct RouteMatch {
    pub pattern: String,
    pub handler: Handler,
    pub args: RouteArgs,
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("pattern", &self.pattern)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Compiles `pattern` and binds it to `handler` for `method`
    /// (case-insensitive). A later registration of the same pattern and
    /// method is shadowed by the earlier one.
    pub fn register<F>(
        &mut self,
        pattern: &str,
        method: &str,
        handler: F,
    ) -> Result<&mut Self, RouteError>
    where
        F: Fn(&Connection, &mut ResponseWriter, &RouteArgs) -> HandlerResult
            + Send
            + Sync
            + 'static,
    {
        let method_enum = http_method_from_str(method);
        if !method_enum.is_routable() {
            return Err(RouteError::UnsupportedMethod(method.to_string()));
        }

        let segments = Route::compile(pattern)?;
        self.routes.push(Route {
            pattern: pattern.to_string(),
            method: method_enum,
            segments,
            handler: Arc::new(handler),
        });
        Ok(self)
    }

    pub fn lookup(&self, path: &str, method: &HttpMethod) -> Option<RouteMatch> {
        let parts = path_segments(path);
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                route.matches(&parts).map(|args| RouteMatch {
                    pattern: route.pattern.clone(),
                    handler: Arc::clone(&route.handler),
                    args,
                })
            })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &Connection, _: &mut ResponseWriter, _: &RouteArgs) -> HandlerResult {
        Ok(())
    }

    fn table() -> RouteTable {
        let mut routes = RouteTable::new();
        routes
            .register("/edit/<index>/abc/<foo>", "GET", noop)
            .unwrap()
            .register("/edit/<index>", "GET", noop)
            .unwrap()
            .register("/edit", "get", noop)
            .unwrap()
            .register("/edit", "POST", noop)
            .unwrap()
            .register("/", "GET", noop)
            .unwrap();
        routes
    }

    #[test]
    fn test_captures_are_coerced() {
        let routes = table();

        let m = routes.lookup("/edit/123/abc/bar", &HttpMethod::Get).unwrap();
        assert_eq!(m.pattern, "/edit/<index>/abc/<foo>");
        assert_eq!(m.args.get_int("index"), Some(123));
        assert_eq!(m.args.get_str("foo"), Some("bar"));

        let m = routes.lookup("/edit/-7", &HttpMethod::Get).unwrap();
        assert_eq!(m.args.get("index"), Some(&RouteValue::Int(-7)));

        let m = routes.lookup("/edit/12ab", &HttpMethod::Get).unwrap();
        assert_eq!(m.args.get("index"), Some(&RouteValue::Str("12ab".into())));

        let m = routes.lookup("/edit", &HttpMethod::Get).unwrap();
        assert!(m.args.is_empty());
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let routes = table();
        let a = routes.lookup("/edit/5/", &HttpMethod::Get).unwrap();
        let b = routes.lookup("/edit/5", &HttpMethod::Get).unwrap();
        assert_eq!(a.pattern, b.pattern);
        assert_eq!(a.args, b.args);
        assert_eq!(routes.lookup("/", &HttpMethod::Get).unwrap().pattern, "/");
    }

    #[test]
    fn test_structural_mismatches() {
        let routes = table();
        assert!(routes.lookup("/edit/1/xyz/bar", &HttpMethod::Get).is_none());
        assert!(routes.lookup("/edit/1/abc/bar/more", &HttpMethod::Get).is_none());
        assert!(routes.lookup("/edit//", &HttpMethod::Get).is_none());
        assert!(routes.lookup("/EDIT", &HttpMethod::Get).is_none());
    }

    #[test]
    fn test_method_must_match_exactly() {
        let routes = table();
        assert!(routes.lookup("/edit", &HttpMethod::Post).is_some());
        assert!(routes.lookup("/edit/1", &HttpMethod::Post).is_none());
        assert!(routes.lookup("/edit", &HttpMethod::Head).is_none());
    }

    #[test]
    fn test_first_registration_wins() {
        let mut routes = RouteTable::new();
        routes
            .register("/item/<id>", "GET", noop)
            .unwrap()
            .register("/item/<name>", "GET", noop)
            .unwrap();
        let m = routes.lookup("/item/42", &HttpMethod::Get).unwrap();
        assert_eq!(m.pattern, "/item/<id>");
        assert!(m.args.contains("id"));
    }

    #[test]
    fn test_registration_errors() {
        let mut routes = RouteTable::new();
        assert_eq!(
            routes.register("/x", "PATCH", noop).err(),
            Some(RouteError::UnsupportedMethod("PATCH".into()))
        );
        assert!(matches!(
            routes.register("/x/<>", "GET", noop),
            Err(RouteError::InvalidPattern(..))
        ));
        assert!(matches!(
            routes.register("/x/<a>/<a>", "GET", noop),
            Err(RouteError::InvalidPattern(..))
        ));
        assert!(routes.is_empty());
    }
}
