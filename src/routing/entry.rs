//! Route entries: a method filter, a compiled pattern and a handler.
//!
//! The same entry type backs both plugins and terminal routes; only the
//! handler type differs.

use std::fmt;
use std::str::FromStr;

use axum::http::Method;
use thiserror::Error;

use crate::context::Params;
use crate::routing::pattern::{PathPattern, PatternError, PatternMatch};

/// Methods a route can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    /// Matches every request method.
    Any,
}

impl RouteMethod {
    /// Returns true if a request with `method` is accepted by this filter.
    pub fn accepts(&self, method: &Method) -> bool {
        match self {
            RouteMethod::Any => true,
            RouteMethod::Get => *method == Method::GET,
            RouteMethod::Head => *method == Method::HEAD,
            RouteMethod::Post => *method == Method::POST,
            RouteMethod::Put => *method == Method::PUT,
            RouteMethod::Delete => *method == Method::DELETE,
            RouteMethod::Patch => *method == Method::PATCH,
            RouteMethod::Options => *method == Method::OPTIONS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteMethod::Get => "GET",
            RouteMethod::Head => "HEAD",
            RouteMethod::Post => "POST",
            RouteMethod::Put => "PUT",
            RouteMethod::Delete => "DELETE",
            RouteMethod::Patch => "PATCH",
            RouteMethod::Options => "OPTIONS",
            RouteMethod::Any => "ANY",
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown route method `{0}`")]
pub struct UnknownMethod(pub String);

impl FromStr for RouteMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(RouteMethod::Get),
            "HEAD" => Ok(RouteMethod::Head),
            "POST" => Ok(RouteMethod::Post),
            "PUT" => Ok(RouteMethod::Put),
            "DELETE" => Ok(RouteMethod::Delete),
            "PATCH" => Ok(RouteMethod::Patch),
            "OPTIONS" => Ok(RouteMethod::Options),
            "ANY" => Ok(RouteMethod::Any),
            _ => Err(UnknownMethod(s.to_string())),
        }
    }
}

/// A registered plugin or route. Immutable once built.
pub struct RouteEntry<H> {
    method: RouteMethod,
    template: String,
    pattern: PathPattern,
    handler: H,
}

impl<H> RouteEntry<H> {
    pub fn new(method: RouteMethod, template: &str, handler: H) -> Result<Self, PatternError> {
        Ok(Self {
            method,
            template: template.to_string(),
            pattern: PathPattern::compile(template)?,
            handler,
        })
    }

    pub fn method(&self) -> RouteMethod {
        self.method
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Ordered placeholder names of the template.
    pub fn parameters(&self) -> &[String] {
        self.pattern.names()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Match a request, returning the extracted params on success.
    ///
    /// The wildcard template accepts every method and path. Everything else
    /// needs a full pattern match (with the declared capture count) and an
    /// accepted method.
    pub fn matches(&self, method: &Method, url: &str) -> Option<Params> {
        if self.pattern.is_wildcard() {
            return Some(Params::default());
        }
        match self.pattern.match_path(url) {
            PatternMatch::Matched(params) if self.method.accepts(method) => Some(params),
            _ => None,
        }
    }
}

impl<H> fmt::Debug for RouteEntry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("method", &self.method)
            .field("template", &self.template)
            .field("parameters", &self.parameters())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_filter() {
        assert!(RouteMethod::Any.accepts(&Method::DELETE));
        assert!(RouteMethod::Get.accepts(&Method::GET));
        assert!(!RouteMethod::Get.accepts(&Method::POST));
        assert!(!RouteMethod::Options.accepts(&Method::TRACE));
    }

    #[test]
    fn test_method_parse_round_trip() {
        for name in ["GET", "head", "Post", "PUT", "DELETE", "PATCH", "OPTIONS", "ANY"] {
            let method: RouteMethod = name.parse().unwrap();
            assert_eq!(method.as_str(), name.to_ascii_uppercase());
        }
        assert!("TRACE".parse::<RouteMethod>().is_err());
    }

    #[test]
    fn test_entry_matches_method_and_path() {
        let entry = RouteEntry::new(RouteMethod::Get, "/user/:id", ()).unwrap();
        assert_eq!(entry.parameters(), ["id"]);

        let params = entry.matches(&Method::GET, "/user/7").unwrap();
        assert_eq!(params.get("id"), Some("7"));

        assert!(entry.matches(&Method::POST, "/user/7").is_none());
        assert!(entry.matches(&Method::GET, "/account/7").is_none());
    }

    #[test]
    fn test_wildcard_entry_ignores_method() {
        let entry = RouteEntry::new(RouteMethod::Get, "/*", ()).unwrap();
        assert!(entry.matches(&Method::POST, "/anything").is_some());
    }
}
