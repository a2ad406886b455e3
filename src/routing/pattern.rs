//! Path template compilation and matching.
//!
//! # Responsibilities
//! - Compile a `/`-delimited template with `:name` placeholders into a regex
//! - Record placeholder names in declaration order
//! - Match a concrete path (query suffix stripped) and extract captures
//!
//! # Design Decisions
//! - Literal text is escaped; only placeholders become regex syntax
//! - A placeholder captures one or more characters other than `/`, `:` and `?`
//! - The compiled pattern is anchored at both ends and tolerates one trailing slash
//! - `/*` is not compiled at all: it matches everything

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::context::Params;

/// Template that matches every path and method.
pub const WILDCARD: &str = "/*";

/// Error raised when a template cannot be compiled.
#[derive(Debug, Error)]
pub enum PatternError {
    /// The generated regex was rejected (e.g. a placeholder name used twice).
    #[error("invalid path template `{template}`: {source}")]
    Regex {
        template: String,
        #[source]
        source: regex::Error,
    },
}

/// Outcome of matching a path against a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternMatch {
    /// The path does not fit the template.
    NoMatch,
    /// The path fits, but the number of captures differs from the declared names.
    /// Only reachable for a hand-built `Compiled` pattern; `compile` keeps them in step.
    CountMismatch { expected: usize, found: usize },
    /// The path fits; captures in placeholder order.
    Matched(Params),
}

impl PatternMatch {
    /// Collapse to the params of a successful match.
    pub fn into_params(self) -> Option<Params> {
        match self {
            PatternMatch::Matched(params) => Some(params),
            _ => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, PatternMatch::Matched(_))
    }
}

/// A compiled path template.
#[derive(Debug, Clone)]
pub enum PathPattern {
    /// The `/*` template.
    Wildcard,
    /// A regex-backed template with its ordered placeholder names.
    Compiled { regex: Regex, names: Vec<String> },
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r":([a-zA-Z]+)").expect("placeholder regex is valid"))
}

impl PathPattern {
    /// Compile a template.
    ///
    /// `/user/:id` becomes `^/user/(?P<id>[^/:?]+?)/?$` with names `["id"]`.
    pub fn compile(template: &str) -> Result<Self, PatternError> {
        if template == WILDCARD {
            return Ok(PathPattern::Wildcard);
        }

        let mut source = String::with_capacity(template.len() + 16);
        let mut names = Vec::new();
        let mut last = 0;

        source.push('^');
        for caps in placeholder().captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            source.push_str(&regex::escape(&template[last..whole.start()]));
            source.push_str(&format!("(?P<{}>[^/:?]+?)", name.as_str()));
            names.push(name.as_str().to_string());
            last = whole.end();
        }
        source.push_str(&regex::escape(&template[last..]));
        source.push_str("/?$");

        let regex = Regex::new(&source).map_err(|source| PatternError::Regex {
            template: template.to_string(),
            source,
        })?;

        Ok(PathPattern::Compiled { regex, names })
    }

    /// Placeholder names in declaration order (empty for the wildcard).
    pub fn names(&self) -> &[String] {
        match self {
            PathPattern::Wildcard => &[],
            PathPattern::Compiled { names, .. } => names,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, PathPattern::Wildcard)
    }

    /// Match a request URL (path plus optional query).
    pub fn match_path(&self, url: &str) -> PatternMatch {
        let (regex, names) = match self {
            PathPattern::Wildcard => return PatternMatch::Matched(Params::default()),
            PathPattern::Compiled { regex, names } => (regex, names),
        };

        let path = strip_query(url);
        let Some(caps) = regex.captures(path) else {
            return PatternMatch::NoMatch;
        };

        let mut params = Params::default();
        for name in names {
            if let Some(value) = caps.name(name) {
                params.push(name.clone(), value.as_str().to_string());
            }
        }

        if params.len() != names.len() {
            return PatternMatch::CountMismatch {
                expected: names.len(),
                found: params.len(),
            };
        }

        PatternMatch::Matched(params)
    }
}

/// Drop the `?query` suffix of a URL. A URL that is nothing but a query is kept whole.
pub fn strip_query(url: &str) -> &str {
    match url.split('?').next() {
        Some(path) if !path.is_empty() => path,
        _ => url,
    }
}
