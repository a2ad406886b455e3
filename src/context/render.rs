//! Views for `RequestContext::render`.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::dispatch::BoxError;

/// Anything that renders to an HTML string.
pub trait Render {
    fn render(&self) -> Result<String, BoxError>;
}

/// A string template with `{{ key }}` placeholders.
///
/// String values are inserted as-is, other JSON values in their JSON form,
/// unknown keys as nothing.
#[derive(Debug, Clone, Default)]
pub struct Template {
    template: String,
    placeholders: Map<String, Value>,
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("template regex is valid")
    })
}

impl Template {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            placeholders: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.placeholders.insert(key.into(), value.into());
        self
    }

    pub fn with_placeholders(mut self, placeholders: Map<String, Value>) -> Self {
        self.placeholders.extend(placeholders);
        self
    }
}

impl Render for Template {
    fn render(&self) -> Result<String, BoxError> {
        let rendered = placeholder().replace_all(&self.template, |caps: &Captures<'_>| {
            match self.placeholders.get(&caps[1]) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            }
        });
        Ok(rendered.into_owned())
    }
}
