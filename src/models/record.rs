use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single hit as returned by the search backend
///
/// The raw field map is kept as-is. Accessors derive the movie fields on demand and
/// return `None` for anything missing or malformed instead of failing the whole page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Raw access to any retrieved attribute
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn object_id(&self) -> Option<&str> {
        self.get("objectID").and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.get("title").and_then(Value::as_str)
    }

    /// Backend-highlighted markup for an attribute, e.g. `The <em>Matrix</em>`
    pub fn highlighted(&self, attribute: &str) -> Option<&str> {
        self.get("_highlightResult")?
            .get(attribute)?
            .get("value")?
            .as_str()
    }

    /// Highlighted title, falling back to the plain title when the backend sent no markup
    pub fn highlighted_title(&self) -> Option<&str> {
        self.highlighted("title").or_else(|| self.title())
    }

    /// Release year; some indexes store it as a string
    pub fn year(&self) -> Option<i32> {
        match self.get("year")? {
            Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn rating(&self) -> Option<u32> {
        self.get("rating")
            .and_then(Value::as_u64)
            .and_then(|r| u32::try_from(r).ok())
    }

    /// Poster reference, only when it parses as an absolute URL
    pub fn image_url(&self) -> Option<Url> {
        self.get("image")
            .and_then(Value::as_str)
            .and_then(|s| Url::parse(s).ok())
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self(fields),
            _ => Self::default(),
        }
    }
}
