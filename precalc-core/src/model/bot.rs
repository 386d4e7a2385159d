//! Bots and their tags.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix that marks a tag value as a formula.
pub const FORMULA_PREFIX: char = '=';

/// Raw tag values of a bot, in insertion order.
pub type Tags = IndexMap<String, Value>;

/// Check whether a raw tag value is a formula.
///
/// Returns the formula source (the text after the prefix) if it is.
pub fn is_formula(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => s.strip_prefix(FORMULA_PREFIX),
        _ => None,
    }
}

/// An entity with an id and a set of named tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    /// Unique identifier of the bot.
    pub id: String,

    /// Raw tag values. A `null` value is treated the same as a missing tag.
    #[serde(default)]
    pub tags: Tags,
}

impl Bot {
    /// Create a bot with no tags.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tags: Tags::new(),
        }
    }

    /// Builder-style helper to set a tag.
    pub fn with_tag(mut self, tag: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.insert(tag.into(), value.into());
        self
    }

    /// Get the raw value of a tag, ignoring `null` values.
    pub fn tag(&self, tag: &str) -> Option<&Value> {
        self.tags.get(tag).filter(|value| !value.is_null())
    }

    /// Names of the tags that are present (non-null) on this bot.
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, _)| name.as_str())
    }

    /// Iterate over the formula-valued tags as `(tag, source)` pairs.
    pub fn formulas(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags
            .iter()
            .filter_map(|(name, value)| is_formula(value).map(|source| (name.as_str(), source)))
    }
}

/// A bot whose tags have changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedBot {
    /// The bot with its new tag values. Cleared tags are missing or `null`.
    pub bot: Bot,

    /// Names of the tags that changed.
    pub tags: Vec<String>,
}

impl UpdatedBot {
    pub fn new<I, S>(bot: Bot, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bot,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}
