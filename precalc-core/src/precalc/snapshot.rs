//! Precalculated Snapshot
//!
//! The engine caches, for every tracked bot, its raw tags next to the
//! values the evaluator computed for them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{Bot, Tags};

/// Computed tag values. A cleared tag holds `null` instead of being removed.
pub type Values = IndexMap<String, Value>;

/// Bot id → snapshot entry, in insertion order.
pub type PrecalculatedState = IndexMap<String, PrecalculatedBot>;

/// A bot's raw tags together with their computed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecalculatedBot {
    #[serde(flatten)]
    pub bot: Bot,

    #[serde(default)]
    pub values: Values,
}

impl PrecalculatedBot {
    /// A snapshot entry with no computed values yet.
    ///
    /// `null` tags are dropped, the same as when an update clears them.
    pub fn new(mut bot: Bot) -> Self {
        bot.tags.retain(|_, value| !value.is_null());
        Self {
            bot,
            values: Values::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.bot.id
    }

    pub fn tags(&self) -> &Tags {
        &self.bot.tags
    }

    /// Computed value of a tag, `None` if it was never computed.
    pub fn value(&self, tag: &str) -> Option<&Value> {
        self.values.get(tag)
    }

    /// Overwrite the raw copy of one tag. Absent or `null` clears it.
    pub(crate) fn set_raw(&mut self, tag: &str, value: Option<&Value>) {
        match value.filter(|value| !value.is_null()) {
            Some(value) => {
                self.bot.tags.insert(tag.to_owned(), value.clone());
            }
            None => {
                self.bot.tags.shift_remove(tag);
            }
        }
    }
}
