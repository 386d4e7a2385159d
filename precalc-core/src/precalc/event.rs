//! State Diff Events
//!
//! Every batch produces one [`StateUpdatedEvent`] describing what changed in
//! the snapshot. Consumers apply it to their own copy of the state:
//!
//! - added bots carry their full entry,
//! - updated bots carry only the raw tags and values that changed,
//! - removed bots map to `null`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::snapshot::{PrecalculatedBot, Values};
use crate::error::{PrecalcError, PrecalcResult};
use crate::model::Tags;

/// Full or partial snapshot entry carried by an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotPatch {
    /// Only set for newly added bots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Raw tags. Cleared tags appear as `null`.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub tags: Tags,

    /// Computed values. Cleared tags appear as `null`.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub values: Values,
}

impl From<&PrecalculatedBot> for BotPatch {
    fn from(entry: &PrecalculatedBot) -> Self {
        Self {
            id: Some(entry.bot.id.clone()),
            tags: entry.bot.tags.clone(),
            values: entry.values.clone(),
        }
    }
}

/// Diff emitted after each add/remove/update batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdatedEvent {
    /// Bot id → full entry, partial entry, or `None` for a removed bot.
    pub state: IndexMap<String, Option<BotPatch>>,
    pub added_bots: Vec<String>,
    pub removed_bots: Vec<String>,
    pub updated_bots: Vec<String>,
}

impl StateUpdatedEvent {
    /// True when the batch changed nothing.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
            && self.added_bots.is_empty()
            && self.removed_bots.is_empty()
            && self.updated_bots.is_empty()
    }

    /// Encode as JSON with camelCase keys.
    pub fn to_json(&self) -> PrecalcResult<String> {
        serde_json::to_string(self).map_err(PrecalcError::Json)
    }

    /// Encode as MessagePack with named fields.
    pub fn to_msgpack(&self) -> PrecalcResult<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Bot;
    use serde_json::{json, Value};

    fn sample() -> StateUpdatedEvent {
        let mut entry = PrecalculatedBot::new(Bot::new("a").with_tag("num", 2));
        entry.values.insert("num".into(), json!(2));

        let mut partial = BotPatch::default();
        partial.values.insert("sum".into(), Value::Null);

        let mut event = StateUpdatedEvent::default();
        event.state.insert("a".into(), Some(BotPatch::from(&entry)));
        event.state.insert("b".into(), Some(partial));
        event.state.insert("c".into(), None);
        event.added_bots.push("a".into());
        event.updated_bots.push("b".into());
        event.removed_bots.push("c".into());
        event
    }

    #[test]
    fn json_shape() {
        let json: Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            json!({
                "state": {
                    "a": { "id": "a", "tags": { "num": 2 }, "values": { "num": 2 } },
                    "b": { "values": { "sum": null } },
                    "c": null
                },
                "addedBots": ["a"],
                "removedBots": ["c"],
                "updatedBots": ["b"]
            })
        );
    }

    #[test]
    fn msgpack_decodes_to_the_same_event() {
        let event = sample();
        let bytes = event.to_msgpack().unwrap();
        let decoded: StateUpdatedEvent = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn default_event_is_empty() {
        assert!(StateUpdatedEvent::default().is_empty());
        assert!(!sample().is_empty());
    }
}
