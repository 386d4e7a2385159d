//! Evaluation Context
//!
//! The evaluator needs to see every known bot to resolve formulas such as
//! `getBots('name')`. A [`ContextProvider`] builds that view once per batch;
//! the engine hands the same context to every evaluation in the batch.
//!
//! The context is created after the batch's raw tags are in the snapshot
//! and before any value is computed, so formulas see the new raw data.

use indexmap::IndexMap;

use super::snapshot::PrecalculatedState;
use crate::model::Bot;

/// Builds the evaluation context for a batch.
pub trait ContextProvider {
    type Context;

    /// Build a context from the engine's current snapshot.
    fn create_context(&self, state: &PrecalculatedState) -> Self::Context;
}

/// Raw copy of every known bot, keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BotContext {
    pub bots: IndexMap<String, Bot>,
}

impl BotContext {
    pub fn bot(&self, id: &str) -> Option<&Bot> {
        self.bots.get(id)
    }

    /// Bots carrying a non-null value for `tag`.
    pub fn bots_with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Bot> + 'a {
        self.bots.values().filter(move |bot| bot.tag(tag).is_some())
    }
}

/// Provider that copies the raw tags of the snapshot into a [`BotContext`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotContextProvider;

impl ContextProvider for SnapshotContextProvider {
    type Context = BotContext;

    fn create_context(&self, state: &PrecalculatedState) -> BotContext {
        BotContext {
            bots: state
                .iter()
                .map(|(id, entry)| (id.clone(), entry.bot.clone()))
                .collect(),
        }
    }
}
