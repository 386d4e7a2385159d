//! Graph Indices
//!
//! All lookup tables owned by a [`DependencyGraph`](super::DependencyGraph).
//! Everything in here is derived from the bots that were added plus the
//! dependency extractor, so the whole structure could be rebuilt from
//! scratch at any time.
//!
//! Empty inner containers are always pruned. That keeps the invariant that
//! adding a bot and removing it again leaves the indices equal to what they
//! were before.

use indexmap::{IndexMap, IndexSet};

use super::dependency::{Dependencies, Dependency};
use crate::model::AffectedMap;

/// Tag name → dependencies of each formula tag on a bot.
pub type BotDependencies = IndexMap<String, Dependencies>;

/// Bot id → dependent tag names on that bot.
pub type Dependents = IndexMap<String, IndexSet<String>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphIndices {
    /// Tag name → ids of the bots that carry it.
    ///
    /// A list rather than a set: re-adding a bot without removing it first
    /// records its id again.
    pub(crate) tags: IndexMap<String, Vec<String>>,

    /// Bot id → tag names present on it.
    pub(crate) bot_tags: IndexMap<String, Vec<String>>,

    /// Bot id → dependencies of its formula tags.
    pub(crate) bot_dependencies: IndexMap<String, BotDependencies>,

    /// Tag name → bots whose formulas depend on that tag.
    pub(crate) dependents: IndexMap<String, Dependents>,

    /// `(bot id, tag name)` → dependents scoped to a single bot's tag.
    ///
    /// Consulted on every lookup. No write path populates it.
    pub(crate) scoped_dependents: IndexMap<(String, String), Dependents>,

    /// Bot id → formula tags with an [`Dependency::All`] descriptor.
    pub(crate) all: IndexMap<String, IndexSet<String>>,
}

impl GraphIndices {
    /// Record that `bot_id` carries `tag`.
    pub(crate) fn add_tag(&mut self, bot_id: &str, tag: &str) {
        self.tags
            .entry(tag.to_owned())
            .or_default()
            .push(bot_id.to_owned());
        self.bot_tags
            .entry(bot_id.to_owned())
            .or_default()
            .push(tag.to_owned());
    }

    /// Forget that `bot_id` carries `tag`.
    pub(crate) fn remove_tag(&mut self, bot_id: &str, tag: &str) {
        if let Some(bots) = self.tags.get_mut(tag) {
            bots.retain(|id| id != bot_id);
            if bots.is_empty() {
                self.tags.shift_remove(tag);
            }
        }
        if let Some(tags) = self.bot_tags.get_mut(bot_id) {
            tags.retain(|t| t != tag);
        }
    }

    /// Remove `bot_id` from the tag index for every tag it carried.
    ///
    /// Returns the tags the bot used to carry.
    pub(crate) fn remove_bot_tags(&mut self, bot_id: &str) -> Vec<String> {
        let tags = self.bot_tags.shift_remove(bot_id).unwrap_or_default();
        for tag in &tags {
            if let Some(bots) = self.tags.get_mut(tag) {
                bots.retain(|id| id != bot_id);
                if bots.is_empty() {
                    self.tags.shift_remove(tag);
                }
            }
        }
        tags
    }

    /// Add the reverse edges for one formula tag.
    pub(crate) fn wire(&mut self, bot_id: &str, tag: &str, deps: &[Dependency]) {
        for dep in deps {
            match dep {
                Dependency::Tag(name) | Dependency::Bot(name) | Dependency::TagValue(name) => {
                    self.dependents
                        .entry(name.clone())
                        .or_default()
                        .entry(bot_id.to_owned())
                        .or_default()
                        .insert(tag.to_owned());
                }
                Dependency::This => {}
                Dependency::All => {
                    self.all
                        .entry(bot_id.to_owned())
                        .or_default()
                        .insert(tag.to_owned());
                }
            }
        }
    }

    /// Remove the reverse edges for one formula tag. Mirrors [`wire`](Self::wire).
    pub(crate) fn unwire(&mut self, bot_id: &str, tag: &str, deps: &[Dependency]) {
        for dep in deps {
            match dep {
                Dependency::Tag(name) | Dependency::Bot(name) | Dependency::TagValue(name) => {
                    let Some(by_bot) = self.dependents.get_mut(name.as_str()) else {
                        continue;
                    };
                    if let Some(tags) = by_bot.get_mut(bot_id) {
                        tags.shift_remove(tag);
                        if tags.is_empty() {
                            by_bot.shift_remove(bot_id);
                        }
                    }
                    if by_bot.is_empty() {
                        self.dependents.shift_remove(name.as_str());
                    }
                }
                Dependency::This => {}
                Dependency::All => {
                    if let Some(tags) = self.all.get_mut(bot_id) {
                        tags.shift_remove(tag);
                        if tags.is_empty() {
                            self.all.shift_remove(bot_id);
                        }
                    }
                }
            }
        }
    }

    /// Drop the dependencies of one tag, unwiring its edges.
    pub(crate) fn clear_tag_dependencies(&mut self, bot_id: &str, tag: &str) {
        let Some(deps) = self
            .bot_dependencies
            .get_mut(bot_id)
            .and_then(|by_tag| by_tag.shift_remove(tag))
        else {
            return;
        };
        self.unwire(bot_id, tag, &deps);
    }

    /// Drop every dependency a bot owns, unwiring all of its edges.
    pub(crate) fn clear_bot_dependencies(&mut self, bot_id: &str) {
        // Take the list out first so the reverse index can be mutated freely.
        let Some(by_tag) = self.bot_dependencies.shift_remove(bot_id) else {
            return;
        };
        for (tag, deps) in &by_tag {
            self.unwire(bot_id, tag, deps);
        }
    }

    /// Bots whose formulas depend on `tag`.
    ///
    /// When `bot_id` is given, dependents scoped to that bot's tag are
    /// merged in.
    pub(crate) fn dependents_of(&self, tag: &str, bot_id: Option<&str>) -> AffectedMap {
        let mut result = AffectedMap::new();
        if let Some(by_bot) = self.dependents.get(tag) {
            for (dependent, tags) in by_bot {
                result.extend(dependent, tags);
            }
        }
        if let Some(bot_id) = bot_id {
            let key = (bot_id.to_owned(), tag.to_owned());
            if let Some(by_bot) = self.scoped_dependents.get(&key) {
                for (dependent, tags) in by_bot {
                    result.extend(dependent, tags);
                }
            }
        }
        result
    }

    /// Every formula tag with an [`Dependency::All`] descriptor.
    pub(crate) fn all_dependents(&self) -> AffectedMap {
        let mut result = AffectedMap::new();
        for (bot_id, tags) in &self.all {
            result.extend(bot_id, tags);
        }
        result
    }

    /// True when no bot is indexed at all.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.bot_tags.is_empty()
            && self.bot_dependencies.is_empty()
            && self.dependents.is_empty()
            && self.scoped_dependents.is_empty()
            && self.all.is_empty()
    }
}
