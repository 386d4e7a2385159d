//! Dependency Graph
//!
//! [`DependencyGraph`] keeps the indices for every tracked bot and answers
//! which (bot, tag) pairs are affected by each lifecycle event.
//!
//! The three lifecycle operations deliberately differ:
//!
//! - Adding a bot notifies the dependents of every tag it carries, but
//!   never the bot itself.
//! - Removing bots notifies the dependents of every tag they carried, minus
//!   all bots removed in the same call.
//! - Updating a bot flags its own changed tags plus their dependents, then
//!   runs the bounded closure in [`propagation`](super::propagation). Add and
//!   remove never run the closure.
//!
//! Formulas with an [`Dependency::All`](super::Dependency::All) descriptor
//! are part of every result.

use indexmap::IndexSet;
use tracing::{debug, warn};

use super::dependency::{DependencyExtractor, FormulaDependencyExtractor};
use super::index::{BotDependencies, GraphIndices};
use super::propagation::propagate;
use crate::config::{DuplicateAddPolicy, GraphConfig};
use crate::model::{is_formula, AffectedMap, Bot, UpdatedBot};

/// Tracks formula dependencies between bot tags.
///
/// All state lives in the instance; two graphs never share anything.
#[derive(Debug, Clone)]
pub struct DependencyGraph<X = FormulaDependencyExtractor> {
    extractor: X,
    config: GraphConfig,
    indices: GraphIndices,
}

impl DependencyGraph {
    /// Create an empty graph using the built-in formula extractor.
    pub fn new() -> Self {
        Self::with_extractor(FormulaDependencyExtractor)
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl<X: DependencyExtractor> DependencyGraph<X> {
    /// Create an empty graph using a custom extractor.
    pub fn with_extractor(extractor: X) -> Self {
        Self::with_config(extractor, GraphConfig::default())
    }

    pub fn with_config(extractor: X, config: GraphConfig) -> Self {
        Self {
            extractor,
            config,
            indices: GraphIndices::default(),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Register a bot.
    ///
    /// Returns the pairs on other bots that must be recomputed because they
    /// reference a tag this bot carries.
    pub fn add_bot(&mut self, bot: &Bot) -> AffectedMap {
        if self.is_tracked(&bot.id) {
            match self.config.duplicate_add {
                DuplicateAddPolicy::Upsert => {
                    debug!(bot_id = %bot.id, "replacing existing registration");
                    self.purge(&bot.id);
                }
                DuplicateAddPolicy::Accumulate => {
                    // Tag membership accumulates, edges do not: the new
                    // dependency map replaces the old one, so its edges go too.
                    debug!(bot_id = %bot.id, "registering bot again");
                    self.indices.clear_bot_dependencies(&bot.id);
                }
            }
        }

        self.indices.bot_tags.entry(bot.id.clone()).or_default();
        for tag in bot.tag_names() {
            self.indices.add_tag(&bot.id, tag);
        }

        let mut deps = BotDependencies::new();
        for (tag, source) in bot.formulas() {
            let extracted = self.extractor.extract(source);
            self.indices.wire(&bot.id, tag, &extracted);
            deps.insert(tag.to_owned(), extracted);
        }
        self.indices.bot_dependencies.insert(bot.id.clone(), deps);

        let mut affected = AffectedMap::new();
        for tag in bot.tag_names() {
            affected.merge(&self.indices.dependents_of(tag, Some(&bot.id)));
        }
        affected.merge(&self.indices.all_dependents());
        affected.remove_bot(&bot.id);

        debug!(bot_id = %bot.id, affected = affected.len(), "added bot");
        affected
    }

    /// Register several bots. The result is the union of each addition.
    pub fn add_bots<'a, I>(&mut self, bots: I) -> AffectedMap
    where
        I: IntoIterator<Item = &'a Bot>,
    {
        let mut affected = AffectedMap::new();
        for bot in bots {
            affected.merge(&self.add_bot(bot));
        }
        affected
    }

    /// Unregister a bot. Unknown ids are ignored.
    pub fn remove_bot(&mut self, bot_id: &str) -> AffectedMap {
        self.remove_bots([bot_id])
    }

    /// Unregister several bots.
    ///
    /// None of the removed bots appear in the result, even when one of them
    /// depended on a tag another one carried.
    pub fn remove_bots<I, S>(&mut self, bot_ids: I) -> AffectedMap
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let bot_ids: Vec<S> = bot_ids.into_iter().collect();
        let mut affected = AffectedMap::new();
        let mut removed = 0;

        for bot_id in &bot_ids {
            let bot_id = bot_id.as_ref();
            if !self.is_tracked(bot_id) {
                debug!(bot_id, "ignoring removal of untracked bot");
                continue;
            }
            let tags = self.purge(bot_id);
            for tag in &tags {
                affected.merge(&self.indices.dependents_of(tag, Some(bot_id)));
            }
            removed += 1;
        }

        if removed == 0 {
            return affected;
        }
        affected.merge(&self.indices.all_dependents());
        for bot_id in &bot_ids {
            affected.remove_bot(bot_id.as_ref());
        }

        debug!(removed, affected = affected.len(), "removed bots");
        affected
    }

    /// Apply a change to a tracked bot.
    ///
    /// Updating a bot that was never added is tolerated: it is logged and
    /// nothing is affected.
    pub fn update_bot(&mut self, update: &UpdatedBot) -> AffectedMap {
        let bot = &update.bot;
        if !self.is_tracked(&bot.id) {
            warn!(bot_id = %bot.id, "update for a bot that was never added");
            return AffectedMap::new();
        }

        for tag in &update.tags {
            self.refresh_tag(bot, tag);
        }

        let mut affected = AffectedMap::new();
        affected.extend(&bot.id, &update.tags);
        for tag in &update.tags {
            affected.merge(&self.indices.dependents_of(tag, Some(&bot.id)));
        }
        affected.merge(&self.indices.all_dependents());

        let seen: IndexSet<String> = update.tags.iter().cloned().collect();
        let rounds = propagate(&self.indices, &bot.id, &mut affected, seen);

        debug!(
            bot_id = %bot.id,
            changed = update.tags.len(),
            affected = affected.len(),
            rounds,
            "updated bot"
        );
        affected
    }

    /// Apply several updates.
    ///
    /// Each update runs its own closure; the closure is not re-run over the
    /// combined result.
    pub fn update_bots<'a, I>(&mut self, updates: I) -> AffectedMap
    where
        I: IntoIterator<Item = &'a UpdatedBot>,
    {
        let mut affected = AffectedMap::new();
        for update in updates {
            affected.merge(&self.update_bot(update));
        }
        affected
    }

    /// Whether the bot has been added and not removed.
    pub fn is_tracked(&self, bot_id: &str) -> bool {
        self.indices.bot_tags.contains_key(bot_id)
    }

    /// Tags present on a tracked bot.
    pub fn tags_of(&self, bot_id: &str) -> Option<&[String]> {
        self.indices.bot_tags.get(bot_id).map(Vec::as_slice)
    }

    /// Ids of the bots carrying a tag.
    pub fn bots_with_tag(&self, tag: &str) -> Option<&[String]> {
        self.indices.tags.get(tag).map(Vec::as_slice)
    }

    /// Dependencies of a bot's formula tags.
    ///
    /// `None` for untracked bots, an empty map for bots without formulas.
    pub fn dependencies_of(&self, bot_id: &str) -> Option<&BotDependencies> {
        self.indices.bot_dependencies.get(bot_id)
    }

    /// Formula tags that depend on `tag`, optionally including the
    /// dependents scoped to `bot_id`'s copy of the tag.
    pub fn dependents_of(&self, tag: &str, bot_id: Option<&str>) -> AffectedMap {
        self.indices.dependents_of(tag, bot_id)
    }

    /// Every formula tag whose dependencies could not be resolved.
    pub fn all_dependents(&self) -> AffectedMap {
        self.indices.all_dependents()
    }

    /// Read-only view of the raw indices.
    pub fn indices(&self) -> &GraphIndices {
        &self.indices
    }

    /// Bring one tag of a tracked bot in line with its new value.
    fn refresh_tag(&mut self, bot: &Bot, tag: &str) {
        let present = self
            .indices
            .bot_tags
            .get(&bot.id)
            .is_some_and(|tags| tags.iter().any(|t| t == tag));

        match bot.tag(tag) {
            Some(_) if !present => self.indices.add_tag(&bot.id, tag),
            None if present => self.indices.remove_tag(&bot.id, tag),
            _ => {}
        }

        self.indices.clear_tag_dependencies(&bot.id, tag);
        if let Some(source) = bot.tag(tag).and_then(is_formula) {
            let extracted = self.extractor.extract(source);
            self.indices.wire(&bot.id, tag, &extracted);
            self.indices
                .bot_dependencies
                .entry(bot.id.clone())
                .or_default()
                .insert(tag.to_owned(), extracted);
        }
    }

    /// Remove every index entry owned by a bot. Returns the tags it carried.
    fn purge(&mut self, bot_id: &str) -> Vec<String> {
        self.indices.clear_bot_dependencies(bot_id);
        self.indices.all.shift_remove(bot_id);
        self.indices.remove_bot_tags(bot_id)
    }
}
