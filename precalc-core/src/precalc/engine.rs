//! Precalculation Engine
//!
//! The engine owns the precalculated snapshot and keeps it in line with the
//! dependency graph.
//!
//! # How It Works
//!
//! For every batch the engine:
//!
//! 1. Applies the raw change to the snapshot.
//! 2. Asks the [`DependencyGraph`] which (bot, tag) pairs are affected.
//! 3. Builds one evaluation context for the batch.
//! 4. Recomputes only the affected pairs and merges the results into the
//!    existing entries.
//! 5. Emits a [`StateUpdatedEvent`] to every subscriber and returns it.
//!
//! Evaluation failures abort the batch by default and no event is emitted.
//! A failed add leaves both the snapshot and the graph as they were. A failed
//! remove or update keeps its raw changes, which the graph has already
//! applied, and only the recomputed values are missing.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use tracing::{debug, warn};

use super::context::ContextProvider;
use super::evaluator::Evaluator;
use super::event::{BotPatch, StateUpdatedEvent};
use super::snapshot::{PrecalculatedBot, PrecalculatedState, Values};
use super::subscriber::{Subscriber, SubscriberId};
use crate::config::{EngineConfig, EvaluationFailurePolicy};
use crate::error::{PrecalcError, PrecalcResult};
use crate::graph::{DependencyExtractor, DependencyGraph, FormulaDependencyExtractor};
use crate::model::{AffectedMap, Bot, UpdatedBot};

/// Keeps computed tag values up to date as bots change.
pub struct PrecalculationEngine<P, E, X = FormulaDependencyExtractor> {
    graph: DependencyGraph<X>,
    state: PrecalculatedState,
    provider: P,
    evaluator: E,
    config: EngineConfig,
    subscribers: Vec<Subscriber>,
}

impl<P, E> PrecalculationEngine<P, E>
where
    P: ContextProvider,
    E: Evaluator<Context = P::Context>,
{
    /// Create an engine with the built-in extractor and default settings.
    pub fn new(provider: P, evaluator: E) -> Self {
        Self::with_config(provider, evaluator, EngineConfig::default())
    }

    pub fn with_config(provider: P, evaluator: E, config: EngineConfig) -> Self {
        Self::with_extractor(provider, evaluator, FormulaDependencyExtractor, config)
    }
}

impl<P, E, X> PrecalculationEngine<P, E, X>
where
    P: ContextProvider,
    E: Evaluator<Context = P::Context>,
    X: DependencyExtractor,
{
    /// Create an engine around a custom dependency extractor.
    pub fn with_extractor(provider: P, evaluator: E, extractor: X, config: EngineConfig) -> Self {
        Self {
            graph: DependencyGraph::with_config(extractor, config.graph()),
            state: PrecalculatedState::new(),
            provider,
            evaluator,
            config,
            subscribers: Vec::new(),
        }
    }

    /// Add new bots and compute all of their tags.
    pub fn bots_added(&mut self, bots: &[Bot]) -> PrecalcResult<StateUpdatedEvent> {
        let mut replaced = Vec::with_capacity(bots.len());
        for bot in bots {
            let previous = self
                .state
                .insert(bot.id.clone(), PrecalculatedBot::new(bot.clone()));
            replaced.push((bot.id.clone(), previous));
        }

        // Evaluate before the graph sees the new bots so a failure can be undone.
        let context = self.provider.create_context(&self.state);
        let computed = match self.evaluate_new(&context, bots) {
            Ok(computed) => computed,
            Err(err) => {
                self.restore(replaced);
                return Err(err);
            }
        };
        for (id, values) in computed {
            if let Some(entry) = self.state.get_mut(&id) {
                entry.values = values;
            }
        }

        let mut affected = self.graph.add_bots(bots);
        let new_ids: IndexSet<&str> = bots.iter().map(|bot| bot.id.as_str()).collect();
        for id in &new_ids {
            affected.remove_bot(id);
        }
        let mut patches = self.recompute(&context, &affected)?;

        let mut event = StateUpdatedEvent::default();
        for id in &new_ids {
            if let Some(entry) = self.state.get(*id) {
                event.state.insert((*id).to_owned(), Some(BotPatch::from(entry)));
            }
        }
        event.added_bots = bots.iter().map(|bot| bot.id.clone()).collect();
        event.updated_bots = patches.keys().cloned().collect();
        for (id, patch) in patches.drain(..) {
            event.state.insert(id, Some(patch));
        }

        debug!(
            added = event.added_bots.len(),
            updated = event.updated_bots.len(),
            "bots added"
        );
        self.emit(&event);
        Ok(event)
    }

    /// Remove bots and recompute whatever depended on them.
    pub fn bots_removed<S: AsRef<str>>(&mut self, ids: &[S]) -> PrecalcResult<StateUpdatedEvent> {
        let ids: Vec<&str> = ids.iter().map(|id| id.as_ref()).collect();
        for id in &ids {
            self.state.shift_remove(*id);
        }

        let affected = self.graph.remove_bots(ids.iter().copied());
        let patches = if affected.is_empty() {
            IndexMap::new()
        } else {
            let context = self.provider.create_context(&self.state);
            self.recompute(&context, &affected)?
        };

        let mut event = StateUpdatedEvent::default();
        for id in &ids {
            event.state.insert((*id).to_owned(), None);
        }
        event.removed_bots = ids.iter().map(|id| (*id).to_owned()).collect();
        event.updated_bots = patches.keys().cloned().collect();
        event
            .state
            .extend(patches.into_iter().map(|(id, patch)| (id, Some(patch))));

        debug!(
            removed = event.removed_bots.len(),
            updated = event.updated_bots.len(),
            "bots removed"
        );
        self.emit(&event);
        Ok(event)
    }

    /// Apply tag changes and recompute only the flagged tags.
    pub fn bots_updated(&mut self, updates: &[UpdatedBot]) -> PrecalcResult<StateUpdatedEvent> {
        let affected = self.graph.update_bots(updates);

        let mut raw_patches: IndexMap<String, BotPatch> = IndexMap::new();
        for update in updates {
            let Some(entry) = self.state.get_mut(&update.bot.id) else {
                continue;
            };
            let patch = raw_patches.entry(update.bot.id.clone()).or_default();
            for tag in &update.tags {
                let raw = update.bot.tag(tag);
                entry.set_raw(tag, raw);
                patch
                    .tags
                    .insert(tag.clone(), raw.cloned().unwrap_or(Value::Null));
            }
        }

        let mut patches = if affected.is_empty() {
            IndexMap::new()
        } else {
            let context = self.provider.create_context(&self.state);
            self.recompute(&context, &affected)?
        };

        let mut event = StateUpdatedEvent::default();
        event.updated_bots = patches.keys().cloned().collect();
        for (id, raw) in raw_patches {
            let patch = patches.entry(id).or_default();
            patch.tags = raw.tags;
        }
        event
            .state
            .extend(patches.into_iter().map(|(id, patch)| (id, Some(patch))));

        debug!(
            updates = updates.len(),
            updated = event.updated_bots.len(),
            "bots updated"
        );
        self.emit(&event);
        Ok(event)
    }

    /// Register a listener for every emitted event.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriberId
    where
        F: Fn(&StateUpdatedEvent) + 'static,
    {
        let subscriber = Subscriber::new(listener);
        let id = subscriber.id();
        self.subscribers.push(subscriber);
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id() != id);
        self.subscribers.len() != before
    }

    /// The full precalculated snapshot.
    pub fn state(&self) -> &PrecalculatedState {
        &self.state
    }

    pub fn bot(&self, id: &str) -> Option<&PrecalculatedBot> {
        self.state.get(id)
    }

    pub fn graph(&self) -> &DependencyGraph<X> {
        &self.graph
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate every tag of the freshly inserted bots without writing to
    /// the snapshot.
    fn evaluate_new(
        &self,
        context: &P::Context,
        bots: &[Bot],
    ) -> PrecalcResult<Vec<(String, Values)>> {
        let mut computed = Vec::with_capacity(bots.len());
        for bot in bots {
            let Some(entry) = self.state.get(&bot.id) else {
                continue;
            };
            let mut values = Values::new();
            for (tag, raw) in entry.tags() {
                values.insert(tag.clone(), self.evaluate(context, &entry.bot, tag, raw)?);
            }
            computed.push((bot.id.clone(), values));
        }
        Ok(computed)
    }

    /// Undo the snapshot inserts of an aborted add, newest first.
    fn restore(&mut self, replaced: Vec<(String, Option<PrecalculatedBot>)>) {
        debug!(bots = replaced.len(), "rolling back aborted add");
        for (id, previous) in replaced.into_iter().rev() {
            match previous {
                Some(entry) => {
                    self.state.insert(id, entry);
                }
                None => {
                    self.state.shift_remove(&id);
                }
            }
        }
    }

    /// Recompute the affected pairs of bots still in the snapshot.
    ///
    /// Returns the changed values per bot in the affected map's order.
    fn recompute(
        &mut self,
        context: &P::Context,
        affected: &AffectedMap,
    ) -> PrecalcResult<IndexMap<String, BotPatch>> {
        let mut patches = IndexMap::new();

        for (bot_id, tags) in affected {
            let Some(entry) = self.state.get(bot_id) else {
                continue;
            };

            let mut values = Values::new();
            for tag in tags {
                let value = match entry.bot.tag(tag) {
                    Some(raw) => self.evaluate(context, &entry.bot, tag, raw)?,
                    None => Value::Null,
                };
                values.insert(tag.clone(), value);
            }

            if let Some(entry) = self.state.get_mut(bot_id) {
                entry
                    .values
                    .extend(values.iter().map(|(tag, value)| (tag.clone(), value.clone())));
            }
            patches.insert(
                bot_id.clone(),
                BotPatch {
                    values,
                    ..BotPatch::default()
                },
            );
        }

        Ok(patches)
    }

    fn evaluate(
        &self,
        context: &P::Context,
        bot: &Bot,
        tag: &str,
        raw: &Value,
    ) -> PrecalcResult<Value> {
        match self.evaluator.evaluate(context, bot, tag, raw) {
            Ok(value) => Ok(value),
            Err(source) => match self.config.evaluation_failure {
                EvaluationFailurePolicy::AbortBatch => Err(PrecalcError::Evaluation {
                    bot_id: bot.id.clone(),
                    tag: tag.to_owned(),
                    source,
                }),
                EvaluationFailurePolicy::IsolatePerTag => {
                    warn!(bot_id = %bot.id, tag, error = %source, "evaluation failed");
                    Ok(Value::Null)
                }
            },
        }
    }

    fn emit(&self, event: &StateUpdatedEvent) {
        for subscriber in &self.subscribers {
            subscriber.notify(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError;
    use crate::graph::Dependency;
    use crate::model::is_formula;
    use crate::precalc::{BotContext, SnapshotContextProvider};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Sums `getBotTagValues` inputs and counts `getBots` matches.
    #[derive(Default)]
    struct SumEvaluator {
        calls: RefCell<Vec<(String, String)>>,
    }

    impl Evaluator for SumEvaluator {
        type Context = BotContext;

        fn evaluate(
            &self,
            context: &BotContext,
            bot: &Bot,
            tag: &str,
            value: &Value,
        ) -> Result<Value, EvaluationError> {
            self.calls.borrow_mut().push((bot.id.clone(), tag.to_owned()));
            let Some(source) = is_formula(value) else {
                return Ok(value.clone());
            };
            if source == "fail" {
                return Err(EvaluationError::new("boom"));
            }
            let deps = FormulaDependencyExtractor.extract(source);
            Ok(match deps.first() {
                Some(Dependency::Tag(name)) => {
                    let sum: i64 = context
                        .bots_with_tag(name)
                        .filter_map(|bot| bot.tag(name).and_then(Value::as_i64))
                        .sum();
                    json!(sum)
                }
                Some(Dependency::Bot(name)) => json!(context.bots_with_tag(name).count()),
                _ => Value::Null,
            })
        }
    }

    type Engine = PrecalculationEngine<SnapshotContextProvider, SumEvaluator>;

    fn engine() -> Engine {
        PrecalculationEngine::new(SnapshotContextProvider, SumEvaluator::default())
    }

    fn calls(engine: &Engine) -> Vec<(String, String)> {
        engine.evaluator().calls.borrow().clone()
    }

    fn pair(bot: &str, tag: &str) -> (String, String) {
        (bot.to_owned(), tag.to_owned())
    }

    #[test]
    fn added_bots_compute_every_tag() {
        let mut engine = engine();
        let event = engine
            .bots_added(&[Bot::new("a").with_tag("num", 3).with_tag("label", "x")])
            .unwrap();

        assert_eq!(event.added_bots, vec!["a"]);
        assert!(event.updated_bots.is_empty());
        assert!(event.removed_bots.is_empty());
        let entry = engine.bot("a").unwrap();
        assert_eq!(entry.value("num"), Some(&json!(3)));
        assert_eq!(entry.value("label"), Some(&json!("x")));
    }

    #[test]
    fn added_bot_refreshes_dependents() {
        let mut engine = engine();
        engine
            .bots_added(&[Bot::new("a").with_tag("sum", "=getBotTagValues('num')")])
            .unwrap();
        assert_eq!(engine.bot("a").unwrap().value("sum"), Some(&json!(0)));

        let event = engine.bots_added(&[Bot::new("b").with_tag("num", 2)]).unwrap();

        assert_eq!(event.added_bots, vec!["b"]);
        assert_eq!(event.updated_bots, vec!["a"]);
        assert_eq!(engine.bot("a").unwrap().value("sum"), Some(&json!(2)));
        let patch = event.state["a"].as_ref().unwrap();
        assert!(patch.id.is_none());
        assert_eq!(patch.values["sum"], json!(2));
    }

    #[test]
    fn removed_bots_refresh_dependents() {
        let mut engine = engine();
        engine
            .bots_added(&[
                Bot::new("a").with_tag("count", "=getBots('name')"),
                Bot::new("b").with_tag("name", "b"),
            ])
            .unwrap();
        assert_eq!(engine.bot("a").unwrap().value("count"), Some(&json!(1)));

        let event = engine.bots_removed(&["b"]).unwrap();

        assert_eq!(event.removed_bots, vec!["b"]);
        assert_eq!(event.updated_bots, vec!["a"]);
        assert_eq!(event.state["b"], None);
        assert!(engine.bot("b").is_none());
        assert_eq!(engine.bot("a").unwrap().value("count"), Some(&json!(0)));
    }

    #[test]
    fn updates_recompute_only_flagged_tags() {
        let mut engine = engine();
        engine
            .bots_added(&[
                Bot::new("a")
                    .with_tag("sum", "=getBotTagValues('num')")
                    .with_tag("other", "=getBotTagValues('unrelated')"),
                Bot::new("b").with_tag("num", 1).with_tag("label", "b"),
            ])
            .unwrap();
        engine.evaluator().calls.borrow_mut().clear();

        let event = engine
            .bots_updated(&[UpdatedBot::new(
                Bot::new("b").with_tag("num", 5).with_tag("label", "b"),
                ["num"],
            )])
            .unwrap();

        assert_eq!(calls(&engine), vec![pair("b", "num"), pair("a", "sum")]);
        assert_eq!(event.updated_bots, vec!["b", "a"]);
        assert_eq!(engine.bot("b").unwrap().value("num"), Some(&json!(5)));
        assert_eq!(engine.bot("a").unwrap().value("sum"), Some(&json!(5)));
        assert_eq!(engine.bot("a").unwrap().value("other"), Some(&json!(0)));
        assert_eq!(event.state["b"].as_ref().unwrap().tags["num"], json!(5));
    }

    #[test]
    fn cleared_tags_hold_null() {
        let mut engine = engine();
        engine
            .bots_added(&[Bot::new("b").with_tag("num", 1).with_tag("label", "b")])
            .unwrap();

        let event = engine
            .bots_updated(&[UpdatedBot::new(Bot::new("b").with_tag("label", "b"), ["num"])])
            .unwrap();

        let entry = engine.bot("b").unwrap();
        assert!(!entry.tags().contains_key("num"));
        assert_eq!(entry.value("num"), Some(&Value::Null));
        let patch = event.state["b"].as_ref().unwrap();
        assert_eq!(patch.tags["num"], Value::Null);
        assert_eq!(patch.values["num"], Value::Null);
    }

    #[test]
    fn evaluation_failure_aborts_the_batch() {
        let mut engine = engine();
        let events = Rc::new(RefCell::new(0));
        let counter = events.clone();
        engine.subscribe(move |_| *counter.borrow_mut() += 1);

        let err = engine
            .bots_added(&[Bot::new("a").with_tag("bad", "=fail").with_tag("num", 1)])
            .unwrap_err();

        match err {
            PrecalcError::Evaluation { bot_id, tag, source } => {
                assert_eq!(bot_id, "a");
                assert_eq!(tag, "bad");
                assert_eq!(source.message(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*events.borrow(), 0);
    }

    #[test]
    fn aborted_add_leaves_snapshot_and_graph_untouched() {
        let mut engine = engine();
        engine.bots_added(&[Bot::new("b").with_tag("num", 1)]).unwrap();
        let before = engine.state().clone();

        engine
            .bots_added(&[
                Bot::new("a").with_tag("bad", "=fail").with_tag("num", 1),
                Bot::new("b").with_tag("num", 2),
            ])
            .unwrap_err();

        assert_eq!(engine.state(), &before);
        assert!(!engine.graph().is_tracked("a"));

        engine.bots_added(&[Bot::new("a").with_tag("num", 1)]).unwrap();
        let event = engine
            .bots_updated(&[UpdatedBot::new(Bot::new("a").with_tag("num", 7), ["num"])])
            .unwrap();

        assert_eq!(event.updated_bots, vec!["a"]);
        assert_eq!(engine.bot("a").unwrap().value("num"), Some(&json!(7)));
    }

    #[test]
    fn null_tags_are_dropped_on_add() {
        let mut engine = engine();
        let event = engine
            .bots_added(&[Bot::new("a").with_tag("num", 1).with_tag("gone", Value::Null)])
            .unwrap();

        let entry = engine.bot("a").unwrap();
        assert!(!entry.tags().contains_key("gone"));
        assert!(entry.value("gone").is_none());
        assert!(!event.state["a"].as_ref().unwrap().tags.contains_key("gone"));
        assert_eq!(calls(&engine), vec![pair("a", "num")]);
    }

    #[test]
    fn isolated_failures_store_null() {
        let config = EngineConfig {
            evaluation_failure: EvaluationFailurePolicy::IsolatePerTag,
            ..EngineConfig::default()
        };
        let mut engine =
            PrecalculationEngine::with_config(SnapshotContextProvider, SumEvaluator::default(), config);

        engine
            .bots_added(&[Bot::new("a").with_tag("bad", "=fail").with_tag("num", 1)])
            .unwrap();

        let entry = engine.bot("a").unwrap();
        assert_eq!(entry.value("bad"), Some(&Value::Null));
        assert_eq!(entry.value("num"), Some(&json!(1)));
    }

    #[test]
    fn subscribers_see_events_until_unsubscribed() {
        let mut engine = engine();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let id = engine.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        let event = engine.bots_added(&[Bot::new("a").with_tag("num", 1)]).unwrap();
        assert_eq!(*seen.borrow(), vec![event]);

        assert!(engine.unsubscribe(id));
        assert!(!engine.unsubscribe(id));
        engine.bots_removed(&["a"]).unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }
}
