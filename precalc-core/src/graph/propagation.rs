//! Update Propagation
//!
//! Expands the directly affected pairs of an update into everything that
//! transitively depends on them.
//!
//! # Algorithm
//!
//! The closure works on tag names, not on (bot, tag) pairs:
//!
//! 1. Start from the directly affected map.
//! 2. Collect the tag names that were introduced by the previous round.
//! 3. Look up the dependents of each of those names and merge them in.
//! 4. Repeat until a round introduces no new tag names, or until
//!    [`MAX_PROPAGATION_ROUNDS`] rounds have run.
//!
//! Formulas are never checked for cycles, so the round limit is what keeps
//! a cyclic graph from spinning forever. It also means chains longer than
//! the limit stop propagating without any error.

use indexmap::IndexSet;
use tracing::{debug, trace};

use super::index::GraphIndices;
use crate::model::AffectedMap;

/// Hard limit on the number of closure rounds run for one update.
pub const MAX_PROPAGATION_ROUNDS: usize = 10;

/// Expand `affected` in place with its transitive dependents.
///
/// `seen` holds the tag names whose dependents are already part of
/// `affected`. Returns the number of rounds that ran.
pub(crate) fn propagate(
    indices: &GraphIndices,
    bot_id: &str,
    affected: &mut AffectedMap,
    mut seen: IndexSet<String>,
) -> usize {
    let mut frontier: IndexSet<String> = affected
        .tag_names()
        .into_iter()
        .filter(|tag| !seen.contains(*tag))
        .map(str::to_owned)
        .collect();
    seen.extend(frontier.iter().cloned());

    let mut rounds = 0;
    while !frontier.is_empty() {
        if rounds == MAX_PROPAGATION_ROUNDS {
            debug!(
                bot_id,
                pending = frontier.len(),
                "propagation round limit reached"
            );
            break;
        }
        rounds += 1;

        let mut next = AffectedMap::new();
        for tag in &frontier {
            next.merge(&indices.dependents_of(tag, None));
        }

        let introduced: IndexSet<String> = next
            .tag_names()
            .into_iter()
            .filter(|tag| !seen.contains(*tag))
            .map(str::to_owned)
            .collect();
        trace!(
            bot_id,
            round = rounds,
            introduced = introduced.len(),
            "propagation round"
        );

        affected.merge(&next);
        seen.extend(introduced.iter().cloned());
        frontier = introduced;
    }

    rounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Dependency;

    fn chain(indices: &mut GraphIndices, length: usize) {
        for i in 1..=length {
            let bot_id = format!("b{i}");
            let tag = format!("t{i}");
            indices.wire(&bot_id, &tag, &[Dependency::Tag(format!("t{}", i - 1))]);
        }
    }

    fn seed(indices: &GraphIndices) -> (AffectedMap, IndexSet<String>) {
        let mut affected = AffectedMap::new();
        affected.insert("b0", "t0");
        affected.merge(&indices.dependents_of("t0", None));
        (affected, IndexSet::from(["t0".to_owned()]))
    }

    #[test]
    fn follows_short_chains_to_the_end() {
        let mut indices = GraphIndices::default();
        chain(&mut indices, 3);

        let (mut affected, seen) = seed(&indices);
        let rounds = propagate(&indices, "b0", &mut affected, seen);

        assert!(affected.contains("b1", "t1"));
        assert!(affected.contains("b2", "t2"));
        assert!(affected.contains("b3", "t3"));
        // The last round finds no dependents of t3.
        assert_eq!(rounds, 3);
    }

    #[test]
    fn stops_at_the_round_limit() {
        let mut indices = GraphIndices::default();
        chain(&mut indices, MAX_PROPAGATION_ROUNDS + 5);

        let (mut affected, seen) = seed(&indices);
        let rounds = propagate(&indices, "b0", &mut affected, seen);

        assert_eq!(rounds, MAX_PROPAGATION_ROUNDS);
        let last = MAX_PROPAGATION_ROUNDS + 1;
        assert!(affected.contains(&format!("b{last}"), &format!("t{last}")));
        assert!(!affected.contains_bot(&format!("b{}", last + 1)));
    }

    #[test]
    fn cycles_terminate() {
        let mut indices = GraphIndices::default();
        indices.wire("a", "x", &[Dependency::Tag("y".into())]);
        indices.wire("b", "y", &[Dependency::Tag("x".into())]);

        let mut affected = AffectedMap::new();
        affected.insert("a", "x");
        let rounds = propagate(&indices, "a", &mut affected, IndexSet::new());

        assert!(affected.contains("a", "x"));
        assert!(affected.contains("b", "y"));
        assert!(rounds <= 2);
    }
}
