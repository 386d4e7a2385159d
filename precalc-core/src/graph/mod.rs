//! Dependency Graph
//!
//! This module tracks which formula tags depend on which other tags and
//! answers "what is affected" when bots are added, removed or updated.
//!
//! # Overview
//!
//! Each formula is reduced to a list of [`Dependency`] descriptors by a
//! [`DependencyExtractor`]. The graph then keeps a set of indices:
//!
//! - tag name → bots carrying that tag, and bot → its tags
//! - bot → tag → dependencies of that formula tag
//! - tag name → bot → formula tags that depend on the tag (reverse edges)
//! - bot → formula tags whose dependencies are unresolvable
//!
//! Edges are keyed by tag *name*, never by the bot that carries the tag. A
//! formula that reads `num` is a dependent of every bot's `num`.
//!
//! # Design Decisions
//!
//! 1. All indices live inside one [`DependencyGraph`] value rather than in
//!    global state, so independent graphs can coexist.
//!
//! 2. The descriptor type is a closed enum. Wiring and unwiring match every
//!    variant, which keeps the add and remove paths in lockstep.
//!
//! 3. Transitive propagation is an explicit worklist with a round counter,
//!    not recursion, so cyclic formulas cannot overflow the stack.

mod dependency;
mod index;
mod manager;
mod propagation;

pub use dependency::{Dependencies, Dependency, DependencyExtractor, FormulaDependencyExtractor};
pub use index::{BotDependencies, Dependents, GraphIndices};
pub use manager::DependencyGraph;
pub use propagation::MAX_PROPAGATION_ROUNDS;
