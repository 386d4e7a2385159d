//! Data Model
//!
//! The plain data that flows through the dependency graph and the
//! precalculation engine.
//!
//! - [`Bot`]: an addressable entity with a mapping of tag name to raw value.
//! - [`UpdatedBot`]: a bot together with the names of the tags that changed.
//! - [`AffectedMap`]: the answer to "which (bot, tag) pairs need to be
//!   recomputed".
//!
//! Bots are owned by the caller. Nothing in this crate keeps the
//! authoritative copy of a bot; the graph only derives indices from it and
//! the engine only caches raw tags next to computed values.

mod affected;
mod bot;

pub use affected::AffectedMap;
pub use bot::{is_formula, Bot, Tags, UpdatedBot, FORMULA_PREFIX};
