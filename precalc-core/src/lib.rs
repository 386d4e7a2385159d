//! Precalc Core
//!
//! This crate provides incremental dependency tracking and precalculation
//! for bots whose tags may hold formulas. It implements:
//!
//! - A dependency graph over formula tags
//! - Bounded propagation of changes through that graph
//! - A precalculation engine that caches computed tag values
//! - Diff events describing each change to the cached state
//!
//! The formula language is not part of this crate. Hosts plug in an
//! [`Evaluator`](precalc::Evaluator) and, optionally, their own
//! [`DependencyExtractor`](graph::DependencyExtractor).
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `model`: Bots, updates and affected maps
//! - `graph`: Dependency extraction, indices and propagation
//! - `precalc`: Snapshot, evaluation and diff events
//! - `config`: Named policies for the ambiguous cases
//!
//! # Example
//!
//! ```rust,ignore
//! use precalc_core::model::{Bot, UpdatedBot};
//! use precalc_core::precalc::{PrecalculationEngine, SnapshotContextProvider};
//!
//! let mut engine = PrecalculationEngine::new(SnapshotContextProvider, MyEvaluator);
//!
//! engine.bots_added(&[
//!     Bot::new("total").with_tag("sum", "=getBotTagValues('num')"),
//!     Bot::new("item").with_tag("num", 2),
//! ])?;
//!
//! // Only item.num and total.sum are recomputed.
//! let event = engine.bots_updated(&[UpdatedBot::new(
//!     Bot::new("item").with_tag("num", 5),
//!     ["num"],
//! )])?;
//! assert_eq!(event.updated_bots, vec!["item", "total"]);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod precalc;

pub use config::{DuplicateAddPolicy, EngineConfig, EvaluationFailurePolicy, GraphConfig};
pub use error::{EvaluationError, PrecalcError, PrecalcResult};
