//! Precalculation
//!
//! This module keeps a cache of computed tag values for every tracked bot
//! and refreshes exactly the values a change can affect.
//!
//! # Concepts
//!
//! ## Snapshot
//!
//! For every bot the engine stores its raw tags and the value the evaluator
//! computed for each of them. A tag that was cleared keeps an explicit
//! `null` value so consumers can tell "removed" from "unchanged".
//!
//! ## Evaluator and Context
//!
//! Formula evaluation is delegated to an [`Evaluator`]. A
//! [`ContextProvider`] builds the view of all bots the evaluator reads from,
//! once per batch.
//!
//! ## Events
//!
//! Each batch yields a [`StateUpdatedEvent`] listing added, removed and
//! updated bots together with the changed parts of their entries. Events are
//! returned to the caller and delivered to every [`Subscriber`].
//!
//! # Threading
//!
//! Everything runs synchronously on the caller's thread. Mutation goes
//! through `&mut self`, so a single writer is enforced by the borrow checker
//! and no locking is needed.

mod context;
mod engine;
mod evaluator;
mod event;
mod snapshot;
mod subscriber;

pub use context::{BotContext, ContextProvider, SnapshotContextProvider};
pub use engine::PrecalculationEngine;
pub use evaluator::Evaluator;
pub use event::{BotPatch, StateUpdatedEvent};
pub use snapshot::{PrecalculatedBot, PrecalculatedState, Values};
pub use subscriber::{Subscriber, SubscriberId};
