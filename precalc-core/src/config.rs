//! Engine Configuration
//!
//! The few behaviours that hosts disagree on are exposed as named policies
//! rather than hidden defaults. Every field has a default, so an empty JSON
//! object is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::{PrecalcError, PrecalcResult};

/// What `add_bot` does when the id is already tracked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateAddPolicy {
    /// Register the bot again on top of the existing registration.
    /// Tag index entries are duplicated.
    #[default]
    Accumulate,

    /// Purge the existing registration before registering the bot again.
    Upsert,
}

/// What the engine does when the evaluator fails on a tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationFailurePolicy {
    /// Abort the whole batch and return the error.
    #[default]
    AbortBatch,

    /// Log the error, store `null` for the failing tag and carry on.
    IsolatePerTag,
}

/// Settings for a [`DependencyGraph`](crate::graph::DependencyGraph).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub duplicate_add: DuplicateAddPolicy,
}

/// Settings for a [`PrecalculationEngine`](crate::precalc::PrecalculationEngine).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub duplicate_add: DuplicateAddPolicy,
    pub evaluation_failure: EvaluationFailurePolicy,
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> PrecalcResult<Self> {
        serde_json::from_str(json).map_err(PrecalcError::Config)
    }

    /// The graph's slice of this configuration.
    pub fn graph(&self) -> GraphConfig {
        GraphConfig {
            duplicate_add: self.duplicate_add,
        }
    }
}
