//! Evaluator interface.
//!
//! The expression language itself lives outside this crate. The engine only
//! needs a function from (context, bot, tag, raw value) to a computed value.

use serde_json::Value;

use crate::error::EvaluationError;
use crate::model::Bot;

/// Computes the value of a single tag.
///
/// Implementations must be pure given the context and must not keep
/// references into it. Results that cannot be serialized (functions,
/// handles) must be replaced with placeholder strings before returning.
pub trait Evaluator {
    type Context;

    /// Compute the value of `tag` on `bot` from its raw `value`.
    ///
    /// Literal values are passed through here as well, so the evaluator
    /// decides how they are represented.
    fn evaluate(
        &self,
        context: &Self::Context,
        bot: &Bot,
        tag: &str,
        value: &Value,
    ) -> Result<Value, EvaluationError>;
}
