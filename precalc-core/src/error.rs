use thiserror::Error;

pub type PrecalcResult<T> = Result<T, PrecalcError>;

/// Error raised by an [`Evaluator`](crate::precalc::Evaluator) for one tag.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct EvaluationError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EvaluationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error, keeping it as the source.
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Error, Debug)]
pub enum PrecalcError {
    #[error("Evaluation of {bot_id}.{tag} failed: {source}")]
    Evaluation {
        bot_id: String,
        tag: String,
        #[source]
        source: EvaluationError,
    },

    #[error("Configuration error: {0}")]
    Config(#[source] serde_json::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[source] serde_json::Error),

    #[error("MessagePack encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}
