use thiserror::Error;

use crate::openai::OpenAiError;

#[derive(Debug, Error)]
pub enum JokeflowError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Step `{step}` failed")]
    Step {
        step: String,
        #[source]
        source: Box<JokeflowError>,
    },

    #[error("Invalid workflow input: {0}")]
    InvalidInput(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error(transparent)]
    Model(#[from] OpenAiError),

    #[error("Storage error")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T, E = JokeflowError> = std::result::Result<T, E>;

/// `outer: cause: root`, each error in the source chain written once.
pub fn report(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
