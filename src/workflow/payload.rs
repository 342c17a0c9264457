use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{JokeflowError, Result};

pub const DEFAULT_TOPIC: &str = "surprise me";

/// The shape of joke the first step asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JokeFormat {
    #[default]
    KnockKnock,
    DadJoke,
    Pun,
    OneLiner,
}

impl JokeFormat {
    pub const ALL: [JokeFormat; 4] = [
        JokeFormat::KnockKnock,
        JokeFormat::DadJoke,
        JokeFormat::Pun,
        JokeFormat::OneLiner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JokeFormat::KnockKnock => "knock-knock",
            JokeFormat::DadJoke => "dad-joke",
            JokeFormat::Pun => "pun",
            JokeFormat::OneLiner => "one-liner",
        }
    }
}

impl fmt::Display for JokeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JokeFormat {
    type Err = JokeflowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| {
                JokeflowError::InvalidInput(format!(
                    "unknown joke format `{s}`, expected one of: knock-knock, dad-joke, pun, one-liner"
                ))
            })
    }
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

/// Workflow input. Both fields may be omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInput {
    /// The topic of the joke.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// The format of the joke.
    #[serde(default)]
    pub joke_format: JokeFormat,
}

impl Default for WorkflowInput {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            joke_format: JokeFormat::default(),
        }
    }
}

impl WorkflowInput {
    /// Validate and parse a JSON object such as `{"topic": "cats", "jokeFormat": "pun"}`.
    /// Unknown keys are ignored.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| JokeflowError::InvalidInput(e.to_string()))
    }
}

/// A joke travelling between steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JokePayload {
    pub joke: String,
}

/// Final output: the agent's rating, as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingPayload {
    pub rating: String,
}

impl RatingPayload {
    /// First whole number between 1 and 10 mentioned in the rating, if any.
    pub fn score(&self) -> Option<u8> {
        self.rating
            .split(|c: char| !c.is_ascii_digit())
            .filter(|run| !run.is_empty())
            .filter_map(|run| run.parse::<u8>().ok())
            .find(|n| (1..=10).contains(n))
    }
}
