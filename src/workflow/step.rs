use serde::Serialize;

use super::payload::{JokePayload, RatingPayload, WorkflowInput};

/// One request/response exchange with the joke agent.
///
/// A step turns its typed input into a prompt and the agent's text back into
/// its typed output. Chaining `A` then `B` requires `B::Input = A::Output`.
pub trait Step {
    type Input: Serialize;
    type Output: Serialize;

    const ID: &'static str;
    const DESCRIPTION: &'static str;

    fn prompt(input: &Self::Input) -> String;

    fn output(text: String) -> Self::Output;
}

pub struct TellJoke;

impl Step for TellJoke {
    type Input = WorkflowInput;
    type Output = JokePayload;

    const ID: &'static str = "tell-joke";
    const DESCRIPTION: &'static str = "Tells a joke based on the topic and joke format";

    fn prompt(input: &WorkflowInput) -> String {
        format!(
            "Create a {} joke about \"{}\". Keep it short and funny.",
            input.joke_format, input.topic
        )
    }

    fn output(text: String) -> JokePayload {
        JokePayload { joke: text }
    }
}

pub struct PolishPunchline;

impl Step for PolishPunchline {
    type Input = JokePayload;
    type Output = JokePayload;

    const ID: &'static str = "polish-punchline";
    const DESCRIPTION: &'static str = "Polishes the punchline of the joke";

    fn prompt(input: &JokePayload) -> String {
        format!("Polish the punchline of the joke: {}", input.joke)
    }

    fn output(text: String) -> JokePayload {
        JokePayload { joke: text }
    }
}

pub struct RateJoke;

impl Step for RateJoke {
    type Input = JokePayload;
    type Output = RatingPayload;

    const ID: &'static str = "rate-joke";
    const DESCRIPTION: &'static str = "Rates the joke";

    fn prompt(input: &JokePayload) -> String {
        format!("Rate the joke: {}", input.joke)
    }

    fn output(text: String) -> RatingPayload {
        RatingPayload { rating: text }
    }
}

/// `(id, description)` of every step, in execution order.
pub const STEPS: [(&str, &str); 3] = [
    (TellJoke::ID, TellJoke::DESCRIPTION),
    (PolishPunchline::ID, PolishPunchline::DESCRIPTION),
    (RateJoke::ID, RateJoke::DESCRIPTION),
];
