use super::{Agent, Memory};
use crate::config::JokeflowConfig;
use crate::openai::ChatModel;

/// Registry id the workflow steps resolve.
pub const JOKE_AGENT_ID: &str = "jokeAgent";

pub const JOKE_AGENT_NAME: &str = "Joke Agent";

pub const JOKE_AGENT_INSTRUCTIONS: &str = "
      You are a comedian that tells witty jokes.

      Your primary function is to tell jokes. When responding:
      - Always ask for a topic if none is provided
      - If the topic isn't in English, please translate it
      - Keep responses concise but funny
      - If the user asks for a joke, respond in the format they request.
      - if the user asks to make the joke funnier or polish the punchline, do so, and make the joke wittier.
      - if the user asks to give the joke a rating, give it a rating between 1 and 10.
";

/// The comedian persona, bound to `model` and the configured sampling options.
pub fn joke_agent<M: ChatModel>(
    model: M,
    config: &JokeflowConfig,
    memory: Option<Memory>,
) -> Agent<M> {
    let agent = Agent::new(
        JOKE_AGENT_NAME,
        JOKE_AGENT_INSTRUCTIONS,
        config.model.clone(),
        model,
    )
    .with_sampling(config.max_tokens, config.temperature);
    match memory {
        Some(memory) => agent.with_memory(memory),
        None => agent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    #[test]
    fn joke_agent_uses_configured_model() {
        let config = JokeflowConfig {
            model: "gpt-4o".into(),
            max_tokens: Some(128),
            ..Default::default()
        };
        let agent = joke_agent(ScriptedModel::default(), &config, None);
        assert_eq!(agent.name, "Joke Agent");
        assert_eq!(agent.model_id, "gpt-4o");
        assert_eq!(agent.max_tokens, Some(128));
        assert!(agent.memory().is_none());
    }

    #[test]
    fn instructions_cover_the_three_tasks() {
        assert!(JOKE_AGENT_INSTRUCTIONS.contains("You are a comedian that tells witty jokes."));
        assert!(JOKE_AGENT_INSTRUCTIONS.contains("polish the punchline"));
        assert!(JOKE_AGENT_INSTRUCTIONS.contains("rating between 1 and 10"));
    }
}
