//! Agents: a persona bound to a chat model and, optionally, a memory thread store.

mod joke;
mod memory;

use std::collections::HashMap;
use std::pin::Pin;

use futures_core::Stream;
use futures_util::StreamExt;

use crate::error::{JokeflowError, Result};
use crate::openai::{ChatMessage, ChatModel, ChatRequest, Usage};

pub use joke::{JOKE_AGENT_ID, JOKE_AGENT_INSTRUCTIONS, JOKE_AGENT_NAME, joke_agent};
pub use memory::{Memory, ThreadRef};

/// Text fragments from a streaming agent call.
pub type AgentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A completed one-shot agent call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: Option<Usage>,
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Conversation to read history from and append the exchange to.
    /// Ignored when the agent has no memory.
    pub thread: Option<ThreadRef>,
}

pub struct Agent<M> {
    pub name: String,
    pub instructions: String,
    pub model_id: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    model: M,
    memory: Option<Memory>,
}

impl<M: ChatModel> Agent<M> {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        model_id: impl Into<String>,
        model: M,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            model_id: model_id.into(),
            max_tokens: None,
            temperature: None,
            model,
            memory: None,
        }
    }

    pub fn with_memory(mut self, memory: Memory) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_sampling(mut self, max_tokens: Option<u32>, temperature: Option<f32>) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    #[cfg(test)]
    pub fn memory(&self) -> Option<&Memory> {
        self.memory.as_ref()
    }

    /// Memory and thread for this call, when both are present.
    fn recall_context(&self, options: &GenerateOptions) -> Option<(Memory, ThreadRef)> {
        match (&self.memory, &options.thread) {
            (Some(memory), Some(thread)) => Some((memory.clone(), thread.clone())),
            (None, Some(thread)) => {
                tracing::debug!(
                    agent = %self.name,
                    thread_id = %thread.thread_id,
                    "agent has no memory, ignoring thread"
                );
                None
            }
            _ => None,
        }
    }

    /// `[system(instructions), ...history, user(prompt)]`
    fn build_request(&self, prompt: &str, context: Option<&(Memory, ThreadRef)>) -> Result<ChatRequest> {
        let mut messages = vec![ChatMessage::system(self.instructions.trim())];
        if let Some((memory, thread)) = context {
            messages.extend(memory.history(thread)?);
        }
        messages.push(ChatMessage::user(prompt));

        Ok(ChatRequest {
            model: self.model_id.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: false,
        })
    }

    /// Ask the model for a complete answer.
    pub async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<Generation> {
        let context = self.recall_context(options);
        let req = self.build_request(prompt, context.as_ref())?;
        let response = self.model.complete(&req).await?;
        let text = response.text().unwrap_or_default().to_string();

        if let Some((memory, thread)) = &context {
            memory.remember(thread, prompt, &text)?;
        }

        Ok(Generation {
            text,
            usage: response.usage,
        })
    }

    /// Ask the model for an incremental answer.
    ///
    /// With memory, the exchange is recorded once the stream is fully drained;
    /// a stream dropped early leaves the thread untouched.
    pub async fn stream(&self, prompt: &str, options: &GenerateOptions) -> Result<AgentStream> {
        let context = self.recall_context(options);
        let mut req = self.build_request(prompt, context.as_ref())?;
        req.stream = true;
        let inner = self.model.stream(&req).await?;

        let Some((memory, thread)) = context else {
            return Ok(Box::pin(inner.map(|item| item.map_err(JokeflowError::from))));
        };

        let prompt = prompt.to_string();
        let stream = async_stream::stream! {
            let mut inner = inner;
            let mut text = String::new();
            while let Some(item) = inner.next().await {
                match item {
                    Ok(fragment) => {
                        text.push_str(&fragment);
                        yield Ok(fragment);
                    }
                    Err(e) => {
                        yield Err(JokeflowError::from(e));
                        return;
                    }
                }
            }
            if let Err(e) = memory.remember(&thread, &prompt, &text) {
                yield Err(e);
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Agents addressable by id.
pub struct AgentRegistry<M> {
    agents: HashMap<String, Agent<M>>,
}

impl<M> Default for AgentRegistry<M> {
    fn default() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }
}

impl<M> AgentRegistry<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, returning the one previously stored under `id`.
    pub fn register(&mut self, id: impl Into<String>, agent: Agent<M>) -> Option<Agent<M>> {
        self.agents.insert(id.into(), agent)
    }

    pub fn get(&self, id: &str) -> Option<&Agent<M>> {
        self.agents.get(id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::openai::Role;
    use crate::storage::Store;
    use crate::testing::ScriptedModel;

    fn agent(model: ScriptedModel) -> Agent<ScriptedModel> {
        Agent::new("Tester", "  Be brief.\n", "gpt-4o-mini", model)
    }

    fn with_memory(model: ScriptedModel) -> (Agent<ScriptedModel>, Memory) {
        let memory = Memory::new(Arc::new(Store::in_memory().unwrap()), 10);
        (agent(model).with_memory(memory.clone()), memory)
    }

    #[tokio::test]
    async fn generate_sends_instructions_then_prompt() {
        let model = ScriptedModel::with_replies(["Why did the crab never share?"]);
        let agent = agent(model.clone()).with_sampling(Some(200), Some(0.7));

        let out = agent
            .generate("Create a joke", &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(out.text, "Why did the crab never share?");

        let req = &model.requests()[0];
        assert_eq!(req.model, "gpt-4o-mini");
        assert_eq!(req.max_tokens, Some(200));
        assert_eq!(req.temperature, Some(0.7));
        assert!(!req.stream);
        assert_eq!(
            req.messages,
            vec![ChatMessage::system("Be brief."), ChatMessage::user("Create a joke")]
        );
    }

    #[tokio::test]
    async fn stream_concatenates_to_generate_text() {
        let reply = "Because it was a little shellfish.";
        let model = ScriptedModel::with_replies([reply]);
        let agent = agent(model.clone());

        let mut stream = agent
            .stream("Polish it", &GenerateOptions::default())
            .await
            .unwrap();
        let mut fragments = Vec::new();
        while let Some(item) = stream.next().await {
            fragments.push(item.unwrap());
        }
        assert!(fragments.len() > 1);
        assert_eq!(fragments.concat(), reply);
        assert!(model.requests()[0].stream);
    }

    #[tokio::test]
    async fn model_errors_propagate() {
        let agent = agent(ScriptedModel::failing(503));
        let err = agent
            .generate("anything", &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JokeflowError::Model(crate::openai::OpenAiError::ApiError { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn generate_with_thread_replays_and_records_history() {
        let model = ScriptedModel::with_replies(["first answer", "second answer"]);
        let (agent, memory) = with_memory(model.clone());
        let options = GenerateOptions {
            thread: Some(ThreadRef::new("t-1", "user-1")),
        };

        agent.generate("first question", &options).await.unwrap();
        agent.generate("second question", &options).await.unwrap();

        let second = &model.requests()[1];
        let roles: Vec<Role> = second.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(second.messages[2].content, "first answer");

        let stored = memory.store().recent_messages("t-1", 10).unwrap();
        assert_eq!(stored.len(), 4);
        assert_eq!(stored[3].content, "second answer");
    }

    #[tokio::test]
    async fn stream_with_thread_records_after_drain() {
        let model = ScriptedModel::with_replies(["knock knock"]);
        let (agent, memory) = with_memory(model);
        let options = GenerateOptions {
            thread: Some(ThreadRef::new("t-1", "user-1")),
        };

        let mut stream = agent.stream("joke please", &options).await.unwrap();
        let mut text = String::new();
        while let Some(item) = stream.next().await {
            text.push_str(&item.unwrap());
        }
        assert_eq!(text, "knock knock");

        let stored = memory.store().recent_messages("t-1", 10).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].content, "joke please");
        assert_eq!(stored[1].content, "knock knock");
    }

    #[tokio::test]
    async fn thread_without_memory_is_ignored() {
        let model = ScriptedModel::with_replies(["ok"]);
        let agent = agent(model.clone());
        let options = GenerateOptions {
            thread: Some(ThreadRef::new("t-1", "user-1")),
        };
        agent.generate("hi", &options).await.unwrap();
        assert_eq!(model.requests()[0].messages.len(), 2);
    }

    #[test]
    fn registry_lookup() {
        let mut registry = AgentRegistry::new();
        assert!(registry.get("jokeAgent").is_none());
        assert!(
            registry
                .register("jokeAgent", agent(ScriptedModel::default()))
                .is_none()
        );
        assert_eq!(registry.get("jokeAgent").unwrap().name, "Tester");
        assert!(registry.get("otherAgent").is_none());
    }
}
