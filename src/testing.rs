//! In-process [`ChatModel`] used by agent and workflow tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;

use crate::openai::client::TextStream;
use crate::openai::types::{ChatResponse, Choice};
use crate::openai::{ChatMessage, ChatModel, ChatRequest, OpenAiError};

#[derive(Default)]
struct Script {
    replies: VecDeque<String>,
    requests: Vec<ChatRequest>,
    fail_status: Option<u16>,
}

/// Answers with canned replies in order and records every request it sees.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    script: Arc<Mutex<Script>>,
}

impl ScriptedModel {
    pub fn with_replies<'a>(replies: impl IntoIterator<Item = &'a str>) -> Self {
        let model = Self::default();
        model.script.lock().unwrap().replies = replies.into_iter().map(String::from).collect();
        model
    }

    /// Every call fails with an API error carrying `status`.
    pub fn failing(status: u16) -> Self {
        Self::failing_after(std::iter::empty(), status)
    }

    /// Answers with `replies`, then fails every later call with `status`.
    pub fn failing_after<'a>(replies: impl IntoIterator<Item = &'a str>, status: u16) -> Self {
        let model = Self::with_replies(replies);
        model.script.lock().unwrap().fail_status = Some(status);
        model
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().requests.len()
    }

    fn next_reply(&self, req: &ChatRequest) -> Result<String, OpenAiError> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(req.clone());
        if let Some(reply) = script.replies.pop_front() {
            return Ok(reply);
        }
        match script.fail_status {
            Some(status) => Err(OpenAiError::ApiError {
                status,
                message: "scripted failure".into(),
            }),
            None => Ok(String::new()),
        }
    }
}

impl ChatModel for ScriptedModel {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, OpenAiError> {
        let text = self.next_reply(req)?;
        Ok(ChatResponse {
            id: format!("scripted-{}", self.calls()),
            model: req.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: ChatMessage::assistant(text),
                finish_reason: Some("stop".into()),
            }],
            usage: None,
        })
    }

    async fn stream(&self, req: &ChatRequest) -> Result<TextStream, OpenAiError> {
        let text = self.next_reply(req)?;
        let fragments: Vec<Result<String, OpenAiError>> = text
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(futures_util::stream::iter(fragments).boxed())
    }
}
