use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payload::{RatingPayload, WorkflowInput};
use super::step::{PolishPunchline, RateJoke, Step, TellJoke};
use crate::agent::{AgentRegistry, GenerateOptions, JOKE_AGENT_ID, ThreadRef};
use crate::error::{JokeflowError, Result, report};
use crate::openai::ChatModel;
use crate::storage::{SnapshotSummary, Store};

pub const WORKFLOW_ID: &str = "joke-workflow";

/// How a step obtains the agent's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumeMode {
    /// One completed response per step.
    #[default]
    Generate,
    /// Drain a token stream and concatenate its fragments.
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: String,
    pub status: StepStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Snapshot of one workflow execution, persisted after every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: String,
    pub workflow_id: String,
    pub mode: ConsumeMode,
    pub input: WorkflowInput,
    pub status: RunStatus,
    pub steps: Vec<StepRecord>,
    pub result: Option<RatingPayload>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl WorkflowRun {
    fn start(input: WorkflowInput, mode: ConsumeMode) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            workflow_id: WORKFLOW_ID.to_string(),
            mode,
            input,
            status: RunStatus::Running,
            steps: Vec::new(),
            result: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        }
    }

    #[cfg(test)]
    fn step(&self, id: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.id == id)
    }

    fn begin_step(&mut self, id: &str) {
        self.steps.push(StepRecord {
            id: id.to_string(),
            status: StepStatus::Running,
            output: None,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        });
    }

    fn end_step(&mut self, id: &str, outcome: std::result::Result<serde_json::Value, String>) {
        if let Some(step) = self.steps.iter_mut().rev().find(|s| s.id == id) {
            step.ended_at = Some(Utc::now());
            match outcome {
                Ok(output) => {
                    step.status = StepStatus::Success;
                    step.output = Some(output);
                }
                Err(error) => {
                    step.status = StepStatus::Failed;
                    step.error = Some(error);
                }
            }
        }
    }

    fn complete(&mut self, outcome: std::result::Result<RatingPayload, String>) {
        let now = Utc::now();
        match outcome {
            Ok(rating) => {
                self.status = RunStatus::Success;
                self.result = Some(rating);
            }
            Err(error) => {
                self.status = RunStatus::Failed;
                self.error = Some(error);
            }
        }
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
    }

    /// Load a persisted run.
    pub fn load(store: &Store, run_id: &str) -> Result<Self> {
        let raw = store
            .load_snapshot(run_id)?
            .ok_or_else(|| JokeflowError::RunNotFound(run_id.to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn list(store: &Store, limit: usize) -> Result<Vec<SnapshotSummary>> {
        store.list_snapshots(limit)
    }
}

/// Progress callbacks. All methods default to no-ops.
pub trait RunObserver {
    fn step_started(&self, _step: &str) {}

    /// A fragment arrived while draining a token stream.
    fn chunk(&self, _step: &str, _text: &str) {}

    fn step_finished(&self, _step: &str, _text: &str) {}

    fn step_failed(&self, _step: &str, _error: &JokeflowError) {}
}

impl RunObserver for () {}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: ConsumeMode,
    /// Memory thread shared by every agent call in the run.
    pub thread_id: Option<String>,
}

/// tell-joke → polish-punchline → rate-joke, strictly in sequence.
pub struct JokeWorkflow<'a, M> {
    registry: &'a AgentRegistry<M>,
    store: Option<Arc<Store>>,
}

impl<'a, M: ChatModel> JokeWorkflow<'a, M> {
    pub fn new(registry: &'a AgentRegistry<M>) -> Self {
        Self {
            registry,
            store: None,
        }
    }

    /// Persist run snapshots to `store`.
    pub fn with_store(mut self, store: Arc<Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Execute the three steps. On failure the failed snapshot is persisted
    /// before the step error is returned.
    pub async fn run(
        &self,
        input: WorkflowInput,
        options: &RunOptions,
        observer: &dyn RunObserver,
    ) -> Result<WorkflowRun> {
        let mut run = WorkflowRun::start(input.clone(), options.mode);
        tracing::info!(run_id = %run.run_id, mode = ?options.mode, "workflow started");
        self.persist(&run);

        let call = GenerateOptions {
            thread: options
                .thread_id
                .as_ref()
                .map(|id| ThreadRef::new(id.clone(), WORKFLOW_ID)),
        };

        match self.chain(&mut run, input, &call, observer).await {
            Ok(rating) => {
                run.complete(Ok(rating));
                tracing::info!(
                    run_id = %run.run_id,
                    duration_ms = run.duration_ms.unwrap_or_default(),
                    "workflow succeeded"
                );
                self.persist(&run);
                Ok(run)
            }
            Err(e) => {
                let message = report(&e);
                run.complete(Err(message.clone()));
                tracing::info!(run_id = %run.run_id, error = %message, "workflow failed");
                self.persist(&run);
                Err(e)
            }
        }
    }

    async fn chain(
        &self,
        run: &mut WorkflowRun,
        input: WorkflowInput,
        call: &GenerateOptions,
        observer: &dyn RunObserver,
    ) -> Result<RatingPayload> {
        let joke = self.execute::<TellJoke>(run, input, call, observer).await?;
        let polished = self
            .execute::<PolishPunchline>(run, joke, call, observer)
            .await?;
        self.execute::<RateJoke>(run, polished, call, observer).await
    }

    async fn execute<S: Step>(
        &self,
        run: &mut WorkflowRun,
        input: S::Input,
        call: &GenerateOptions,
        observer: &dyn RunObserver,
    ) -> Result<S::Output> {
        tracing::info!(run_id = %run.run_id, step = S::ID, "step started");
        run.begin_step(S::ID);
        observer.step_started(S::ID);

        let result = match self.invoke::<S>(&input, run.mode, call, observer).await {
            Ok(text) => {
                observer.step_finished(S::ID, &text);
                let output = S::output(text);
                serde_json::to_value(&output)
                    .map(|json| (output, json))
                    .map_err(JokeflowError::from)
            }
            Err(e) => Err(e),
        };

        match result {
            Ok((output, json)) => {
                run.end_step(S::ID, Ok(json));
                tracing::info!(run_id = %run.run_id, step = S::ID, "step finished");
                self.persist(run);
                Ok(output)
            }
            Err(e) => {
                run.end_step(S::ID, Err(report(&e)));
                observer.step_failed(S::ID, &e);
                Err(JokeflowError::Step {
                    step: S::ID.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Resolve the agent, send the prompt and collect the reply text.
    async fn invoke<S: Step>(
        &self,
        input: &S::Input,
        mode: ConsumeMode,
        call: &GenerateOptions,
        observer: &dyn RunObserver,
    ) -> Result<String> {
        let agent = self
            .registry
            .get(JOKE_AGENT_ID)
            .ok_or_else(|| JokeflowError::AgentNotFound(JOKE_AGENT_ID.to_string()))?;

        let prompt = S::prompt(input);
        match mode {
            ConsumeMode::Generate => Ok(agent.generate(&prompt, call).await?.text),
            ConsumeMode::Stream => {
                let mut stream = agent.stream(&prompt, call).await?;
                let mut text = String::new();
                while let Some(fragment) = stream.next().await {
                    let fragment = fragment?;
                    observer.chunk(S::ID, &fragment);
                    text.push_str(&fragment);
                }
                Ok(text)
            }
        }
    }

    fn persist(&self, run: &WorkflowRun) {
        let Some(store) = &self.store else {
            return;
        };
        let saved = serde_json::to_string(run)
            .map_err(JokeflowError::from)
            .and_then(|json| {
                store.save_snapshot(
                    &run.run_id,
                    &run.workflow_id,
                    &run.status.to_string(),
                    &json,
                )
            });
        match saved {
            Ok(()) => tracing::debug!(run_id = %run.run_id, status = %run.status, "snapshot saved"),
            Err(e) => {
                tracing::warn!(run_id = %run.run_id, error = %report(&e), "failed to persist run snapshot")
            }
        }
    }
}
