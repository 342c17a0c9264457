//! The joke workflow: tell a joke, polish its punchline, rate it.

mod payload;
mod run;
mod step;

pub use payload::{JokeFormat, WorkflowInput};
pub use run::{ConsumeMode, JokeWorkflow, RunObserver, RunOptions, RunStatus, WorkflowRun};
pub use step::STEPS;
