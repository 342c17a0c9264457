//! Interface de terminal do jokeflow: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`RunProgress`] acompanha visualmente
//! cada passo do workflow no terminal.

use std::cell::RefCell;
use std::io::Write;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{JokeflowError, report};
use crate::storage::{SnapshotSummary, StoredMessage, Thread};
use crate::workflow::{ConsumeMode, RunObserver, RunStatus, WorkflowRun};

/// Indicador visual de progresso para uma execução do workflow.
///
/// No modo `Generate` exibe um spinner enquanto o agente responde; no modo
/// `Stream` imprime os fragmentos à medida que chegam.
pub struct RunProgress {
    mode: ConsumeMode,
    // Spinner do passo atual (apenas no modo Generate).
    pb: RefCell<Option<ProgressBar>>,
    cyan: Style,
    green: Style,
    red: Style,
    dim: Style,
}

impl RunProgress {
    pub fn new(mode: ConsumeMode) -> Self {
        Self {
            mode,
            pb: RefCell::new(None),
            cyan: Style::new().cyan().bold(),
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            dim: Style::new().dim(),
        }
    }

    fn clear_spinner(&self) {
        if let Some(pb) = self.pb.borrow_mut().take() {
            pb.finish_and_clear();
        }
    }

    /// Imprime a nota final da execução.
    pub fn print_summary(&self, run: &WorkflowRun) {
        let Some(result) = &run.result else {
            return;
        };
        println!();
        match result.score() {
            Some(score) => println!(
                "{} Rating: {score}/10",
                self.green.apply_to("✓")
            ),
            None => println!("{} Rated", self.green.apply_to("✓")),
        }
        println!(
            "{}",
            self.dim.apply_to(format!(
                "run {} finished in {}ms",
                run.run_id,
                run.duration_ms.unwrap_or_default()
            ))
        );
    }
}

impl RunObserver for RunProgress {
    fn step_started(&self, step: &str) {
        println!("{} {step}", self.cyan.apply_to("▶"));
        if self.mode == ConsumeMode::Generate {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
                pb.set_style(style);
            }
            pb.set_message("waiting for the Joke Agent...");
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            *self.pb.borrow_mut() = Some(pb);
        }
    }

    fn chunk(&self, _step: &str, text: &str) {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{text}");
        let _ = stdout.flush();
    }

    fn step_finished(&self, _step: &str, text: &str) {
        match self.mode {
            ConsumeMode::Generate => {
                self.clear_spinner();
                println!("{}", text.trim());
            }
            ConsumeMode::Stream => println!(),
        }
        println!();
    }

    fn step_failed(&self, step: &str, error: &JokeflowError) {
        self.clear_spinner();
        if self.mode == ConsumeMode::Stream {
            println!();
        }
        eprintln!("{} {step} failed: {}", self.red.apply_to("✗"), report(error));
    }
}

/// Imprime o registro da execução formatado em JSON.
pub fn print_run_json(run: &WorkflowRun) {
    println!("{}", serde_json::to_string_pretty(run).unwrap_or_default());
}

/// Tabela simples das execuções persistidas.
pub fn print_runs(runs: &[SnapshotSummary]) {
    if runs.is_empty() {
        println!("No runs recorded yet.");
        return;
    }
    let green = Style::new().green();
    let red = Style::new().red();
    let yellow = Style::new().yellow();
    for run in runs {
        let status = match run.status.as_str() {
            s if s == RunStatus::Success.to_string() => green.apply_to(s),
            s if s == RunStatus::Failed.to_string() => red.apply_to(s),
            s => yellow.apply_to(s),
        };
        println!(
            "{}  {:<8}  {}  {}",
            run.run_id,
            status,
            run.workflow_id,
            run.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

pub fn print_threads(threads: &[Thread]) {
    if threads.is_empty() {
        println!("No memory threads yet.");
        return;
    }
    let dim = Style::new().dim();
    for thread in threads {
        println!(
            "{}  {}  {}",
            thread.id,
            dim.apply_to(&thread.resource_id),
            thread.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

pub fn print_history(messages: &[StoredMessage]) {
    if messages.is_empty() {
        println!("Thread is empty.");
        return;
    }
    let role_style = Style::new().bold();
    for msg in messages {
        println!("{}:", role_style.apply_to(msg.role));
        println!("{}", msg.content.trim());
        println!();
    }
}
