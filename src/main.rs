mod agent;
mod cli;
mod config;
mod error;
mod openai;
mod storage;
#[cfg(test)]
mod testing;
mod ui;
mod workflow;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use agent::{AgentRegistry, JOKE_AGENT_ID, Memory, joke_agent};
use cli::{Cli, Command, workflow_input};
use config::{CONFIG_FILE, JokeflowConfig};
use openai::OpenAiClient;
use storage::Store;
use workflow::{ConsumeMode, JokeWorkflow, RunOptions, STEPS, WorkflowRun};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "jokeflow=debug"
    } else {
        "jokeflow=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Abre o banco SQLite configurado, criando o arquivo se necessário.
fn open_store(config: &JokeflowConfig) -> Result<Arc<Store>> {
    let store = Store::open_location(&config.storage_location())
        .with_context(|| format!("failed to open storage at {}", config.storage_path))?;
    Ok(Arc::new(store))
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    let mut config = JokeflowConfig::load(config_path).with_context(|| {
        format!(
            "failed to load {}",
            config_path.unwrap_or(Path::new(CONFIG_FILE)).display()
        )
    })?;
    if let Some(model) = cli.model {
        config.model = model;
    }

    match cli.command {
        Command::Run {
            topic,
            format,
            input,
            stream,
            thread,
            json,
        } => {
            let workflow_input = workflow_input(input.as_deref(), topic, format)?;

            if config.api_key.is_empty() && config.base_url == openai::client::API_BASE_URL {
                tracing::warn!("OPENAI_API_KEY is not set; requests will likely be rejected");
            }
            let client = OpenAiClient::from_config(&config)?;
            let store = open_store(&config)?;
            let memory = Memory::new(store.clone(), config.last_messages);
            let mut registry = AgentRegistry::new();
            registry.register(JOKE_AGENT_ID, joke_agent(client, &config, Some(memory)));

            let options = RunOptions {
                mode: if stream {
                    ConsumeMode::Stream
                } else {
                    ConsumeMode::Generate
                },
                thread_id: thread,
            };
            let progress = ui::RunProgress::new(options.mode);
            let run = JokeWorkflow::new(&registry)
                .with_store(store)
                .run(workflow_input, &options, &progress)
                .await?;

            if json {
                ui::print_run_json(&run);
            } else {
                progress.print_summary(&run);
            }
        }
        Command::Runs { limit } => {
            ui::print_runs(&WorkflowRun::list(&*open_store(&config)?, limit)?);
        }
        Command::Show { run_id } => {
            ui::print_run_json(&WorkflowRun::load(&*open_store(&config)?, &run_id)?);
        }
        Command::Threads { limit } => {
            ui::print_threads(&open_store(&config)?.list_threads(limit)?);
        }
        Command::History { thread_id, limit } => {
            let store = open_store(&config)?;
            if store.thread(&thread_id)?.is_none() {
                anyhow::bail!("Thread not found: {thread_id}");
            }
            ui::print_history(&store.recent_messages(&thread_id, limit)?);
        }
        Command::Agent => {
            println!("id:     {JOKE_AGENT_ID}");
            println!("name:   {}", agent::JOKE_AGENT_NAME);
            println!("model:  {}", config.model);
            println!("memory: {}", config.storage_path);
            println!("steps:");
            for (id, description) in STEPS {
                println!("  {id:<18} {description}");
            }
            println!("instructions:");
            for line in agent::JOKE_AGENT_INSTRUCTIONS.trim().lines() {
                println!("  {}", line.trim());
            }
        }
    }

    Ok(())
}
