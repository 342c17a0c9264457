//! Interface de linha de comando do jokeflow baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, runs, show,
//! threads, history, agent) e flags globais (--model, --config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::error::Result;
use crate::workflow::{JokeFormat, WorkflowInput};

/// jokeflow: conta uma piada, melhora o desfecho e dá uma nota.
#[derive(Debug, Parser)]
#[command(name = "jokeflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Modelo a usar nesta sessão (sobrescreve `model` do arquivo de configuração).
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Caminho do arquivo de configuração (padrão: ./jokeflow.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Formato de piada aceito pela CLI, mapeado para [`JokeFormat`] internamente.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    KnockKnock,
    DadJoke,
    Pun,
    OneLiner,
}

impl From<FormatArg> for JokeFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::KnockKnock => JokeFormat::KnockKnock,
            FormatArg::DadJoke => JokeFormat::DadJoke,
            FormatArg::Pun => JokeFormat::Pun,
            FormatArg::OneLiner => JokeFormat::OneLiner,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa o workflow de piadas.
    Run {
        /// Tema da piada.
        #[arg(long)]
        topic: Option<String>,

        /// Formato da piada.
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Entrada completa em JSON, ex.: '{"topic":"cats","jokeFormat":"pun"}'.
        /// --topic e --format têm precedência sobre ela.
        #[arg(long)]
        input: Option<String>,

        /// Consome a resposta do agente como stream de tokens.
        #[arg(long, default_value_t = false)]
        stream: bool,

        /// Thread de memória compartilhada pelas chamadas ao agente.
        #[arg(long)]
        thread: Option<String>,

        /// Imprime o registro da execução em JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Lista as execuções persistidas, mais recentes primeiro.
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Mostra o snapshot de uma execução.
    Show {
        run_id: String,
    },

    /// Lista as threads de memória, com atividade mais recente primeiro.
    Threads {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Mostra as mensagens de uma thread de memória.
    History {
        thread_id: String,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Mostra a configuração do agente de piadas.
    Agent,
}

/// Monta a entrada do `run`: o JSON de `--input` (ou o padrão), com
/// `--topic` e `--format` sobrescrevendo os campos correspondentes.
pub fn workflow_input(
    input: Option<&str>,
    topic: Option<String>,
    format: Option<FormatArg>,
) -> Result<WorkflowInput> {
    let mut workflow_input = match input {
        Some(raw) => WorkflowInput::from_json(raw)?,
        None => WorkflowInput::default(),
    };
    if let Some(topic) = topic {
        workflow_input.topic = topic;
    }
    if let Some(format) = format {
        workflow_input.joke_format = format.into();
    }
    Ok(workflow_input)
}
