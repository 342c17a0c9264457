//! Configuração do jokeflow carregada a partir de `jokeflow.toml`.
//!
//! A struct [`JokeflowConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `OPENAI_API_KEY` e `OPENAI_BASE_URL` têm
//! precedência sobre o arquivo.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::openai::client::API_BASE_URL;

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "jokeflow.toml";

/// Configuração de nível superior carregada de `jokeflow.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct JokeflowConfig {
    /// Chave da API OpenAI. Vazia para servidores locais sem autenticação.
    #[serde(default)]
    pub api_key: String,

    /// URL base do endpoint compatível com OpenAI.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Modelo usado pelo agente de piadas.
    #[serde(default = "default_model")]
    pub model: String,

    /// Arquivo SQLite usado como memória do agente e para snapshots das execuções.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,

    /// Quantas mensagens anteriores de uma thread são reenviadas ao modelo.
    #[serde(default = "default_last_messages")]
    pub last_messages: usize,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    API_BASE_URL.to_string()
}

// Valor padrão para o modelo: "gpt-4o-mini".
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_storage_path() -> String {
    "jokeflow.db".to_string()
}

fn default_last_messages() -> usize {
    10
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for JokeflowConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            storage_path: default_storage_path(),
            last_messages: default_last_messages(),
            max_tokens: None,
            temperature: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Onde o banco SQLite deve ser aberto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    InMemory,
    File(PathBuf),
}

impl JokeflowConfig {
    /// Carrega a configuração do caminho informado ou de `jokeflow.toml`
    /// no diretório atual. Usa valores padrão se o arquivo não existir.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(CONFIG_FILE));
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<JokeflowConfig>(&contents)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Variáveis de ambiente têm precedência sobre o arquivo de configuração.
    /// Valores vazios são ignorados.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|v| !v.is_empty()) {
            self.api_key = key;
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|v| !v.is_empty()) {
            self.base_url = url;
        }
    }

    /// Interpreta `storage_path`, aceitando o prefixo `file:` e `:memory:`.
    pub fn storage_location(&self) -> StorageLocation {
        let raw = self
            .storage_path
            .strip_prefix("file:")
            .unwrap_or(&self.storage_path);
        if raw == ":memory:" {
            StorageLocation::InMemory
        } else {
            StorageLocation::File(PathBuf::from(raw))
        }
    }
}
