//! Tipos de erro para o cliente de chat completions compatível com OpenAI.
//!
//! Define [`OpenAiError`] com variantes para rate limiting, erros da API,
//! erros de rede e falhas de decodificação do stream SSE.

use thiserror::Error;

/// Erros que podem ocorrer ao interagir com o endpoint `/chat/completions`.
///
/// - [`RateLimited`](OpenAiError::RateLimited): o servidor retornou HTTP 429
/// - [`ApiError`](OpenAiError::ApiError): qualquer outro erro HTTP (4xx/5xx)
/// - [`NetworkError`](OpenAiError::NetworkError): falha na camada de rede
#[derive(Debug, Error)]
pub enum OpenAiError {
    /// O servidor retornou HTTP 429 (rate limit).
    /// O campo `retry_after_ms` indica quantos milissegundos esperar.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Erro retornado pela API (ex.: 401 chave inválida, 500 erro interno).
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error")]
    NetworkError(#[from] reqwest::Error),

    /// A resposta não trouxe nenhuma `choice`.
    #[error("model returned no choices")]
    EmptyResponse,

    /// Um evento do stream não pôde ser decodificado.
    #[error("malformed stream chunk: {0}")]
    Stream(String),
}
