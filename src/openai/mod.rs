pub mod client;
pub mod error;
pub mod types;

pub use client::{ChatModel, OpenAiClient};
pub use error::OpenAiError;
pub use types::{ChatMessage, ChatRequest, Role, Usage};
