//! OpenAI provider implementation
//!
//! Embedding and chat completion over the OpenAI HTTP API.

pub mod chat;
pub mod client;
pub mod embedding;
pub mod types;

pub use chat::OpenAiChatProvider;
pub use client::OpenAiClient;
pub use embedding::OpenAiEmbeddingProvider;
