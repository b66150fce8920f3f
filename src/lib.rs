//! # alfred
//!
//! A chat-completion client for OpenAI-compatible providers, with buffered and
//! streaming access behind one small API.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use alfred::{ChatCompletionClient, ClientConfig, Message};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Falls back to OPENAI_API_KEY and the default model.
//!     let client = ChatCompletionClient::new(ClientConfig::new())?;
//!     let messages = vec![Message::user("Tell me a fact about space.")];
//!
//!     if let Some(reply) = client.chat(&messages).await? {
//!         println!("{reply}");
//!     }
//!
//!     let mut stream = client.stream_chat(&messages).await?;
//!     while let Some(chunk) = stream.next().await {
//!         print!("{}", chunk?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Testing against a stub
//!
//! [`ChatCompletionClient::with_transport`] accepts any [`ChatTransport`], so the
//! client can be exercised without network access.

pub mod core;
pub mod provider;

pub use crate::core::{
    ChatCompletionClient, ChatRequest, ChatResponse, ChatRole, ChatStream, ChatTransport,
    ChunkStream, ClientConfig, HttpClientConfig, InspectorConfig, LlmError, Message,
    RequestOptions, ResolvedConfig,
};
pub use crate::provider::OpenAiTransport;
pub use crate::provider::constants::openai::DEFAULT_MODEL;
