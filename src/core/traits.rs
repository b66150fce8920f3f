use async_trait::async_trait;

use super::{
    error::LlmError,
    types::{ChatRequest, ChatResponse, ChunkStream},
};

/// The network boundary of a chat-completion client.
///
/// Implementations carry their own credentials and endpoint. They must not retain
/// per-request state, since a single transport serves concurrent calls.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a buffered request and wait for the full response.
    async fn submit(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Send a streaming request. The returned stream reads the response lazily and
    /// ends when the provider signals completion.
    async fn submit_streaming(&self, request: ChatRequest) -> Result<ChunkStream, LlmError>;
}
