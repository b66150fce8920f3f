pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod sse;
pub mod stream;
pub mod traits;
pub mod types;

pub use client::{ChatCompletionClient, RequestOptions};
pub use config::{ClientConfig, ResolvedConfig};
pub use error::LlmError;
pub use http::{HttpClient, HttpClientConfig, Inspector, InspectorConfig};
pub use sse::SseDecoder;
pub use stream::ChatStream;
pub use traits::ChatTransport;
pub use types::{
    ChatRequest, ChatResponse, ChatRole, Choice, ChoiceMessage, ChunkStream, Message, Usage,
};
