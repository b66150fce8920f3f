//! The chat-completion client.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::provider::OpenAiTransport;

use super::{
    config::{ClientConfig, ResolvedConfig},
    error::LlmError,
    stream::ChatStream,
    traits::ChatTransport,
    types::{ChatRequest, Message},
};

/// Per-call limits. Both are optional; by default a call runs until the transport
/// finishes or fails.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub cancellation: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Buffered and streaming chat completions against one model.
///
/// The model and credential are fixed at construction. Each call is independent,
/// so a client can be shared across tasks and reused after a failed call.
pub struct ChatCompletionClient<T = OpenAiTransport> {
    model: String,
    transport: T,
}

impl ChatCompletionClient<OpenAiTransport> {
    /// Build a client for the OpenAI API, taking the credential from
    /// `OPENAI_API_KEY` when `config` carries none.
    pub fn new(config: ClientConfig) -> Result<Self, LlmError> {
        Self::from_resolved(config.resolve()?)
    }

    pub fn from_resolved(config: ResolvedConfig) -> Result<Self, LlmError> {
        let transport = OpenAiTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: ChatTransport> ChatCompletionClient<T> {
    pub fn with_transport(config: ResolvedConfig, transport: T) -> Self {
        Self {
            model: config.model().to_string(),
            transport,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send the conversation and wait for the whole reply.
    ///
    /// Returns `Ok(None)` when the provider produced no content for the first choice.
    pub async fn chat(&self, messages: &[Message]) -> Result<Option<String>, LlmError> {
        self.chat_with(messages, RequestOptions::default()).await
    }

    #[tracing::instrument(
        name = "chat",
        skip(self, messages, options),
        fields(model = %self.model, messages = messages.len()),
        err
    )]
    pub async fn chat_with(
        &self,
        messages: &[Message],
        options: RequestOptions,
    ) -> Result<Option<String>, LlmError> {
        let request = self.build_request(messages, false);
        let response = guarded(self.transport.submit(request), &options).await?;

        let content = response.first_content();
        if content.is_none() {
            tracing::debug!("Provider returned no content");
        }
        Ok(content)
    }

    /// Send the conversation and return the reply as a lazy stream of text chunks.
    pub async fn stream_chat(&self, messages: &[Message]) -> Result<ChatStream, LlmError> {
        self.stream_chat_with(messages, RequestOptions::default())
            .await
    }

    /// Like [`stream_chat`](Self::stream_chat). A timeout in `options` bounds the whole
    /// exchange, from sending the request to reading the last chunk.
    #[tracing::instrument(
        name = "stream_chat",
        skip(self, messages, options),
        fields(model = %self.model, messages = messages.len()),
        err
    )]
    pub async fn stream_chat_with(
        &self,
        messages: &[Message],
        options: RequestOptions,
    ) -> Result<ChatStream, LlmError> {
        let deadline = options.timeout.map(|timeout| (Instant::now() + timeout, timeout));
        let request = self.build_request(messages, true);
        let chunks = guarded(self.transport.submit_streaming(request), &options).await?;

        let mut stream = ChatStream::new(chunks);
        if let Some(token) = options.cancellation {
            stream = stream.with_cancellation(token);
        }
        if let Some((deadline, timeout)) = deadline {
            stream = stream.with_deadline(deadline, timeout);
        }
        Ok(stream)
    }

    fn build_request(&self, messages: &[Message], stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            stream,
        }
    }
}

/// Run `fut` under the timeout and cancellation in `options`.
async fn guarded<F, R>(fut: F, options: &RequestOptions) -> Result<R, LlmError>
where
    F: Future<Output = Result<R, LlmError>>,
{
    let timed = async {
        match options.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout { timeout }),
            },
            None => fut.await,
        }
    };

    match &options.cancellation {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(LlmError::Cancelled),
                result = timed => result,
            }
        }
        None => timed.await,
    }
}
