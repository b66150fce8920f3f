//! OpenAI chat-completions transport.
//!
//! Works with any server that speaks the OpenAI `/chat/completions` protocol when
//! pointed at it through the base URL.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::Deserialize;

use crate::core::{
    ChatRequest, ChatResponse, ChatTransport, ChunkStream, HttpClient, LlmError, ResolvedConfig,
    SseDecoder,
};
use crate::provider::constants::openai;

pub struct OpenAiTransport {
    http: HttpClient,
    base_url: String,
    api_key: String,
}

impl OpenAiTransport {
    pub fn new(config: &ResolvedConfig) -> Result<Self, LlmError> {
        let http = HttpClient::new(config.http_config().clone(), config.inspector().cloned())?;

        Ok(Self {
            http,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            api_key: config.api_key().to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, openai::CHAT_COMPLETIONS_ENDPOINT)
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        )]
    }
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    async fn submit(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let body: serde_json::Value = self
            .http
            .post_json(&self.url(), &self.headers(), &request)
            .await?;

        // Some compatible gateways report failures inside a 200 body.
        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            return Err(match ApiErrorBody::deserialize(error) {
                Ok(error) => error.into_llm_error(),
                Err(_) => LlmError::Api {
                    message: error
                        .as_str()
                        .map_or_else(|| error.to_string(), str::to_string),
                    status_code: None,
                },
            });
        }

        serde_json::from_value(body).map_err(|e| LlmError::Parse {
            message: "Response is not a chat completion".to_string(),
            source: Box::new(e),
        })
    }

    async fn submit_streaming(&self, request: ChatRequest) -> Result<ChunkStream, LlmError> {
        let response = self
            .http
            .post_stream(&self.url(), &self.headers(), &request)
            .await?;

        Ok(Box::pin(CompletionChunks::new(Box::pin(
            response.bytes_stream(),
        ))))
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl ApiErrorBody {
    fn into_llm_error(self) -> LlmError {
        let message = match self.kind {
            Some(kind) => format!("{kind}: {}", self.message),
            None => self.message,
        };
        LlmError::Api {
            message,
            status_code: None,
        }
    }
}

/// Text carried by one streamed chunk, if any.
fn parse_chunk(data: &str) -> Result<Option<String>, LlmError> {
    let chunk: StreamChunk = serde_json::from_str(data).map_err(|e| LlmError::Parse {
        message: "Failed to parse stream chunk".to_string(),
        source: Box::new(e),
    })?;

    if let Some(error) = chunk.error {
        return Err(error.into_llm_error());
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

/// Turns a server-sent-event body into completion text chunks.
///
/// Role-only and finish chunks carry no text and are skipped. The stream ends at
/// the `[DONE]` marker; a body that ends before it is reported as an error.
struct CompletionChunks<S> {
    inner: S,
    decoder: SseDecoder,
    body_ended: bool,
    done: bool,
}

impl<S> CompletionChunks<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: SseDecoder::new(),
            body_ended: false,
            done: false,
        }
    }
}

impl<S, E> Stream for CompletionChunks<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = Result<String, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.done {
                return Poll::Ready(None);
            }

            if let Some(data) = self.decoder.next_event() {
                if data == openai::STREAM_DONE {
                    self.done = true;
                    return Poll::Ready(None);
                }
                match parse_chunk(&data) {
                    Ok(Some(text)) => return Poll::Ready(Some(Ok(text))),
                    Ok(None) => continue,
                    Err(e) => {
                        self.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                }
            }

            if self.body_ended {
                self.done = true;
                return Poll::Ready(Some(Err(LlmError::Stream {
                    message: "Response ended before the completion marker".to_string(),
                })));
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => self.decoder.push(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(LlmError::Network {
                        message: "Failed to read response stream".to_string(),
                        source: Box::new(e),
                    })));
                }
                Poll::Ready(None) => {
                    self.body_ended = true;
                    self.decoder.finish();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, stream};

    fn body(
        parts: &[&str],
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin + use<> {
        let parts: Vec<Result<Bytes, std::io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        stream::iter(parts)
    }

    fn delta(text: &str) -> String {
        format!("data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{text}\"}}}}]}}\n\n")
    }

    #[tokio::test]
    async fn test_chunks_until_done_marker() {
        let role = "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n";
        let finish = "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n";
        let a = delta("a");
        let bc = format!("{}{}", delta("b"), delta("c"));
        let parts = [role, a.as_str(), bc.as_str(), finish, "data: [DONE]\n\n"];

        let chunks: Vec<String> = CompletionChunks::new(body(&parts))
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_events_split_mid_json() {
        let full = format!("{}data: [DONE]\n\n", delta("hello"));
        let (head, tail) = full.split_at(17);

        let chunks: Vec<String> = CompletionChunks::new(body(&[head, tail]))
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["hello"]);
    }

    #[tokio::test]
    async fn test_malformed_chunk_is_terminal() {
        let a = delta("a");
        let parts = [a.as_str(), "data: {not json\n\n", "data: [DONE]\n\n"];
        let mut chunks = CompletionChunks::new(body(&parts));

        assert_eq!(chunks.next().await.unwrap().unwrap(), "a");
        assert!(matches!(
            chunks.next().await,
            Some(Err(LlmError::Parse { .. }))
        ));
        assert!(chunks.next().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_done_marker_is_reported() {
        let a = delta("a");
        let parts = [a.as_str()];
        let mut chunks = CompletionChunks::new(body(&parts));

        assert_eq!(chunks.next().await.unwrap().unwrap(), "a");
        assert!(matches!(
            chunks.next().await,
            Some(Err(LlmError::Stream { .. }))
        ));
        assert!(chunks.next().await.is_none());
    }

    #[tokio::test]
    async fn test_error_payload_maps_to_api_error() {
        let parts = [
            "data: {\"error\":{\"message\":\"overloaded\",\"type\":\"server_error\"}}\n\n",
        ];
        let mut chunks = CompletionChunks::new(body(&parts));

        match chunks.next().await {
            Some(Err(LlmError::Api { message, .. })) => {
                assert_eq!(message, "server_error: overloaded");
            }
            other => panic!("Expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_body_read_failure_is_network_error() {
        let a = delta("a");
        let parts: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from(a)),
            Err(std::io::Error::from(std::io::ErrorKind::ConnectionReset)),
        ];
        let mut chunks = CompletionChunks::new(stream::iter(parts));

        assert_eq!(chunks.next().await.unwrap().unwrap(), "a");
        assert!(matches!(
            chunks.next().await,
            Some(Err(LlmError::Network { .. }))
        ));
        assert!(chunks.next().await.is_none());
    }
}
