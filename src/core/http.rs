//! Shared HTTP client used by provider transports.

use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::error::LlmError;

/// Configuration for HTTP client resilience
#[derive(Debug, Clone, PartialEq)]
pub struct HttpClientConfig {
    /// Total time for one buffered attempt. Streaming requests are bounded per call instead.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Additional attempts on transient failures. Zero disables retrying.
    pub max_retries: u32,
    /// Base duration for exponential backoff
    pub initial_retry_delay: Duration,
    /// Cap on the backoff duration
    pub max_retry_delay: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            max_retries: 0,
            initial_retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(10),
        }
    }
}

impl HttpClientConfig {
    /// Delay before the retry that follows `attempt` (zero-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_retry_delay.as_millis() as f64 * 2_f64.powi(attempt.min(30) as i32);

        // +/- 10% jitter (0.9 to 1.1)
        let jitter_factor = rand::random::<f64>() * 0.2 + 0.9;
        let delay_ms = (base_delay * jitter_factor) as u64;

        Duration::from_millis(delay_ms).min(self.max_retry_delay)
    }
}

pub type Inspector = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Hooks that observe raw JSON bodies, for debugging provider traffic.
#[derive(Clone, Default)]
pub struct InspectorConfig {
    pub request_inspector: Option<Inspector>,
    pub response_inspector: Option<Inspector>,
}

impl InspectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_inspector<F>(mut self, inspector: F) -> Self
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        self.request_inspector = Some(Arc::new(inspector));
        self
    }

    pub fn with_response_inspector<F>(mut self, inspector: F) -> Self
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        self.response_inspector = Some(Arc::new(inspector));
        self
    }

    fn inspect_request(&self, value: &serde_json::Value) {
        if let Some(ref inspector) = self.request_inspector {
            inspector(value);
        }
    }

    fn inspect_response(&self, value: &serde_json::Value) {
        if let Some(ref inspector) = self.response_inspector {
            inspector(value);
        }
    }
}

impl std::fmt::Debug for InspectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectorConfig")
            .field("request_inspector", &self.request_inspector.is_some())
            .field("response_inspector", &self.response_inspector.is_some())
            .finish()
    }
}

/// Shared HTTP client with optional retry and exponential backoff.
pub struct HttpClient {
    client: reqwest::Client,
    config: HttpClientConfig,
    inspector_config: Option<InspectorConfig>,
}

impl HttpClient {
    pub fn new(
        config: HttpClientConfig,
        inspector_config: Option<InspectorConfig>,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("alfred/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                LlmError::ProviderConfiguration(format!("Failed to build reqwest client: {e}"))
            })?;

        Ok(Self {
            client,
            config,
            inspector_config,
        })
    }

    /// POST a JSON body and deserialize the JSON response.
    #[tracing::instrument(
        name = "http_post_json",
        skip(self, headers, body),
        fields(url = %url),
        err
    )]
    pub async fn post_json<Req, Res>(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Req,
    ) -> Result<Res, LlmError>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let body_value = self.prepare_body(body)?;
        let res = self
            .send_with_retry(url, headers, &body_value, Some(self.config.timeout))
            .await?;

        let response_text = res.text().await.map_err(|e| LlmError::Network {
            message: "Failed to read response body".to_string(),
            source: Box::new(e),
        })?;

        let response_value: serde_json::Value =
            serde_json::from_str(&response_text).map_err(|e| LlmError::Parse {
                message: "Failed to parse response as JSON".to_string(),
                source: Box::new(e),
            })?;

        if let Some(ref config) = self.inspector_config {
            config.inspect_response(&response_value);
        }

        serde_json::from_value(response_value).map_err(|e| LlmError::Parse {
            message: "Failed to parse API response".to_string(),
            source: Box::new(e),
        })
    }

    /// POST a JSON body and hand back the successful response with its body unread.
    ///
    /// Only the initial exchange is retried; once the caller starts reading the body
    /// failures surface to it directly.
    #[tracing::instrument(
        name = "http_post_stream",
        skip(self, headers, body),
        fields(url = %url),
        err
    )]
    pub async fn post_stream<Req>(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Req,
    ) -> Result<reqwest::Response, LlmError>
    where
        Req: Serialize,
    {
        let body_value = self.prepare_body(body)?;
        let mut headers = headers.to_vec();
        headers.push(("Accept".to_string(), "text/event-stream".to_string()));

        self.send_with_retry(url, &headers, &body_value, None).await
    }

    fn prepare_body<Req: Serialize>(&self, body: &Req) -> Result<serde_json::Value, LlmError> {
        let body_value = serde_json::to_value(body).map_err(|e| LlmError::Parse {
            message: "Failed to serialize request".to_string(),
            source: Box::new(e),
        })?;

        if let Some(ref config) = self.inspector_config {
            config.inspect_request(&body_value);
        }

        Ok(body_value)
    }

    /// Retries on connection errors, 429 and 5xx when `max_retries > 0`.
    /// Fails immediately on other 4xx errors.
    async fn send_with_retry(
        &self,
        url: &str,
        headers: &[(String, String)],
        body_value: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..=self.config.max_retries {
            // .send() consumes the builder, so it is rebuilt on each attempt
            let mut req_builder = self.client.post(url).json(body_value);
            if let Some(timeout) = timeout {
                req_builder = req_builder.timeout(timeout);
            }
            for (name, value) in headers {
                req_builder = req_builder.header(name, value);
            }

            match req_builder.send().await {
                Err(e) => {
                    warn!(attempt, error = %e, "HTTP request failed");
                    last_error = Some(LlmError::Network {
                        message: format!(
                            "Request failed (attempt {}/{})",
                            attempt + 1,
                            self.config.max_retries + 1
                        ),
                        source: Box::new(e),
                    });
                }
                Ok(res) => {
                    let status = res.status();

                    if status.is_success() {
                        debug!(status = %status, "HTTP request successful");
                        return Ok(res);
                    }

                    warn!(attempt, status = %status, "API returned error status");

                    let is_retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error();
                    let error_text = res
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());

                    if let Some(ref config) = self.inspector_config {
                        let error_value = serde_json::from_str(&error_text).unwrap_or_else(|_| {
                            serde_json::json!({
                                "error": error_text,
                                "status_code": status.as_u16()
                            })
                        });
                        config.inspect_response(&error_value);
                    }

                    let error = LlmError::Api {
                        message: format!("{status}: {error_text}"),
                        status_code: Some(status.as_u16()),
                    };

                    if !is_retryable {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
            }

            if attempt < self.config.max_retries {
                let delay = self.config.backoff_delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying request");
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Api {
            message: format!(
                "Request failed after max retries ({}) with unknown error",
                self.config.max_retries
            ),
            status_code: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_does_not_retry() {
        let config = HttpClientConfig::default();
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_delay_grows_and_is_capped() {
        let config = HttpClientConfig {
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_millis(1000),
            ..HttpClientConfig::default()
        };

        let first = config.backoff_delay(0);
        assert!(first >= Duration::from_millis(90) && first <= Duration::from_millis(110));

        let third = config.backoff_delay(2);
        assert!(third >= Duration::from_millis(360) && third <= Duration::from_millis(440));

        assert_eq!(config.backoff_delay(10), Duration::from_millis(1000));
        assert_eq!(config.backoff_delay(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_inspector_debug_hides_callbacks() {
        let config = InspectorConfig::new().with_request_inspector(|_| {});
        let debug = format!("{config:?}");
        assert!(debug.contains("request_inspector: true"));
        assert!(debug.contains("response_inspector: false"));
    }
}
