use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    /// No usable configuration could be resolved, e.g. a missing API key.
    #[error("Provider configuration error: {0}")]
    ProviderConfiguration(String),

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The provider answered with a non-success status or an error payload.
    #[error("API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Parse error: {message}")]
    Parse {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A streamed response terminated without the provider's completion marker.
    #[error("Stream error: {message}")]
    Stream { message: String },

    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Request was cancelled")]
    Cancelled,
}

impl LlmError {
    /// True for failures raised by the transport: network, status, and payload errors.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LlmError::Network { .. }
                | LlmError::Api { .. }
                | LlmError::Parse { .. }
                | LlmError::Stream { .. }
        )
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            LlmError::Api { status_code, .. } => *status_code,
            _ => None,
        }
    }
}
