//! Client error type and its mapping into the limiter's classification
//! vocabulary.

use thiserror::Error;

use vane_core::ApiError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api returned {status}: {message}")]
    Api {
        status: u16,
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("response decode error: {0}")]
    Decode(String),

    #[error("client not configured: {0}")]
    NotConfigured(String),
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Http(e) => {
                // Keep the transport failure mode in the message text so
                // classification can see "timeout"/"connection".
                let kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection"
                } else {
                    "network"
                };
                ApiError::new(format!("{kind} error: {e}"))
            }
            ClientError::Api {
                status,
                message,
                retry_after_ms,
            } => {
                let mut api = ApiError::with_status(message, status);
                api.retry_after_ms = retry_after_ms;
                api
            }
            ClientError::NotFound { resource } => ApiError::new(format!("{resource} not found")),
            ClientError::Decode(msg) => ApiError::new(format!("decode error: {msg}")),
            ClientError::NotConfigured(msg) => ApiError::new(format!("not configured: {msg}")),
        }
    }
}

/// Build a [`ClientError`] from a non-2xx response, preserving the status,
/// body text, and any `Retry-After` header.
pub(crate) async fn api_error_from_response(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let retry_after_ms = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| secs * 1_000);
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    ClientError::Api {
        status: status.as_u16(),
        message,
        retry_after_ms,
    }
}
