//! Error types shared by the music gateway.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias returning [`MusicGatewayError`] failures.
pub type MusicResult<T> = Result<T, MusicGatewayError>;

/// Failures that can occur while talking to the external music service.
#[derive(Debug, Error)]
pub enum MusicGatewayError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build music service client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent or timed out.
    #[error("failed to send music service request to `{endpoint}`")]
    RequestSend {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// The service rate-limited us; retry after the carried interval.
    #[error("music service rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    /// The service returned an unexpected status code.
    #[error("unexpected music service status {status} for `{endpoint}`: {body}")]
    RequestStatus {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    /// Response payload could not be parsed into the expected JSON shape.
    #[error("failed to decode music service response for `{endpoint}`")]
    DecodeResponse {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// The authorize URL could not be constructed from the configured base.
    #[error("invalid music service base URL `{url}`")]
    InvalidBaseUrl { url: String },
}
