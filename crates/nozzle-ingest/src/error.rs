use thiserror::Error;

/// Errors raised while standing up or driving the ingestion pipeline.
///
/// Construction and startup-token failures are fatal to the process; the
/// stream variants are recovered by reopening the stream.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("UAA token request failed: {0}")]
    TokenRequest(#[source] reqwest::Error),

    #[error("UAA rejected the token request with status {0}")]
    TokenRejected(http::StatusCode),

    #[error("RLP gateway request failed: {0}")]
    StreamRequest(#[source] reqwest::Error),

    #[error("RLP gateway rejected the stream request with status {0}")]
    StreamRejected(http::StatusCode),
}
