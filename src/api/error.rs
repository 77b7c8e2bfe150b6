use thiserror::Error;

/// Errors raised by the API client and its transports.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("server returned status {0}")]
    Status(u16),

    #[error("unexpected content type {found:?} for {path}")]
    UnexpectedContentType { path: String, found: Option<String> },

    #[error("missing Last-Modified-Version header for {0}")]
    MissingVersion(String),

    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}
