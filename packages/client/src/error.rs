//! Error types for the blocking client layer.
//!
//! Every failure coming out of reqwest, url or serde_json is converted into
//! a [`StoreError`] at the point of the blocking call. Layers above the
//! client never see a backend error type directly.

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("invalid URL: {message}")]
    InvalidUrl { message: String },

    #[error("store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid index metadata: {message}")]
    InvalidIndexMetadata { message: String },

    #[error("invalid response from store: {message}")]
    InvalidResponse { message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("cannot decode payload with content type {content_type}")]
    Encoding { content_type: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn invalid_response(message: impl Into<String>) -> Self {
        StoreError::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn invalid_index(message: impl Into<String>) -> Self {
        StoreError::InvalidIndexMetadata {
            message: message.into(),
        }
    }
}

/// Result type alias for blocking store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
