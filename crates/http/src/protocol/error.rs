use std::io;
use thiserror::Error;

/// Errors produced while fetching a fragment over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid fragment url: {reason}")]
    InvalidUrl { reason: String },

    #[error("unsupported url scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("connect error: {source}")]
    Connect { source: io::Error },

    #[error("response header size exceed the limit {max_size}")]
    TooLargeHeader { max_size: usize },

    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },

    #[error("connection closed before the response completed")]
    UnexpectedEof,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl FetchError {
    pub fn invalid_url<S: ToString>(reason: S) -> Self {
        Self::InvalidUrl { reason: reason.to_string() }
    }

    pub fn invalid_response<S: ToString>(reason: S) -> Self {
        Self::InvalidResponse { reason: reason.to_string() }
    }

    pub fn connect(source: io::Error) -> Self {
        Self::Connect { source }
    }
}
