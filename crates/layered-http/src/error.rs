//! HTTP client error types

use std::path::PathBuf;

use thiserror::Error;

use crate::{options::ProxyType, response::Response};

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, HttpError>;

/// Boxed error returned by caller-supplied proxy resolvers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Reason a redirect was not followed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedirectDenied {
    /// Redirects are disabled (follow-location off or a zero limit)
    #[error("redirect not allowed")]
    NotAllowed,

    /// The chain already holds `hops` requests
    #[error("stopped after {hops} redirects")]
    LimitReached { hops: usize },

    /// Denied by a caller-supplied redirect check
    #[error("{0}")]
    Custom(String),
}

/// HTTP client errors
#[derive(Debug, Error)]
pub enum HttpError {
    /// Network request failed
    #[error("Network request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid proxy configuration
    #[error("Invalid proxy configuration: {0}")]
    InvalidProxy(String),

    /// Proxy scheme other than plain HTTP
    #[error("Unsupported proxy type {0:?}, only Http is supported")]
    UnsupportedProxy(ProxyType),

    /// Caller-supplied proxy resolver failed
    #[error("Proxy resolution failed: {0}")]
    ProxyResolution(#[source] BoxError),

    /// Header name or value rejected
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Redirect refused by the active policy; the redirect response is kept
    #[error("Redirect denied: {denied}")]
    Redirect {
        denied: RedirectDenied,
        response: Box<Response>,
    },

    /// A multipart file field could not be read
    #[error("Failed to read form file {}: {source}", path.display())]
    FileAttachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Response body could not be decoded
    #[error("Failed to decode response body: {0}")]
    Decode(#[source] std::io::Error),

    /// Response body is not UTF-8
    #[error("Response body is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Client build error
    #[error("Failed to build HTTP client: {0}")]
    BuildError(String),
}

impl HttpError {
    /// Check if error is retryable.
    ///
    /// The client never retries on its own; this is for callers that loop.
    pub fn is_retryable(&self) -> bool {
        match self {
            HttpError::RequestFailed(e) => {
                // Retry on network errors, not client errors
                e.is_timeout() || e.is_connect() || e.is_request()
            }
            _ => false,
        }
    }

    /// Whether the error came from the redirect policy
    pub fn is_redirect_denied(&self) -> bool {
        matches!(self, HttpError::Redirect { .. })
    }

    /// Denial reason for redirect errors
    pub fn redirect_denied(&self) -> Option<&RedirectDenied> {
        match self {
            HttpError::Redirect { denied, .. } => Some(denied),
            _ => None,
        }
    }

    /// Take the last received response, if the error carries one
    pub fn into_response(self) -> Option<Response> {
        match self {
            HttpError::Redirect { response, .. } => Some(*response),
            _ => None,
        }
    }
}
