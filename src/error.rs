//! Error types for artfuse

use thiserror::Error;

/// Result type alias for artfuse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for artfuse
#[derive(Debug, Error)]
pub enum Error {
    /// Input image could not be resized or encoded
    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    /// Network-level failure (DNS, TLS, connect, timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-2xx status
    #[error("Request failed with status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body text
        body: String,
    },

    /// Response body did not have the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A line of a newline-delimited JSON stream was not valid JSON
    #[error("Malformed stream line {line:?}: {source}")]
    StreamDecode {
        /// The offending line
        line: String,
        /// Underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create an image processing error
    pub fn image(msg: impl Into<String>) -> Self {
        Self::ImageProcessing(msg.into())
    }

    /// Create a malformed response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True for failures reported by the remote side (status or body shape),
    /// as opposed to transport or local failures.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Status { .. } | Self::MalformedResponse(_) | Self::StreamDecode { .. }
        )
    }
}
