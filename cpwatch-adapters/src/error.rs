//! Error types for adapters.

use cpwatch_types::{ArgumentError, DatasetError};
use thiserror::Error;

/// Errors that can occur when fetching or extracting test data.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The API answered with a non-success status.
    #[error("API returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// HTTP request failed before a status was received.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// The response body could not be decoded.
    #[error("{0}")]
    Payload(String),

    /// A folder resolved to no tests.
    #[error("No Test ids Found in folder {0}")]
    NoTests(String),

    /// The response decoded but did not have the expected shape.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// A caller-supplied argument was rejected.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Extracted rows could not be assembled into a dataset.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

impl AdapterError {
    /// Status code associated with this failure.
    ///
    /// HTTP failures carry their code. Undecodable payloads, malformed
    /// responses and empty folders report `0`. Transport and argument
    /// errors have no status.
    pub fn status(&self) -> Option<u16> {
        match self {
            AdapterError::Status { status, .. } => Some(*status),
            AdapterError::Payload(_) | AdapterError::NoTests(_) | AdapterError::Malformed(_) => {
                Some(0)
            }
            _ => None,
        }
    }

    /// Check if this is a rate-limit response.
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }
}

impl From<ArgumentError> for AdapterError {
    fn from(err: ArgumentError) -> Self {
        AdapterError::InvalidArgument(err.to_string())
    }
}

#[cfg(feature = "catchpoint")]
impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if err.is_connect() {
            AdapterError::Connection(err.to_string())
        } else {
            AdapterError::Http(err.to_string())
        }
    }
}
