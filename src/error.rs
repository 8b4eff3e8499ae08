use thiserror::Error;

use crate::protocol::{error_codes, ResponseError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("JSON-RPC error: {code} - {message}")]
    JsonRpc { code: i32, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Capability(String),

    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Converts this error into a wire-level JSON-RPC error object.
    ///
    /// Language-level structure never leaks to the peer: every variant maps
    /// to a stable code and a human-readable message.
    pub fn to_response_error(&self) -> ResponseError {
        let (code, message) = match self {
            Error::JsonRpc { code, message } => (*code, message.clone()),
            Error::Capability(msg) => (error_codes::CAPABILITY_NOT_SUPPORTED, msg.clone()),
            Error::Initialization(msg) => (error_codes::NOT_INITIALIZED, msg.clone()),
            Error::Serialization(e) => (error_codes::INVALID_PARAMS, e.to_string()),
            other => (error_codes::INTERNAL_ERROR, other.to_string()),
        };
        ResponseError {
            code,
            message,
            data: None,
        }
    }

    /// Returns true if this error carries the capability-missing wire code.
    pub fn is_capability(&self) -> bool {
        matches!(
            self,
            Error::Capability(_)
                | Error::JsonRpc {
                    code: error_codes::CAPABILITY_NOT_SUPPORTED,
                    ..
                }
        )
    }
}

impl From<ResponseError> for Error {
    fn from(err: ResponseError) -> Self {
        Error::JsonRpc {
            code: err.code,
            message: err.message,
        }
    }
}
