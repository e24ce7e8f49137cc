//! Error types for edgetag services

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EdgeTagError>;

#[derive(Error, Debug)]
pub enum EdgeTagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EdgeTagError {
    /// Whether a device session may retry after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::Internal(_))
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Auth(_) => "AUTH_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Stream(_) => "STREAM_ERROR",
            Self::Decode(_) => "DECODE_ERROR",
            Self::Metadata(_) => "METADATA_ERROR",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<std::io::Error> for EdgeTagError {
    fn from(err: std::io::Error) -> Self {
        EdgeTagError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for EdgeTagError {
    fn from(err: serde_json::Error) -> Self {
        EdgeTagError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_and_internal_are_fatal() {
        assert!(!EdgeTagError::Config("x".into()).is_recoverable());
        assert!(!EdgeTagError::Internal("x".into()).is_recoverable());
        assert!(EdgeTagError::Auth("x".into()).is_recoverable());
        assert!(EdgeTagError::Stream("x".into()).is_recoverable());
        assert!(EdgeTagError::Decode("x".into()).is_recoverable());
    }

    #[test]
    fn test_serde_errors_map_to_decode() {
        let err: EdgeTagError = serde_json::from_str::<Vec<u8>>("{").unwrap_err().into();
        assert_eq!(err.error_code(), "DECODE_ERROR");
    }
}
