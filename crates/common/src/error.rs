use thiserror::Error;

/// Common error types for the peerwire transport
#[derive(Error, Debug)]
pub enum PeerwireError {
    /// Network related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Network specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// A received message could not be decoded and must be dropped
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// The buffer pool refused an allocation
    #[error("Buffer pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, PeerwireError>;

impl From<config::ConfigError> for PeerwireError {
    fn from(err: config::ConfigError) -> Self {
        PeerwireError::Config(format!("Configuration error: {}", err))
    }
}

/// Error context helper
pub trait ErrorContext<T> {
    fn with_context(self, context: &str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<PeerwireError>,
{
    fn with_context(self, context: &str) -> Result<T> {
        self.map_err(|e| match e.into() {
            PeerwireError::Network(NetworkError::MalformedMessage(msg)) => {
                PeerwireError::Network(NetworkError::MalformedMessage(format!("{}: {}", context, msg)))
            }
            PeerwireError::Network(NetworkError::PoolExhausted(msg)) => {
                PeerwireError::Network(NetworkError::PoolExhausted(format!("{}: {}", context, msg)))
            }
            PeerwireError::Network(NetworkError::Protocol(msg)) => {
                PeerwireError::Network(NetworkError::Protocol(format!("{}: {}", context, msg)))
            }
            PeerwireError::Config(msg) => PeerwireError::Config(format!("{}: {}", context, msg)),
            PeerwireError::Internal(msg) => PeerwireError::Internal(format!("{}: {}", context, msg)),
            other => PeerwireError::Internal(format!("{}: {}", context, other)),
        })
    }
}
