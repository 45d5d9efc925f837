use crate::error::{NetworkError, PeerwireError, Result};
use tracing::{debug, error, instrument, warn};

/// Error handling utilities for the transport
pub struct ErrorHandler;

impl ErrorHandler {
    /// Handle and log errors appropriately
    #[instrument(skip_all)]
    pub fn handle_error<T>(result: Result<T>, operation: &str) -> Option<T> {
        match result {
            Ok(value) => {
                debug!("Operation '{}' completed successfully", operation);
                Some(value)
            }
            Err(err) => {
                Self::log_error(&err, operation);
                None
            }
        }
    }

    /// Handle errors that should be propagated
    #[instrument(skip_all)]
    pub fn handle_error_propagate<T>(result: Result<T>, operation: &str) -> Result<T> {
        match result {
            Ok(value) => {
                debug!("Operation '{}' completed successfully", operation);
                Ok(value)
            }
            Err(err) => {
                Self::log_error(&err, operation);
                Err(err)
            }
        }
    }

    /// Log errors with appropriate level based on error type
    fn log_error(error: &PeerwireError, operation: &str) {
        match error {
            PeerwireError::Network(NetworkError::MalformedMessage(msg)) => {
                warn!("Malformed message in '{}': {}", operation, msg);
            }
            PeerwireError::Network(net_err) => {
                warn!("Network error in '{}': {}", operation, net_err);
            }
            PeerwireError::Config(config_err) => {
                error!("Configuration error in '{}': {}", operation, config_err);
            }
            PeerwireError::Io(io_err) => {
                error!("I/O error in '{}': {}", operation, io_err);
            }
            PeerwireError::Serialization(serial_err) => {
                error!("Serialization error in '{}': {}", operation, serial_err);
            }
            PeerwireError::Internal(internal_err) => {
                error!("Internal error in '{}': {}", operation, internal_err);
            }
        }
    }

    /// Create a context-aware error
    pub fn context_error(message: &str) -> PeerwireError {
        PeerwireError::Internal(message.to_string())
    }

    /// Check if the message may be retried later
    pub fn is_recoverable(error: &PeerwireError) -> bool {
        matches!(
            error,
            PeerwireError::Network(NetworkError::PoolExhausted(_)) | PeerwireError::Io(_)
        )
    }

    /// Check if the peer that sent the message should be disconnected
    pub fn should_drop_connection(error: &PeerwireError) -> bool {
        matches!(
            error,
            PeerwireError::Network(NetworkError::MalformedMessage(_))
                | PeerwireError::Network(NetworkError::Protocol(_))
        )
    }
}

/// Macro for convenient error handling
#[macro_export]
macro_rules! handle_error {
    ($expr:expr, $operation:expr) => {
        $crate::utils::error_handler::ErrorHandler::handle_error($expr, $operation)
    };
}

#[macro_export]
macro_rules! handle_error_propagate {
    ($expr:expr, $operation:expr) => {
        $crate::utils::error_handler::ErrorHandler::handle_error_propagate($expr, $operation)
    };
}

#[macro_export]
macro_rules! context_error {
    ($msg:expr) => {
        $crate::utils::error_handler::ErrorHandler::context_error($msg)
    };
}
