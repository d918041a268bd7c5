//! Server error types with context and recovery suggestions.

use std::io;

use thiserror::Error;

/// Result type for server operations.
pub type Result<T, E = ServerError> = std::result::Result<T, E>;

/// Error type for server startup and runtime with recovery suggestions.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Server configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to bind to the specified address.
    #[error("Failed to bind to {address}: {source}")]
    BindError {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Runtime server error.
    #[error("Runtime error: {0}")]
    Runtime(#[source] io::Error),

    /// In-flight requests did not finish within the shutdown timeout.
    #[error("Graceful shutdown timed out after {0} seconds")]
    ShutdownTimeout(u64),
}

impl ServerError {
    /// Creates an invalid configuration error from an anyhow error, keeping its context chain.
    pub fn invalid_config(err: &anyhow::Error) -> Self {
        Self::InvalidConfig(format!("{err:#}"))
    }

    /// Creates a bind error with address context.
    pub fn bind_error(address: &str, source: io::Error) -> Self {
        Self::BindError {
            address: address.to_owned(),
            source,
        }
    }

    /// Returns a unique error code for this error type.
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "E001",
            Self::BindError { .. } => "E002",
            Self::Runtime(_) => "E003",
            Self::ShutdownTimeout(_) => "E004",
        }
    }

    /// Determines if this error is potentially recoverable.
    ///
    /// Recoverable errors might succeed if retried or if the environment
    /// changes (a different port, a released address).
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidConfig(_) => false,
            Self::ShutdownTimeout(_) => true,
            Self::BindError { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::PermissionDenied
                    | io::ErrorKind::AddrInUse
                    | io::ErrorKind::AddrNotAvailable
            ),
            Self::Runtime(err) => matches!(
                err.kind(),
                io::ErrorKind::PermissionDenied
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionRefused
            ),
        }
    }

    /// Provides a human-readable suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidConfig(_) => Some(
                "Check your arguments and environment variables; JWT_SECRET must be at least 32 bytes",
            ),
            Self::BindError { source, .. } => match source.kind() {
                io::ErrorKind::PermissionDenied => {
                    Some("Try using a port above 1024 or run with appropriate privileges")
                }
                io::ErrorKind::AddrInUse => Some(
                    "The port is already in use. Try a different port or stop the conflicting service",
                ),
                io::ErrorKind::AddrNotAvailable => {
                    Some("The address is not available. Check network interface configuration")
                }
                _ => Some("Check network configuration and firewall settings"),
            },
            Self::Runtime(err) => match err.kind() {
                io::ErrorKind::PermissionDenied => Some("Check file and network permissions"),
                io::ErrorKind::Interrupted => Some("The operation was interrupted, you may retry"),
                io::ErrorKind::TimedOut => {
                    Some("The operation timed out, consider increasing timeout values")
                }
                _ => None,
            },
            Self::ShutdownTimeout(_) => {
                Some("Increase SHUTDOWN_TIMEOUT or REQUEST_TIMEOUT so in-flight requests can finish")
            }
        }
    }
}
