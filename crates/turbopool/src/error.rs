//! Pool error types.

use thiserror::Error;

/// Result type for pool operations
pub type PoolResult<T> = std::result::Result<T, PoolError>;

/// Errors that can occur in pool operations
///
/// `Clone` is required because establishment failures travel through a
/// shared connection future and are observed by every holder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool is at its ceiling and nothing is available for lease
    #[error("Pool capacity exceeded")]
    CapacityExceeded,

    /// The pool has been closed and no longer hands out connections
    #[error("Pool is closed")]
    Closed,

    /// The pool has been shut down and is permanently unusable
    #[error("Pool has been shut down")]
    ShutDown,

    /// `close` was called on a pool that was already closed
    #[error("Pool already closed")]
    AlreadyClosed,

    /// A connection was returned that the pool does not hold as leased
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    /// The connector failed to establish a connection
    #[error("Connection establishment failed: {0}")]
    EstablishFailed(String),

    /// Invalid construction parameters
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No async runtime is available to run background work
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl PoolError {
    /// Whether the caller should back off and retry later.
    #[must_use]
    pub const fn is_backpressure(&self) -> bool {
        matches!(self, Self::CapacityExceeded)
    }

    /// Whether the error is permanent for this pool instance.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Closed | Self::ShutDown)
    }
}

impl From<std::io::Error> for PoolError {
    fn from(err: std::io::Error) -> Self {
        Self::EstablishFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(PoolError::CapacityExceeded.to_string(), "Pool capacity exceeded");
        let err = PoolError::UnknownConnection("42".to_string());
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_error_classification() {
        assert!(PoolError::CapacityExceeded.is_backpressure());
        assert!(!PoolError::CapacityExceeded.is_permanent());
        assert!(PoolError::Closed.is_permanent());
        assert!(PoolError::ShutDown.is_permanent());
        assert!(!PoolError::AlreadyClosed.is_permanent());
        assert!(!PoolError::EstablishFailed("refused".into()).is_backpressure());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: PoolError = io.into();
        assert!(matches!(err, PoolError::EstablishFailed(ref msg) if msg.contains("refused")));
    }
}
