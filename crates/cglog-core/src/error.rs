//! Error types for the cglog engine

use thiserror::Error;

/// Main error type for cglog operations.
///
/// Only configuration and lifecycle calls return these. Logging calls never
/// fail: sink I/O problems are absorbed by the sink manager.
#[derive(Error, Debug)]
pub enum LogError {
    /// `init` was called after the process-wide engine was already set up
    #[error("already initialized")]
    AlreadyInitialized,

    /// Malformed `pattern=N[,pattern=N...]` verbosity override list
    #[error("invalid vmodule spec {spec:?}: {reason}")]
    InvalidVModule { spec: String, reason: String },

    /// Unknown stderr threshold name
    #[error("invalid stderr threshold {0:?}: expected info, warning, error or fatal")]
    InvalidThreshold(String),

    /// Malformed `file:line` trace location
    #[error("invalid trace location {value:?}: {reason}")]
    InvalidTraceLocation { value: String, reason: String },

    /// General I/O error (e.g. the flush thread could not be spawned)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LogError {
    /// True for errors caused by malformed configuration values.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidVModule { .. } | Self::InvalidThreshold(_) | Self::InvalidTraceLocation { .. }
        )
    }
}

/// Result type alias using LogError
pub type LogResult<T> = Result<T, LogError>;
