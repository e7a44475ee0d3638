//! Error types shared by the pipe engine and both tools.

use crate::config::ConfigError;
use std::io;
use thiserror::Error;

/// Errors surfaced by the engine, the transport and the applications.
#[derive(Debug, Error)]
pub enum PipeError {
    /// Creating or listening on a pipe failed.
    #[error("Error while creating pipe '{name}': {source}")]
    Create {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Opening an existing pipe failed.
    #[error("Error while opening pipe '{name}': {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A read on an established endpoint failed.
    #[error("[{endpoint}] error while reading data: {source}")]
    Read {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// A write on an established endpoint failed.
    #[error("[{endpoint}] error while writing data: {source}")]
    Write {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// The endpoint registry is full.
    #[error("endpoint limit of {0} reached")]
    EndpointLimit(usize),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipeError {
    /// Whether this error came from I/O on an established endpoint.
    pub fn is_io(&self) -> bool {
        matches!(self, PipeError::Read { .. } | PipeError::Write { .. })
    }
}

/// Result alias using [`PipeError`].
pub type Result<T> = std::result::Result<T, PipeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_name_and_os_error() {
        let err = PipeError::Create {
            name: r"\\.\pipe\agent".to_string(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        let msg = err.to_string();
        assert!(msg.starts_with(r"Error while creating pipe '\\.\pipe\agent'"));
        assert!(!err.is_io());
    }

    #[test]
    fn test_io_classification() {
        let err = PipeError::Read {
            endpoint: "A".to_string(),
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        };
        assert!(err.is_io());
        assert!(err.to_string().starts_with("[A] error while reading data"));
    }
}
