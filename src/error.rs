//! Error types
//!
//! Only adapter setup and configuration surface errors to callers. Faults
//! inside a running link are handled by the link itself and reported
//! through logs and counters.

use std::io;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by hub and transport setup
#[derive(Debug)]
pub enum Error {
    /// Socket or file I/O failure
    Io(io::Error),
    /// Every channel in the pool is occupied
    PoolExhausted {
        /// Number of channels in the pool
        capacity: usize,
    },
    /// Serial device could not be opened or configured
    Serial {
        /// Device path
        device: String,
        /// Underlying OS error
        source: io::Error,
    },
    /// Configuration rejected by validation
    InvalidConfig(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::PoolExhausted { capacity } => {
                write!(f, "All {} channels are occupied", capacity)
            }
            Error::Serial { device, source } => {
                write!(f, "Serial device {}: {}", device, source)
            }
            Error::InvalidConfig(reason) => write!(f, "Invalid configuration: {}", reason),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Serial { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Failure reported by a [`LinkHandler`](crate::link::LinkHandler) for one frame
///
/// Logged by the link; never terminates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No handler exists for this message id
    Unsupported(u32),
    /// The handler understood the message but refused it
    Rejected(String),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Unsupported(id) => write!(f, "Unsupported message (id: {})", id),
            DispatchError::Rejected(reason) => write!(f, "Message rejected: {}", reason),
        }
    }
}

impl std::error::Error for DispatchError {}
