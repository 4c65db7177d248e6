//! Error types for the fleet node

use fleet_infra::AuthorityError;
use thiserror::Error;

use crate::slice::SliceError;
use crate::transport::{HandshakeError, ListenerError};

/// Main error type for fleet node operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The trust store could not be created, loaded or used
    #[error("authority error: {0}")]
    Authority(#[from] AuthorityError),

    /// Disk slicing misconfiguration
    #[error("slice planning error: {0}")]
    Slice(#[from] SliceError),

    /// An outbound connection failed
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// The listener failed
    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error must stop the machine from joining the fleet
    ///
    /// Trust-store and configuration failures are fatal. Connection failures
    /// only affect the connection they happened on.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Authority(_) | Error::Slice(_) | Error::Config(_) | Error::Listener(_) => true,
            Error::Handshake(_) => false,
        }
    }
}
