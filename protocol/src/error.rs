use std::{io, sync::Arc};

use thiserror::Error;

#[derive(Error, Clone, Debug)]
pub enum TransportError {
    #[error("No such device: {0}")]
    NotFound(String),
    #[error("Device is locked by another process: {0}")]
    Busy(String),
    #[error("Cannot configure device: {0}")]
    ConfigFailed(Arc<anyhow::Error>),
    #[error("IO Error: {0:?}")]
    Io(Arc<io::Error>),
    #[error("Transport is closed")]
    Closed,
}

impl TransportError {
    pub fn config<T: Into<anyhow::Error>>(err: T) -> Self {
        TransportError::ConfigFailed(Arc::new(err.into()))
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(Arc::new(err))
    }
}

#[derive(Error, Clone, Debug)]
pub enum ProtocolError {
    #[error("Timeout")]
    Timeout,
    #[error("Unknown mode: {0:?}")]
    UnknownMode(String),
    #[error("Unexpected Response: {0}")]
    UnexpectedResponse(String),
    #[error("Other Error: {0}")]
    Other(Arc<anyhow::Error>),
}

impl From<anyhow::Error> for ProtocolError {
    fn from(x: anyhow::Error) -> Self {
        ProtocolError::Other(Arc::new(x))
    }
}

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Transport Error {0}")]
    Transport(TransportError),
    #[error("Protocol Error {0}")]
    Protocol(ProtocolError),
    #[error("Argument Error {0}")]
    Argument(Arc<anyhow::Error>),
    #[error("Internal Error {0}")]
    Internal(Arc<anyhow::Error>),
}

impl Error {
    pub fn transport<T: Into<TransportError>>(err: T) -> Self {
        Self::Transport(err.into())
    }

    pub fn protocol<T: Into<ProtocolError>>(err: T) -> Self {
        Self::Protocol(err.into())
    }

    pub fn protocol_timeout() -> Self {
        Error::Protocol(ProtocolError::Timeout)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Protocol(ProtocolError::Timeout))
    }

    /// Errors after which the transport handle must not be used anymore.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    pub fn internal<T: Into<anyhow::Error>>(err: T) -> Self {
        Self::Internal(Arc::new(err.into()))
    }

    pub fn argument<T: Into<anyhow::Error>>(err: T) -> Self {
        Self::Argument(Arc::new(err.into()))
    }
}

impl From<io::Error> for Error {
    fn from(x: io::Error) -> Self {
        Error::Transport(TransportError::Io(Arc::new(x)))
    }
}

impl From<TransportError> for Error {
    fn from(x: TransportError) -> Self {
        Error::Transport(x)
    }
}

impl From<ProtocolError> for Error {
    fn from(x: ProtocolError) -> Self {
        Error::Protocol(x)
    }
}
