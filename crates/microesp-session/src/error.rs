//! Session error types.

use std::fmt;

use microesp_core::{LiteralError, TransportError};
use thiserror::Error;

use crate::wlan::{ConfigParam, Role};

/// Payload of the remote error stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutput {
    /// Decoded as UTF-8 text.
    Text(String),
    /// Left as captured.
    Bytes(Vec<u8>),
}

impl RemoteOutput {
    /// Text view of the payload, decoding bytes lossily.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl fmt::Display for RemoteOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_text().trim_end())
    }
}

/// Session error.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device is not connected")]
    NotConnected,
    #[error("Remote execution error: {0}")]
    Execution(RemoteOutput),
    #[error("{operation}() is not available on the {role} interface")]
    RoleMismatch { operation: &'static str, role: Role },
    #[error("Config parameter {param} cannot be read on the {role} interface")]
    ParameterMismatch { param: ConfigParam, role: Role },
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("Invalid response: {0}")]
    Literal(#[from] LiteralError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session result.
pub type Result<T, E = DeviceError> = std::result::Result<T, E>;
