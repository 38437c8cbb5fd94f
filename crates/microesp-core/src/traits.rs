//! Core traits for the raw REPL transport.

use std::path::Path;

use thiserror::Error;

use crate::ConnectionParams;

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serial port error: {0}")]
    Serial(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Timed out waiting for {0}")]
    Timeout(String),
    /// The remote interpreter wrote to its error stream.
    #[error("Remote error: {}", String::from_utf8_lossy(.stderr))]
    Remote { stderr: Vec<u8> },
}

/// A connection to a MicroPython interpreter that understands raw REPL mode.
///
/// Implementations own the underlying byte channel exclusively. None of the
/// methods are re-entrant.
pub trait Transport {
    /// Switch the interpreter into raw execution mode.
    ///
    /// # Errors
    /// Returns error if the device does not answer with the raw REPL banner.
    fn enter_raw_repl(&mut self) -> Result<(), TransportError>;

    /// Leave raw execution mode and return to the friendly REPL.
    ///
    /// # Errors
    /// Returns error if the write fails.
    fn exit_raw_repl(&mut self) -> Result<(), TransportError>;

    /// Execute source text and capture `(stdout, stderr)`.
    ///
    /// # Errors
    /// Returns error on I/O failure or protocol violation. A non-empty
    /// stderr is not an error at this level.
    fn exec_raw(&mut self, code: &[u8]) -> Result<(Vec<u8>, Vec<u8>), TransportError>;

    /// Submit source text without waiting for its output.
    ///
    /// # Errors
    /// Returns error if the device does not acknowledge the code.
    fn exec_no_follow(&mut self, code: &[u8]) -> Result<(), TransportError>;

    /// Execute a host file on the device and return its stdout.
    ///
    /// # Errors
    /// Returns [`TransportError::Remote`] when the remote side reports an
    /// error, or [`TransportError::Io`] if the file cannot be read.
    fn exec_file(&mut self, path: &Path) -> Result<Vec<u8>, TransportError> {
        let source = std::fs::read(path)?;
        let (stdout, stderr) = self.exec_raw(&source)?;
        if stderr.is_empty() {
            Ok(stdout)
        } else {
            Err(TransportError::Remote { stderr })
        }
    }

    /// Release the underlying channel.
    ///
    /// # Errors
    /// Returns error if the channel cannot be flushed.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Factory for transports.
pub trait Connect {
    /// Transport produced by this connector.
    type Transport: Transport;

    /// Open a new transport for the given parameters.
    ///
    /// # Errors
    /// Returns error if the channel cannot be opened.
    fn connect(&self, params: &ConnectionParams) -> Result<Self::Transport, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn enter_raw_repl(&mut self) -> Result<(), TransportError> {
        (**self).enter_raw_repl()
    }

    fn exit_raw_repl(&mut self) -> Result<(), TransportError> {
        (**self).exit_raw_repl()
    }

    fn exec_raw(&mut self, code: &[u8]) -> Result<(Vec<u8>, Vec<u8>), TransportError> {
        (**self).exec_raw(code)
    }

    fn exec_no_follow(&mut self, code: &[u8]) -> Result<(), TransportError> {
        (**self).exec_no_follow(code)
    }

    fn exec_file(&mut self, path: &Path) -> Result<Vec<u8>, TransportError> {
        (**self).exec_file(path)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}
