//! Serial port connector.

use std::{io, time::Duration};

use microesp_core::{Connect, ConnectionParams, TransportError};
use serialport::{ClearBuffer, SerialPort};

use crate::raw_repl::{RawRepl, ReplPort};

/// Per-read timeout of the serial port. Output timeouts are enforced by the
/// protocol engine on top of this.
const READ_POLL: Duration = Duration::from_millis(100);

/// Raw REPL over a native serial port.
pub type SerialTransport = RawRepl<Box<dyn SerialPort>>;

impl ReplPort for Box<dyn SerialPort> {
    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Opens [`SerialTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

impl SerialConnector {
    /// Create a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Connect for SerialConnector {
    type Transport = SerialTransport;

    fn connect(&self, params: &ConnectionParams) -> Result<Self::Transport, TransportError> {
        tracing::debug!(port = %params.port, baud = params.baud, "opening serial port");

        let port = serialport::new(&params.port, params.baud)
            .timeout(READ_POLL)
            .open()
            .map_err(|e| TransportError::Serial(format!("{}: {e}", params.port)))?;

        Ok(RawRepl::new(port, params.timeout_duration()).with_soft_reset(params.soft_reset))
    }
}
