//! Raw REPL transport for MicroPython boards.
//!
//! Provides:
//! - `RawRepl` - raw REPL protocol engine over any byte port
//! - `SerialConnector` - serial port connector (feature: serial)
//! - `MockDevice` - scriptable in-memory device (feature: mock)

pub mod raw_repl;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use raw_repl::{RawRepl, ReplPort};

#[cfg(feature = "serial")]
pub use serial::SerialConnector;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockConnector, MockDevice, MockTransport};
