//! Device session, WLAN and file facades for MicroPython boards.
//!
//! Provides:
//! - `Session` - exclusive raw REPL session with a board
//! - `Wlan` - access point / station interface facade
//! - `Files` - board filesystem facade

pub mod device;
pub mod error;
pub mod files;
pub mod wlan;

pub use device::{Output, OutputMode, Session};
pub use error::{DeviceError, RemoteOutput, Result};
pub use files::Files;
pub use wlan::{AuthMode, ConfigParam, IfConfig, IfStatus, Role, ScanResult, Wlan};

#[cfg(feature = "serial")]
pub use device::SerialSession;
