//! Core abstractions for driving MicroPython boards over a raw REPL.
//!
//! This crate provides the fundamental building blocks:
//! - `Transport` / `Connect` - the raw REPL collaborator contract
//! - `ConnectionParams` - serial connection settings and config loading
//! - `Value` - host-side model of printed MicroPython literals
//! - `parse_literal` - strict literal parser for remote output
//! - `RemoteCommand` - builder for remote source fragments

pub mod command;
pub mod config;
pub mod literal;
pub mod traits;
pub mod value;

pub use command::RemoteCommand;
pub use config::{ConfigError, ConnectionParams};
pub use literal::{LiteralError, parse_literal};
pub use traits::{Connect, Transport, TransportError};
pub use value::Value;
