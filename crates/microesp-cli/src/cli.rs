//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use microesp_core::ConnectionParams;
use microesp_session::Role;

#[derive(Parser, Debug, Clone)]
#[command(name = "microesp")]
#[command(about = "Control MicroPython boards over the raw REPL")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Serial port of the board
    #[arg(short, long, env = "MICROESP_PORT")]
    pub port: Option<String>,

    /// Baud rate
    #[arg(short, long, env = "MICROESP_BAUD")]
    pub baud: Option<u32>,

    /// Seconds to wait for command output, 0 waits forever
    #[arg(short, long, env = "MICROESP_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Skip the soft reset when entering raw REPL mode
    #[arg(long)]
    pub no_soft_reset: bool,

    /// Configuration file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    /// Connection parameters from the config file, environment and flags,
    /// in increasing priority.
    pub fn connection_params(&self) -> ConnectionParams {
        let path = self.config.clone().or_else(|| {
            ConnectionParams::default_config_path().filter(|path| path.exists())
        });
        let mut params = path.map_or_else(
            || {
                let mut params = ConnectionParams::default();
                params.apply_env_overrides();
                params
            },
            ConnectionParams::load_or_default,
        );

        if let Some(port) = &self.port {
            params.port.clone_from(port);
        }
        if let Some(baud) = self.baud {
            params.baud = baud;
        }
        if let Some(timeout) = self.timeout {
            params.timeout = timeout;
        }
        if self.no_soft_reset {
            params.soft_reset = false;
        }
        params
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Execute code and print its output
    Exec {
        /// Source code
        code: String,
    },

    /// Execute code printing a literal and show the parsed value
    Eval {
        /// Source code
        code: String,
    },

    /// Execute a local source file
    Run {
        /// Local file
        file: PathBuf,
    },

    /// Show or set the CPU frequency
    Freq {
        /// New frequency in Hz
        hz: Option<u32>,
    },

    /// Reboot the board
    Reset,

    /// Show the chip's unique id
    UniqueId,

    /// List a directory on the board
    Ls {
        #[arg(default_value = "/")]
        dir: String,
    },

    /// Download a file from the board
    Get {
        /// Path on the board
        remote: String,
        /// Local destination, stdout if omitted
        local: Option<PathBuf>,
    },

    /// Upload a file to the board
    Put {
        /// Local file
        local: PathBuf,
        /// Path on the board, defaults to the local file name
        remote: Option<String>,
    },

    /// Create a directory on the board
    Mkdir { path: String },

    /// Remove an empty directory on the board
    Rmdir { path: String },

    /// Remove a file on the board
    Rm { path: String },

    /// WLAN interface operations
    Wlan {
        #[arg(value_enum)]
        role: RoleArg,
        #[command(subcommand)]
        action: WlanAction,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum RoleArg {
    Ap,
    Sta,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Ap => Self::AccessPoint,
            RoleArg::Sta => Self::Station,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum WlanAction {
    /// Show activity, status and connection state
    Status,
    /// Show interface addresses
    Ifconfig,
    /// Scan for networks (station only)
    Scan,
    /// Join a network (station only)
    Connect { ssid: String, password: String },
    /// Leave the current network (station only)
    Disconnect,
    /// Activate the interface
    Activate,
    /// Deactivate the interface
    Deactivate,
    /// Read a configuration parameter, or set it when a value is given
    Config {
        /// mac, essid, channel, hidden, authmode, password or dhcp_hostname
        param: String,
        /// New value, parsed as a literal when possible
        value: Option<String>,
    },
}
