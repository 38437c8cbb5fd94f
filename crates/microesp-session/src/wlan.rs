//! WLAN interface facade.

use std::fmt;

use microesp_core::{Connect, RemoteCommand, Value};
use serde::Serialize;

use crate::{
    device::Session,
    error::{DeviceError, Result},
};

/// WiFi interface role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    /// The board hosts a network.
    #[serde(rename = "ap")]
    AccessPoint,
    /// The board joins a network.
    #[serde(rename = "sta")]
    Station,
}

impl Role {
    /// Name of the interface variable bound on the board.
    #[must_use]
    pub const fn var_name(self) -> &'static str {
        match self {
            Self::AccessPoint => "wlan_ap",
            Self::Station => "wlan_sta",
        }
    }

    /// Interface constant of the `network` module.
    #[must_use]
    pub const fn interface(self) -> &'static str {
        match self {
            Self::AccessPoint => "AP_IF",
            Self::Station => "STA_IF",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessPoint => write!(f, "AP"),
            Self::Station => write!(f, "STA"),
        }
    }
}

/// Interface configuration parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigParam {
    Mac,
    Essid,
    Channel,
    Hidden,
    AuthMode,
    Password,
    DhcpHostname,
}

impl ConfigParam {
    pub const ALL: [Self; 7] = [
        Self::Mac,
        Self::Essid,
        Self::Channel,
        Self::Hidden,
        Self::AuthMode,
        Self::Password,
        Self::DhcpHostname,
    ];

    /// Keyword understood by `WLAN.config()`.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Mac => "mac",
            Self::Essid => "essid",
            Self::Channel => "channel",
            Self::Hidden => "hidden",
            Self::AuthMode => "authmode",
            Self::Password => "password",
            Self::DhcpHostname => "dhcp_hostname",
        }
    }

    /// Parse a keyword.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|param| param.key() == key)
    }

    /// Check whether the parameter can be read on `role`.
    const fn readable_on(self, role: Role) -> bool {
        match self {
            Self::Password => false,
            Self::DhcpHostname => matches!(role, Role::Station),
            Self::Channel | Self::Hidden | Self::AuthMode => matches!(role, Role::AccessPoint),
            Self::Mac | Self::Essid => true,
        }
    }
}

impl fmt::Display for ConfigParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Interface status reported by `WLAN.status()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IfStatus {
    /// No connection attempt made yet.
    Unknown,
    Idle,
    Connecting,
    WrongPassword,
    NoApFound,
    ConnectFail,
    GotIp,
}

impl IfStatus {
    /// Status code used by the firmware.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Unknown => -1,
            Self::Idle => 0,
            Self::Connecting => 1,
            Self::WrongPassword => 2,
            Self::NoApFound => 3,
            Self::ConnectFail => 4,
            Self::GotIp => 5,
        }
    }
}

impl TryFrom<i64> for IfStatus {
    type Error = DeviceError;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            -1 => Ok(Self::Unknown),
            0 => Ok(Self::Idle),
            1 => Ok(Self::Connecting),
            2 => Ok(Self::WrongPassword),
            3 => Ok(Self::NoApFound),
            4 => Ok(Self::ConnectFail),
            5 => Ok(Self::GotIp),
            other => Err(DeviceError::UnexpectedResponse(format!(
                "interface status {other}"
            ))),
        }
    }
}

impl fmt::Display for IfStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::WrongPassword => "wrong password",
            Self::NoApFound => "no AP found",
            Self::ConnectFail => "connect failed",
            Self::GotIp => "got IP",
        };
        f.write_str(name)
    }
}

/// Network authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
}

impl AuthMode {
    /// Mode for a firmware code, if known.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Open),
            1 => Some(Self::Wep),
            2 => Some(Self::WpaPsk),
            3 => Some(Self::Wpa2Psk),
            4 => Some(Self::WpaWpa2Psk),
            _ => None,
        }
    }
}

/// Addresses reported by `WLAN.ifconfig()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IfConfig {
    pub ip: String,
    pub netmask: String,
    pub gateway: String,
    pub dns: String,
}

/// One network found by [`Wlan::scan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub ssid: String,
    /// Lowercase hex.
    pub bssid: String,
    pub channel: i64,
    pub rssi: i64,
    /// Raw firmware code, see [`auth`](Self::auth).
    pub auth_mode: i64,
    pub hidden: bool,
}

impl ScanResult {
    /// Typed authentication mode, if the code is known.
    #[must_use]
    pub const fn auth(&self) -> Option<AuthMode> {
        AuthMode::from_code(self.auth_mode)
    }

    fn from_value(value: Value) -> Result<Self> {
        let fields = value
            .into_items()
            .filter(|fields| fields.len() == 6)
            .ok_or_else(|| DeviceError::UnexpectedResponse("scan row".to_string()))?;

        let bytes = |v: &Value, what: &str| {
            v.as_bytes()
                .map(<[u8]>::to_vec)
                .ok_or_else(|| DeviceError::UnexpectedResponse(format!("scan {what} {v}")))
        };
        let int = |v: &Value, what: &str| {
            v.as_int()
                .ok_or_else(|| DeviceError::UnexpectedResponse(format!("scan {what} {v}")))
        };

        Ok(Self {
            ssid: String::from_utf8_lossy(&bytes(&fields[0], "ssid")?).into_owned(),
            bssid: hex::encode(bytes(&fields[1], "bssid")?),
            channel: int(&fields[2], "channel")?,
            rssi: int(&fields[3], "rssi")?,
            auth_mode: int(&fields[4], "authmode")?,
            hidden: fields[5].is_truthy(),
        })
    }
}

/// Facade over one WLAN interface of a session.
///
/// Each operation is one blocking round trip through the session.
pub struct Wlan<'s, C: Connect> {
    session: &'s mut Session<C>,
    role: Role,
}

impl<'s, C: Connect> Wlan<'s, C> {
    /// Bind the interface variable on the board.
    pub(crate) fn bind(session: &'s mut Session<C>, role: Role) -> Result<Self> {
        let code = RemoteCommand::new()
            .import("network")
            .stmt(format!(
                "{}=network.WLAN(network.{})",
                role.var_name(),
                role.interface()
            ))
            .build();
        session.exec(&code)?;
        tracing::debug!(%role, "WLAN interface bound");
        Ok(Self { session, role })
    }

    /// Role of the interface.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    fn attr(&self, expr: &str) -> String {
        format!("{}.{expr}", self.role.var_name())
    }

    fn require_station(&self, operation: &'static str) -> Result<()> {
        match self.role {
            Role::Station => Ok(()),
            role @ Role::AccessPoint => Err(DeviceError::RoleMismatch { operation, role }),
        }
    }

    fn eval_bool(&mut self, expr: &str) -> Result<bool> {
        let code = RemoteCommand::new().print(self.attr(expr)).build();
        let value = self.session.eval(&code)?;
        value
            .as_bool()
            .ok_or_else(|| DeviceError::UnexpectedResponse(format!("{expr} returned {value}")))
    }

    /// Whether the interface is active.
    ///
    /// # Errors
    /// Returns error if the command fails.
    pub fn is_active(&mut self) -> Result<bool> {
        self.eval_bool("active()")
    }

    /// Activate the interface.
    ///
    /// # Errors
    /// Returns error if the command fails.
    pub fn activate(&mut self) -> Result<()> {
        let code = RemoteCommand::new().stmt(self.attr("active(True)")).build();
        self.session.exec(&code)?;
        Ok(())
    }

    /// Deactivate the interface.
    ///
    /// # Errors
    /// Returns error if the command fails.
    pub fn deactivate(&mut self) -> Result<()> {
        let code = RemoteCommand::new().stmt(self.attr("active(False)")).build();
        self.session.exec(&code)?;
        Ok(())
    }

    /// Interface status.
    ///
    /// # Errors
    /// Returns error if the command fails or the code is unknown.
    pub fn status(&mut self) -> Result<IfStatus> {
        let code = RemoteCommand::new().print(self.attr("status()")).build();
        let value = self.session.eval(&code)?;
        let status = value
            .as_int()
            .ok_or_else(|| DeviceError::UnexpectedResponse(format!("interface status {value}")))?;
        IfStatus::try_from(status)
    }

    /// Whether the interface is connected to a network.
    ///
    /// # Errors
    /// Returns error if the command fails.
    pub fn is_connected(&mut self) -> Result<bool> {
        self.eval_bool("isconnected()")
    }

    /// Join a network. Station only.
    ///
    /// Returns once the request is submitted; poll [`status`](Self::status)
    /// to follow the connection.
    ///
    /// # Errors
    /// Returns [`DeviceError::RoleMismatch`] on the access point interface.
    pub fn connect(&mut self, ssid: &str, password: &str) -> Result<()> {
        self.require_station("connect")?;
        let code = RemoteCommand::new()
            .call(
                self.attr("connect"),
                &[Value::from(ssid), Value::from(password)],
            )
            .build();
        self.session.exec(&code)?;
        tracing::info!(ssid, "WLAN connect requested");
        Ok(())
    }

    /// Leave the current network. Station only.
    ///
    /// # Errors
    /// Returns [`DeviceError::RoleMismatch`] on the access point interface.
    pub fn disconnect(&mut self) -> Result<()> {
        self.require_station("disconnect")?;
        let code = RemoteCommand::new().stmt(self.attr("disconnect()")).build();
        self.session.exec(&code)?;
        Ok(())
    }

    /// Read one configuration parameter.
    ///
    /// # Errors
    /// Returns [`DeviceError::ParameterMismatch`] without contacting the
    /// board if the parameter cannot be read on this interface.
    pub fn get_config(&mut self, param: ConfigParam) -> Result<Value> {
        if !param.readable_on(self.role) {
            return Err(DeviceError::ParameterMismatch {
                param,
                role: self.role,
            });
        }

        let expr = format!("config({})", Value::from(param.key()));
        let code = RemoteCommand::new().print_repr(self.attr(&expr)).build();
        self.session.eval(&code)
    }

    /// Set one configuration parameter. Access point only.
    ///
    /// Returns what the board printed.
    ///
    /// # Errors
    /// Returns [`DeviceError::RoleMismatch`] on the station interface.
    pub fn set_config(&mut self, param: ConfigParam, value: impl Into<Value>) -> Result<String> {
        if self.role != Role::AccessPoint {
            return Err(DeviceError::RoleMismatch {
                operation: "set_config",
                role: self.role,
            });
        }

        let expr = format!("config({}={})", param.key(), value.into());
        let code = RemoteCommand::new().print(self.attr(&expr)).build();
        self.session.exec(&code)
    }

    /// Interface addresses.
    ///
    /// # Errors
    /// Returns error if the command fails or the board returns something
    /// other than four strings.
    pub fn ifconfig(&mut self) -> Result<IfConfig> {
        let code = RemoteCommand::new().print(self.attr("ifconfig()")).build();
        let value = self.session.eval(&code)?;

        let shape_error = || DeviceError::UnexpectedResponse(format!("ifconfig returned {value}"));
        let fields: Vec<String> = value
            .as_items()
            .ok_or_else(shape_error)?
            .iter()
            .map(|field| field.as_str().map(str::to_owned))
            .collect::<Option<_>>()
            .ok_or_else(shape_error)?;

        let [ip, netmask, gateway, dns] =
            <[String; 4]>::try_from(fields).map_err(|_| shape_error())?;
        Ok(IfConfig {
            ip,
            netmask,
            gateway,
            dns,
        })
    }

    /// Scan for networks in range. Station only.
    ///
    /// # Errors
    /// Returns [`DeviceError::RoleMismatch`] on the access point interface.
    pub fn scan(&mut self) -> Result<Vec<ScanResult>> {
        self.require_station("scan")?;
        let code = RemoteCommand::new().print(self.attr("scan()")).build();
        let value = self.session.eval(&code)?;

        let rows = value
            .into_items()
            .ok_or_else(|| DeviceError::UnexpectedResponse("scan result".to_string()))?;
        rows.into_iter().map(ScanResult::from_value).collect()
    }
}
