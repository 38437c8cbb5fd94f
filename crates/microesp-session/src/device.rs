//! Raw REPL session with a board.

use std::path::Path;

use microesp_core::{
    Connect, ConnectionParams, RemoteCommand, Transport, TransportError, Value, parse_literal,
};

use crate::{
    error::{DeviceError, RemoteOutput, Result},
    files::Files,
    wlan::{Role, Wlan},
};

/// How to return a command's stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Raw bytes. Remote errors also carry raw bytes.
    Raw,
    /// UTF-8 text.
    #[default]
    Text,
    /// Parsed as a literal value.
    Eval,
}

/// Result of [`Session::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Bytes(Vec<u8>),
    Text(String),
    Value(Value),
}

impl Output {
    /// Text view of the output.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Self::Text(text) => text,
            Self::Value(value) => value.to_string(),
        }
    }
}

/// Session over a serial port.
#[cfg(feature = "serial")]
pub type SerialSession = Session<microesp_transport::SerialConnector>;

/// Exclusive session with one board.
///
/// The session owns at most one transport. It is created by [`open`](Self::open)
/// and released by [`close`](Self::close) or [`reset`](Self::reset); every
/// other operation fails with [`DeviceError::NotConnected`] while no
/// transport exists.
pub struct Session<C: Connect> {
    params: ConnectionParams,
    connector: C,
    transport: Option<C::Transport>,
}

#[cfg(feature = "serial")]
impl Session<microesp_transport::SerialConnector> {
    /// Create an unopened session on a serial port.
    #[must_use]
    pub const fn new(params: ConnectionParams) -> Self {
        Self::with_connector(params, microesp_transport::SerialConnector::new())
    }
}

impl<C: Connect> Session<C> {
    /// Create an unopened session using a custom connector.
    #[must_use]
    pub const fn with_connector(params: ConnectionParams, connector: C) -> Self {
        Self {
            params,
            connector,
            transport: None,
        }
    }

    /// Connection parameters.
    #[must_use]
    pub const fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Whether a transport is currently held.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Connect and enter raw REPL mode.
    ///
    /// An already open transport is closed first.
    ///
    /// # Errors
    /// Returns error if the port cannot be opened or the board does not
    /// enter raw mode.
    pub fn open(&mut self) -> Result<&mut Self> {
        if let Some(mut previous) = self.transport.take() {
            if let Err(e) = shutdown(&mut previous) {
                tracing::warn!("Failed to close previous transport: {e}");
            }
        }

        let mut transport = self.connector.connect(&self.params)?;
        if let Err(e) = transport.enter_raw_repl() {
            if let Err(close_err) = transport.close() {
                tracing::debug!("Failed to release transport: {close_err}");
            }
            return Err(e.into());
        }

        tracing::info!(port = %self.params.port, baud = self.params.baud, "session opened");
        self.transport = Some(transport);
        Ok(self)
    }

    /// Leave raw REPL mode and release the transport.
    ///
    /// # Errors
    /// Returns [`DeviceError::NotConnected`] if the session is not open, or
    /// the transport error if shutting down fails. The transport is released
    /// either way.
    pub fn close(&mut self) -> Result<()> {
        let mut transport = self.transport.take().ok_or(DeviceError::NotConnected)?;
        shutdown(&mut transport)?;
        tracing::info!(port = %self.params.port, "session closed");
        Ok(())
    }

    fn transport(&mut self) -> Result<&mut C::Transport> {
        self.transport.as_mut().ok_or(DeviceError::NotConnected)
    }

    /// Execute code on the board.
    ///
    /// # Errors
    /// Returns [`DeviceError::NotConnected`] if not open,
    /// [`DeviceError::Execution`] if the board wrote to stderr, or
    /// [`DeviceError::Literal`] if `Eval` output is not a literal.
    pub fn execute(&mut self, code: &str, mode: OutputMode) -> Result<Output> {
        let transport = self.transport()?;

        tracing::debug!(len = code.len(), ?mode, "executing");
        tracing::trace!(code, "executing");
        let (stdout, stderr) = transport.exec_raw(code.as_bytes())?;

        if !stderr.is_empty() {
            let payload = match mode {
                OutputMode::Raw => RemoteOutput::Bytes(stderr),
                OutputMode::Text | OutputMode::Eval => {
                    RemoteOutput::Text(String::from_utf8_lossy(&stderr).into_owned())
                }
            };
            tracing::debug!(error = %payload, "remote execution failed");
            return Err(DeviceError::Execution(payload));
        }

        Ok(match mode {
            OutputMode::Raw => Output::Bytes(stdout),
            OutputMode::Text => Output::Text(String::from_utf8_lossy(&stdout).into_owned()),
            OutputMode::Eval => Output::Value(parse_literal(&String::from_utf8_lossy(&stdout))?),
        })
    }

    /// Execute code and return stdout as text.
    ///
    /// # Errors
    /// See [`execute`](Self::execute).
    pub fn exec(&mut self, code: &str) -> Result<String> {
        self.execute(code, OutputMode::Text).map(Output::into_text)
    }

    /// Execute code and return stdout as raw bytes.
    ///
    /// # Errors
    /// See [`execute`](Self::execute).
    pub fn exec_raw(&mut self, code: &str) -> Result<Vec<u8>> {
        match self.execute(code, OutputMode::Raw)? {
            Output::Bytes(bytes) => Ok(bytes),
            other => Ok(other.into_text().into_bytes()),
        }
    }

    /// Execute code that prints a literal and parse it.
    ///
    /// # Errors
    /// See [`execute`](Self::execute).
    pub fn eval(&mut self, code: &str) -> Result<Value> {
        match self.execute(code, OutputMode::Eval)? {
            Output::Value(value) => Ok(value),
            other => Ok(parse_literal(&other.into_text())?),
        }
    }

    /// Execute a host source file on the board.
    ///
    /// `decode` selects text or raw bytes for both stdout and the error
    /// payload.
    ///
    /// # Errors
    /// Returns [`DeviceError::NotConnected`] if not open,
    /// [`DeviceError::Io`] if the file cannot be read, or
    /// [`DeviceError::Execution`] if the board reported an error.
    pub fn execute_file(&mut self, path: &Path, decode: bool) -> Result<Output> {
        let transport = self.transport()?;

        tracing::debug!(path = %path.display(), "executing file");
        match transport.exec_file(path) {
            Ok(stdout) if decode => Ok(Output::Text(String::from_utf8_lossy(&stdout).into_owned())),
            Ok(stdout) => Ok(Output::Bytes(stdout)),
            Err(TransportError::Remote { stderr }) => {
                let payload = if decode {
                    RemoteOutput::Text(String::from_utf8_lossy(&stderr).into_owned())
                } else {
                    RemoteOutput::Bytes(stderr)
                };
                Err(DeviceError::Execution(payload))
            }
            Err(TransportError::Io(e)) => Err(DeviceError::Io(e)),
            Err(e) => Err(e.into()),
        }
    }

    /// Execute a host source file and return stdout as text.
    ///
    /// # Errors
    /// See [`execute_file`](Self::execute_file).
    pub fn exec_file(&mut self, path: &Path) -> Result<String> {
        self.execute_file(path, true).map(Output::into_text)
    }

    /// Reboot the board.
    ///
    /// The reboot invalidates the raw REPL, so the transport is released and
    /// the session returns to the unopened state. Call [`open`](Self::open)
    /// to reconnect.
    ///
    /// # Errors
    /// Returns [`DeviceError::NotConnected`] if not open, or the transport
    /// error if the command could not be submitted. The session is unopened
    /// afterwards either way, since the board may already be rebooting.
    pub fn reset(&mut self) -> Result<()> {
        let mut transport = self.transport.take().ok_or(DeviceError::NotConnected)?;

        let code = RemoteCommand::new().import("machine").stmt("machine.reset()").build();
        let submitted = transport.exec_no_follow(code.as_bytes());
        if let Err(e) = transport.close() {
            tracing::debug!("Failed to release transport after reset: {e}");
        }

        match submitted {
            Ok(()) => {
                tracing::info!(port = %self.params.port, "board reset, session closed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(port = %self.params.port, "reset not acknowledged: {e}");
                Err(e.into())
            }
        }
    }

    /// Get the CPU frequency in Hz, optionally setting it first.
    ///
    /// # Errors
    /// Returns error if a command fails or the board reports a non-integer.
    pub fn freq(&mut self, value: Option<u32>) -> Result<u32> {
        if let Some(hz) = value {
            let code = RemoteCommand::new()
                .import("machine")
                .call("machine.freq", &[Value::from(hz)])
                .build();
            self.exec(&code)?;
        }

        let code = RemoteCommand::new().import("machine").print("machine.freq()").build();
        let value = self.eval(&code)?;
        value
            .as_int()
            .and_then(|hz| u32::try_from(hz).ok())
            .ok_or_else(|| DeviceError::UnexpectedResponse(format!("frequency {value}")))
    }

    /// Unique identifier of the board's chip as lowercase hex.
    ///
    /// # Errors
    /// Returns error if the command fails or the board returns no bytes.
    pub fn unique_id(&mut self) -> Result<String> {
        let code = RemoteCommand::new()
            .import("machine")
            .print_repr("machine.unique_id()")
            .build();
        match self.eval(&code)? {
            Value::Bytes(bytes) => Ok(hex::encode(bytes)),
            other => Err(DeviceError::UnexpectedResponse(format!(
                "unique id of type {}",
                other.type_name()
            ))),
        }
    }

    /// Bind a WLAN interface facade.
    ///
    /// Every call rebinds the interface object on the board.
    ///
    /// # Errors
    /// Returns error if the binding command fails.
    pub fn wlan(&mut self, role: Role) -> Result<Wlan<'_, C>> {
        Wlan::bind(self, role)
    }

    /// Access point interface facade.
    ///
    /// # Errors
    /// See [`wlan`](Self::wlan).
    pub fn wlan_ap(&mut self) -> Result<Wlan<'_, C>> {
        self.wlan(Role::AccessPoint)
    }

    /// Station interface facade.
    ///
    /// # Errors
    /// See [`wlan`](Self::wlan).
    pub fn wlan_sta(&mut self) -> Result<Wlan<'_, C>> {
        self.wlan(Role::Station)
    }

    /// Board filesystem facade.
    ///
    /// # Errors
    /// Returns [`DeviceError::NotConnected`] if not open.
    pub fn files(&mut self) -> Result<Files<'_, C>> {
        if !self.is_open() {
            return Err(DeviceError::NotConnected);
        }
        Ok(Files::new(self))
    }
}

impl<C: Connect> Drop for Session<C> {
    fn drop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = shutdown(&mut transport) {
                tracing::debug!("Failed to close session on drop: {e}");
            }
        }
    }
}

/// Exit raw mode and close, attempting both even if the first fails.
fn shutdown<T: Transport>(transport: &mut T) -> Result<(), TransportError> {
    let exited = transport.exit_raw_repl();
    let closed = transport.close();
    exited.and(closed)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use microesp_transport::{MockConnector, MockDevice};

    use super::*;

    fn session(device: &MockDevice) -> Session<MockConnector> {
        Session::with_connector(ConnectionParams::default(), device.connector())
    }

    fn opened(device: &MockDevice) -> Session<MockConnector> {
        let mut session = session(device);
        session.open().unwrap();
        session
    }

    #[test]
    fn test_operations_require_open() {
        let device = MockDevice::new();
        let mut session = session(&device);

        assert!(matches!(session.exec("print()"), Err(DeviceError::NotConnected)));
        assert!(matches!(session.eval("print(1)"), Err(DeviceError::NotConnected)));
        assert!(matches!(session.exec_raw("print()"), Err(DeviceError::NotConnected)));
        assert!(matches!(
            session.exec_file(Path::new("missing.py")),
            Err(DeviceError::NotConnected)
        ));
        assert!(matches!(session.reset(), Err(DeviceError::NotConnected)));
        assert!(matches!(session.freq(None), Err(DeviceError::NotConnected)));
        assert!(matches!(session.unique_id(), Err(DeviceError::NotConnected)));
        assert!(matches!(session.wlan_ap(), Err(DeviceError::NotConnected)));
        assert!(matches!(session.files(), Err(DeviceError::NotConnected)));
        assert!(matches!(session.close(), Err(DeviceError::NotConnected)));
        assert!(device.history().is_empty());
    }

    #[test]
    fn test_open_close_lifecycle() {
        let device = MockDevice::new();
        let mut session = session(&device);
        assert!(!session.is_open());

        session.open().unwrap();
        assert!(session.is_open());
        assert!(device.is_raw_mode());

        session.close().unwrap();
        assert!(!session.is_open());
        assert!(!device.is_raw_mode());
        assert_eq!(device.close_count(), 1);
    }

    #[test]
    fn test_reopen_replaces_transport() {
        let device = MockDevice::new();
        let mut session = opened(&device);
        session.open().unwrap().exec("print()").unwrap();

        assert_eq!(device.connect_count(), 2);
        assert_eq!(device.close_count(), 1);
        assert!(session.is_open());
    }

    #[test]
    fn test_open_failure_leaves_session_closed() {
        let device = MockDevice::new();
        device.refuse_connections();
        let mut session = session(&device);

        assert!(matches!(session.open(), Err(DeviceError::Transport(_))));
        assert!(!session.is_open());
    }

    #[test]
    fn test_drop_closes() {
        let device = MockDevice::new();
        drop(opened(&device));
        assert_eq!(device.close_count(), 1);
        assert!(!device.is_raw_mode());
    }

    #[test]
    fn test_exec_text_and_raw() {
        let device = MockDevice::new();
        device.respond("print('Hello world')", "Hello world\r\n");
        let mut session = opened(&device);

        assert_eq!(session.exec("print('Hello world')").unwrap(), "Hello world\r\n");
        assert_eq!(session.exec_raw("print('Hello world')").unwrap(), b"Hello world\r\n");
    }

    #[test]
    fn test_eval_round_trips_literals() {
        let device = MockDevice::new();
        let mut session = opened(&device);

        let values = [
            Value::None,
            Value::Bool(true),
            Value::Bool(false),
            Value::Int(1),
            Value::Float(1.0),
            Value::Int(-1),
            Value::Float(-1.0),
            Value::from("a"),
            Value::List(vec![]),
            Value::Tuple(vec![]),
            Value::Set(vec![]),
            Value::Dict(vec![]),
        ];
        for value in values {
            let code = format!("print(repr({value}), end='')");
            device.respond(code.clone(), value.to_string());
            assert_eq!(session.eval(&code).unwrap(), value);
        }
    }

    #[test]
    fn test_eval_rejects_non_literal_output() {
        let device = MockDevice::new();
        device.respond("print(x)", "<function>\r\n");
        let mut session = opened(&device);

        assert!(matches!(session.eval("print(x)"), Err(DeviceError::Literal(_))));
    }

    #[test]
    fn test_remote_error() {
        let device = MockDevice::new();
        device.fail_containing(
            "Erroneous",
            "Traceback (most recent call last):\r\nSyntaxError: invalid syntax\r\n",
        );
        let mut session = opened(&device);

        let err = session.exec("Erroneous code").unwrap_err();
        let DeviceError::Execution(RemoteOutput::Text(message)) = err else {
            panic!("expected execution error, got {err:?}");
        };
        assert!(message.contains("SyntaxError"));

        let err = session.execute("Erroneous code", OutputMode::Raw).unwrap_err();
        assert!(matches!(err, DeviceError::Execution(RemoteOutput::Bytes(_))));

        // A failed command leaves the session usable.
        assert!(session.is_open());
        session.exec("print()").unwrap();
    }

    #[test]
    fn test_exec_file() {
        let device = MockDevice::new();
        device
            .respond("print('Hello world')\n", "Hello world\r\n")
            .fail_containing("raise", "ValueError\r\n");
        let mut session = opened(&device);

        let mut good = tempfile::NamedTempFile::new().unwrap();
        writeln!(good, "print('Hello world')").unwrap();
        assert_eq!(session.exec_file(good.path()).unwrap(), "Hello world\r\n");

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "raise ValueError").unwrap();
        assert!(matches!(
            session.exec_file(bad.path()),
            Err(DeviceError::Execution(RemoteOutput::Text(_)))
        ));
        assert!(matches!(
            session.execute_file(bad.path(), false),
            Err(DeviceError::Execution(RemoteOutput::Bytes(_)))
        ));

        assert!(matches!(
            session.exec_file(Path::new("/nonexistent/code.py")),
            Err(DeviceError::Io(_))
        ));
    }

    #[test]
    fn test_freq_set_then_get() {
        let device = MockDevice::new();
        device.respond("import machine;print(machine.freq())", "160000000\r\n");
        let mut session = opened(&device);

        assert_eq!(session.freq(Some(160_000_000)).unwrap(), 160_000_000);
        assert_eq!(session.freq(None).unwrap(), 160_000_000);
        assert_eq!(
            device.history(),
            [
                "import machine;machine.freq(160000000)",
                "import machine;print(machine.freq())",
                "import machine;print(machine.freq())",
            ]
        );
    }

    #[test]
    fn test_reset_returns_to_unopened() {
        let device = MockDevice::new();
        let mut session = opened(&device);

        session.reset().unwrap();
        assert_eq!(device.last_command().as_deref(), Some("import machine;machine.reset()"));
        assert!(!session.is_open());
        assert!(matches!(session.exec("print()"), Err(DeviceError::NotConnected)));

        session.open().unwrap();
        assert!(session.is_open());
    }

    /// Board that reboots as soon as code is submitted, before acknowledging it.
    struct RebootingConnector;

    struct RebootingTransport;

    impl Transport for RebootingTransport {
        fn enter_raw_repl(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn exit_raw_repl(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn exec_raw(&mut self, _code: &[u8]) -> Result<(Vec<u8>, Vec<u8>), TransportError> {
            Ok((Vec::new(), Vec::new()))
        }

        fn exec_no_follow(&mut self, _code: &[u8]) -> Result<(), TransportError> {
            Err(TransportError::Protocol(
                "could not exec command (response: \"\\x00\")".to_string(),
            ))
        }

        fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    impl Connect for RebootingConnector {
        type Transport = RebootingTransport;

        fn connect(&self, _params: &ConnectionParams) -> Result<Self::Transport, TransportError> {
            Ok(RebootingTransport)
        }
    }

    #[test]
    fn test_reset_closes_even_without_ack() {
        let mut session = Session::with_connector(ConnectionParams::default(), RebootingConnector);
        session.open().unwrap();

        assert!(matches!(
            session.reset(),
            Err(DeviceError::Transport(TransportError::Protocol(_)))
        ));
        assert!(!session.is_open());
        assert!(matches!(session.exec("print()"), Err(DeviceError::NotConnected)));
    }

    #[test]
    fn test_unique_id() {
        let device = MockDevice::new();
        device.respond_containing("machine.unique_id()", "b'\\x9a\\xd2\\x0c\\x00'\r\n");
        let mut session = opened(&device);

        assert_eq!(session.unique_id().unwrap(), "9ad20c00");
    }
}
