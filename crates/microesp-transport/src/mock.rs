//! Scriptable in-memory device.
//!
//! Useful for exercising sessions and facades without hardware. Responses
//! are scripted per command; every command the host sends is recorded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use microesp_core::{Connect, ConnectionParams, Transport, TransportError};

#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Contains(String),
}

impl Matcher {
    fn matches(&self, code: &str) -> bool {
        match self {
            Self::Exact(expected) => code == expected,
            Self::Contains(fragment) => code.contains(fragment.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    matcher: Matcher,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    rules: Vec<Rule>,
    history: Vec<String>,
    raw_mode: bool,
    connects: usize,
    closes: usize,
    refuse_connect: bool,
}

/// Handle to a scripted device shared by its connector and transports.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<State>>,
}

impl MockDevice {
    /// Create a device that answers every command with empty output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_rule(&self, matcher: Matcher, stdout: Vec<u8>, stderr: Vec<u8>) -> &Self {
        self.state().rules.push(Rule {
            matcher,
            stdout,
            stderr,
        });
        self
    }

    /// Answer exactly `code` with `stdout`.
    pub fn respond(&self, code: impl Into<String>, stdout: impl Into<Vec<u8>>) -> &Self {
        self.push_rule(Matcher::Exact(code.into()), stdout.into(), Vec::new())
    }

    /// Answer any command containing `fragment` with `stdout`.
    pub fn respond_containing(
        &self,
        fragment: impl Into<String>,
        stdout: impl Into<Vec<u8>>,
    ) -> &Self {
        self.push_rule(Matcher::Contains(fragment.into()), stdout.into(), Vec::new())
    }

    /// Fail any command containing `fragment` with `stderr`.
    pub fn fail_containing(
        &self,
        fragment: impl Into<String>,
        stderr: impl Into<Vec<u8>>,
    ) -> &Self {
        self.push_rule(Matcher::Contains(fragment.into()), Vec::new(), stderr.into())
    }

    /// Make subsequent connection attempts fail.
    pub fn refuse_connections(&self) -> &Self {
        self.state().refuse_connect = true;
        self
    }

    /// Commands received so far, in order.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state().history.clone()
    }

    /// Most recent command.
    #[must_use]
    pub fn last_command(&self) -> Option<String> {
        self.state().history.last().cloned()
    }

    /// Forget recorded commands.
    pub fn clear_history(&self) {
        self.state().history.clear();
    }

    /// Whether the device is currently in raw REPL mode.
    #[must_use]
    pub fn is_raw_mode(&self) -> bool {
        self.state().raw_mode
    }

    /// Number of transports opened.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state().connects
    }

    /// Number of transports closed.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state().closes
    }

    /// Connector producing transports bound to this device.
    #[must_use]
    pub fn connector(&self) -> MockConnector {
        MockConnector {
            device: self.clone(),
        }
    }
}

/// Connector for a [`MockDevice`].
#[derive(Debug, Clone)]
pub struct MockConnector {
    device: MockDevice,
}

impl Connect for MockConnector {
    type Transport = MockTransport;

    fn connect(&self, params: &ConnectionParams) -> Result<Self::Transport, TransportError> {
        let mut state = self.device.state();
        if state.refuse_connect {
            return Err(TransportError::Serial(format!(
                "{}: No such file or directory",
                params.port
            )));
        }
        state.connects += 1;
        Ok(MockTransport {
            device: self.device.clone(),
        })
    }
}

/// Transport bound to a [`MockDevice`].
#[derive(Debug)]
pub struct MockTransport {
    device: MockDevice,
}

impl MockTransport {
    fn record(&self, code: &[u8]) -> Result<(Vec<u8>, Vec<u8>), TransportError> {
        let mut state = self.device.state();
        if !state.raw_mode {
            return Err(TransportError::Protocol(
                "command sent outside raw REPL".to_string(),
            ));
        }

        let code = String::from_utf8_lossy(code).into_owned();
        let response = state
            .rules
            .iter()
            .rev()
            .find(|rule| rule.matcher.matches(&code))
            .map(|rule| (rule.stdout.clone(), rule.stderr.clone()))
            .unwrap_or_default();
        state.history.push(code);
        Ok(response)
    }
}

impl Transport for MockTransport {
    fn enter_raw_repl(&mut self) -> Result<(), TransportError> {
        self.device.state().raw_mode = true;
        Ok(())
    }

    fn exit_raw_repl(&mut self) -> Result<(), TransportError> {
        self.device.state().raw_mode = false;
        Ok(())
    }

    fn exec_raw(&mut self, code: &[u8]) -> Result<(Vec<u8>, Vec<u8>), TransportError> {
        self.record(code)
    }

    fn exec_no_follow(&mut self, code: &[u8]) -> Result<(), TransportError> {
        self.record(code).map(|_| ())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.device.state().closes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_responses() {
        let device = MockDevice::new();
        device
            .respond("print(1)", "1\r\n")
            .respond_containing("machine", "80000000\r\n")
            .fail_containing("bad", "SyntaxError\r\n");

        let mut transport = device.connector().connect(&ConnectionParams::default()).unwrap();
        transport.enter_raw_repl().unwrap();

        assert_eq!(transport.exec_raw(b"print(1)").unwrap().0, b"1\r\n");
        assert_eq!(
            transport.exec_raw(b"import machine;print(machine.freq())").unwrap().0,
            b"80000000\r\n"
        );
        assert_eq!(transport.exec_raw(b"bad code").unwrap().1, b"SyntaxError\r\n");
        assert_eq!(transport.exec_raw(b"other").unwrap(), (vec![], vec![]));
        assert_eq!(device.history().len(), 4);
    }

    #[test]
    fn test_later_rules_win() {
        let device = MockDevice::new();
        device.respond("x", "1").respond("x", "2");

        let mut transport = device.connector().connect(&ConnectionParams::default()).unwrap();
        transport.enter_raw_repl().unwrap();
        assert_eq!(transport.exec_raw(b"x").unwrap().0, b"2");
    }

    #[test]
    fn test_requires_raw_mode() {
        let device = MockDevice::new();
        let mut transport = device.connector().connect(&ConnectionParams::default()).unwrap();
        assert!(transport.exec_raw(b"print(1)").is_err());
    }

    #[test]
    fn test_refused_connection() {
        let device = MockDevice::new();
        device.refuse_connections();
        assert!(device.connector().connect(&ConnectionParams::default()).is_err());
        assert_eq!(device.connect_count(), 0);
    }
}
