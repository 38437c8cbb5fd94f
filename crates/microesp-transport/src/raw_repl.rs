//! Raw REPL protocol engine.
//!
//! Drives a MicroPython interpreter through its raw REPL:
//! `Ctrl-A` enters raw mode, code is submitted followed by `Ctrl-D`, the
//! board answers `OK`, then streams stdout and stderr, each terminated by
//! `\x04`, and finally prompts with `>` for the next command.

use std::{
    io::{self, Read, Write},
    thread,
    time::{Duration, Instant},
};

use microesp_core::{Transport, TransportError};

const CTRL_A: u8 = 0x01;
const CTRL_B: u8 = 0x02;
const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;

const RAW_REPL_BANNER: &[u8] = b"raw REPL; CTRL-B to exit\r\n";
const SOFT_REBOOT: &[u8] = b"soft reboot\r\n";
const PROMPT: &[u8] = b">";
const EOF_MARKER: &[u8] = &[CTRL_D];

/// Code is written in chunks this size with a pause in between so the
/// board's UART buffer does not overflow.
const WRITE_CHUNK: usize = 256;
const CHUNK_DELAY: Duration = Duration::from_millis(10);

/// Default bound for the enter/OK handshakes, independent of the output timeout.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a read that returned nothing.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Read errors that only mean "nothing yet".
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Byte port the raw REPL runs over.
pub trait ReplPort: Read + Write {
    /// Discard any bytes received but not yet read.
    ///
    /// # Errors
    /// Returns error if the port cannot be cleared.
    fn clear_input(&mut self) -> io::Result<()>;
}

/// Raw REPL protocol engine over a [`ReplPort`].
pub struct RawRepl<P> {
    port: P,
    timeout: Option<Duration>,
    handshake_timeout: Duration,
    soft_reset: bool,
}

impl<P: ReplPort> RawRepl<P> {
    /// Wrap a port. `timeout` bounds how long to wait for command output
    /// without any byte arriving; `None` waits forever.
    #[must_use]
    pub const fn new(port: P, timeout: Option<Duration>) -> Self {
        Self {
            port,
            timeout,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            soft_reset: true,
        }
    }

    /// Override the bound for the enter/OK handshakes.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Enable or disable the soft reset performed when entering raw mode.
    #[must_use]
    pub const fn with_soft_reset(mut self, soft_reset: bool) -> Self {
        self.soft_reset = soft_reset;
        self
    }

    /// Consume the engine and return the port.
    pub fn into_inner(self) -> P {
        self.port
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        tracing::trace!(len = data.len(), "raw repl write");
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read byte by byte until `ending` is seen.
    ///
    /// The timeout is an inactivity timeout: every received byte restarts it.
    fn read_until(
        &mut self,
        ending: &[u8],
        timeout: Option<Duration>,
        what: &str,
    ) -> Result<Vec<u8>, TransportError> {
        let mut data = Vec::new();
        let mut last_activity = Instant::now();
        let mut byte = [0u8; 1];

        loop {
            match self.port.read(&mut byte) {
                Ok(1) => {
                    data.push(byte[0]);
                    if data.ends_with(ending) {
                        tracing::trace!(len = data.len(), what, "raw repl read");
                        return Ok(data);
                    }
                    last_activity = Instant::now();
                    continue;
                }
                Ok(_) => {}
                Err(e) if is_transient(&e) => {}
                Err(e) => return Err(e.into()),
            }

            if timeout.is_some_and(|t| last_activity.elapsed() >= t) {
                tracing::debug!(
                    received = %String::from_utf8_lossy(&data),
                    "timed out waiting for {what}"
                );
                return Err(TransportError::Timeout(what.to_string()));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn read_exact_bytes(&mut self, n: usize, what: &str) -> Result<Vec<u8>, TransportError> {
        let mut data = Vec::with_capacity(n);
        let start = Instant::now();
        let mut byte = [0u8; 1];
        while data.len() < n {
            match self.port.read(&mut byte) {
                Ok(1) => data.push(byte[0]),
                Ok(_) => thread::sleep(POLL_INTERVAL),
                Err(e) if is_transient(&e) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(e.into()),
            }
            if data.len() < n && start.elapsed() >= self.handshake_timeout {
                return Err(TransportError::Timeout(what.to_string()));
            }
        }
        Ok(data)
    }

    /// Collect stdout and stderr of a submitted command.
    fn follow(&mut self) -> Result<(Vec<u8>, Vec<u8>), TransportError> {
        let timeout = self.timeout;

        let mut stdout = self.read_until(EOF_MARKER, timeout, "first EOF")?;
        stdout.pop();

        let mut stderr = self.read_until(EOF_MARKER, timeout, "second EOF")?;
        stderr.pop();

        Ok((stdout, stderr))
    }
}

impl<P: ReplPort> Transport for RawRepl<P> {
    fn enter_raw_repl(&mut self) -> Result<(), TransportError> {
        let handshake = Some(self.handshake_timeout);

        // Interrupt whatever is running, twice in case it ignores the first.
        self.write(&[b'\r', CTRL_C, CTRL_C])?;
        self.port.clear_input()?;

        self.write(&[b'\r', CTRL_A])?;
        self.read_until(RAW_REPL_BANNER, handshake, "raw REPL banner")
            .map_err(|e| match e {
                TransportError::Timeout(_) => {
                    TransportError::Protocol("could not enter raw REPL".to_string())
                }
                other => other,
            })?;

        if self.soft_reset {
            self.read_until(PROMPT, handshake, "raw REPL prompt")?;
            self.write(&[CTRL_D])?;
            self.read_until(SOFT_REBOOT, handshake, "soft reboot")
                .map_err(|_| TransportError::Protocol("could not soft reboot".to_string()))?;
            self.read_until(RAW_REPL_BANNER, handshake, "raw REPL banner")
                .map_err(|_| TransportError::Protocol("could not enter raw REPL".to_string()))?;
        }

        tracing::debug!(soft_reset = self.soft_reset, "entered raw REPL");
        Ok(())
    }

    fn exit_raw_repl(&mut self) -> Result<(), TransportError> {
        self.write(&[b'\r', CTRL_B])?;
        tracing::debug!("exited raw REPL");
        Ok(())
    }

    fn exec_raw(&mut self, code: &[u8]) -> Result<(Vec<u8>, Vec<u8>), TransportError> {
        self.exec_no_follow(code)?;
        self.follow()
    }

    fn exec_no_follow(&mut self, code: &[u8]) -> Result<(), TransportError> {
        let handshake = Some(self.handshake_timeout);
        let prompt = self.read_until(PROMPT, handshake, "raw REPL prompt")?;
        if !prompt.ends_with(PROMPT) {
            return Err(TransportError::Protocol(
                "could not enter raw REPL".to_string(),
            ));
        }

        for (i, chunk) in code.chunks(WRITE_CHUNK).enumerate() {
            if i > 0 {
                thread::sleep(CHUNK_DELAY);
            }
            self.write(chunk)?;
        }
        self.write(&[CTRL_D])?;

        let ack = self.read_exact_bytes(2, "OK")?;
        if ack != b"OK" {
            return Err(TransportError::Protocol(format!(
                "could not exec command (response: {:?})",
                String::from_utf8_lossy(&ack)
            )));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.port.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// In-memory port: `input` is what the board will send.
    #[derive(Default)]
    struct ScriptedPort {
        input: VecDeque<u8>,
        written: Vec<u8>,
        clears: usize,
        /// Fail the read of this byte once with `Interrupted`.
        interrupt_at: Option<u8>,
    }

    impl ScriptedPort {
        fn with_input(input: &[u8]) -> Self {
            Self {
                input: input.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupt_at.is_some() && self.input.front() == self.interrupt_at.as_ref() {
                self.interrupt_at = None;
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            match self.input.pop_front() {
                Some(b) if !buf.is_empty() => {
                    buf[0] = b;
                    Ok(1)
                }
                Some(b) => {
                    self.input.push_front(b);
                    Ok(0)
                }
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
            }
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ReplPort for ScriptedPort {
        fn clear_input(&mut self) -> io::Result<()> {
            self.clears += 1;
            Ok(())
        }
    }

    fn repl(input: &[u8]) -> RawRepl<ScriptedPort> {
        RawRepl::new(ScriptedPort::with_input(input), Some(Duration::from_millis(20)))
            .with_handshake_timeout(Duration::from_millis(20))
    }

    #[test]
    fn test_enter_without_soft_reset() {
        let mut repl = repl(b"MicroPython\r\nraw REPL; CTRL-B to exit\r\n").with_soft_reset(false);
        repl.enter_raw_repl().unwrap();

        let port = repl.into_inner();
        assert_eq!(port.written, b"\r\x03\x03\r\x01");
        assert_eq!(port.clears, 1);
    }

    #[test]
    fn test_enter_with_soft_reset() {
        let mut repl = repl(
            b"raw REPL; CTRL-B to exit\r\n>OK\r\nMPY: soft reboot\r\nraw REPL; CTRL-B to exit\r\n",
        );
        repl.enter_raw_repl().unwrap();
        assert_eq!(repl.into_inner().written, b"\r\x03\x03\r\x01\x04");
    }

    #[test]
    fn test_enter_fails_without_banner() {
        // The handshake timeout applies even when the output timeout is unbounded.
        let mut repl = RawRepl::new(ScriptedPort::with_input(b">>> "), None)
            .with_soft_reset(false)
            .with_handshake_timeout(Duration::from_millis(20));
        let err = repl.enter_raw_repl().unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[test]
    fn test_exec_splits_streams() {
        let mut repl = repl(b">OKHello world\r\n\x04\x04>");
        let (stdout, stderr) = repl.exec_raw(b"print('Hello world')").unwrap();
        assert_eq!(stdout, b"Hello world\r\n");
        assert!(stderr.is_empty());

        let port = repl.into_inner();
        assert_eq!(port.written, b"print('Hello world')\x04");
        // Prompt for the next command is left unread.
        assert_eq!(port.input, b">".to_vec());
    }

    #[test]
    fn test_exec_captures_stderr() {
        let err_text = b"Traceback (most recent call last):\r\nSyntaxError: invalid syntax\r\n";
        let mut input = b">OK\x04".to_vec();
        input.extend_from_slice(err_text);
        input.extend_from_slice(b"\x04>");

        let mut repl = repl(&input);
        let (stdout, stderr) = repl.exec_raw(b"Erroneous code").unwrap();
        assert!(stdout.is_empty());
        assert_eq!(stderr, err_text);
    }

    #[test]
    fn test_exec_rejects_missing_ok() {
        let mut repl = repl(b">NO");
        let err = repl.exec_no_follow(b"x").unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[test]
    fn test_interrupted_reads_are_retried() {
        let mut port = ScriptedPort::with_input(b">OK\x04\x04");
        port.interrupt_at = Some(b'O');
        let mut repl = RawRepl::new(port, None).with_handshake_timeout(Duration::from_millis(20));

        repl.exec_raw(b"pass").unwrap();
        assert_eq!(repl.into_inner().interrupt_at, None);
    }

    #[test]
    fn test_exec_times_out_without_eof() {
        let mut repl = repl(b">OKpartial");
        let err = repl.exec_raw(b"while True: pass").unwrap_err();
        assert!(matches!(err, TransportError::Timeout(ref what) if what == "first EOF"));
    }

    #[test]
    fn test_long_code_is_chunked() {
        let code = vec![b'#'; WRITE_CHUNK * 2 + 10];
        let mut repl = repl(b">OK\x04\x04");
        repl.exec_raw(&code).unwrap();

        let written = repl.into_inner().written;
        assert_eq!(written.len(), code.len() + 1);
        assert_eq!(written.last(), Some(&CTRL_D));
    }

    #[test]
    fn test_exec_file_reports_remote_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"raise ValueError").unwrap();

        let mut repl = repl(b">OK\x04ValueError:\r\n\x04");
        let err = repl.exec_file(file.path()).unwrap_err();
        assert!(matches!(err, TransportError::Remote { ref stderr } if stderr == b"ValueError:\r\n"));
    }

    #[test]
    fn test_exit_raw_repl() {
        let mut repl = repl(b"");
        repl.exit_raw_repl().unwrap();
        assert_eq!(repl.into_inner().written, b"\r\x02");
    }
}
