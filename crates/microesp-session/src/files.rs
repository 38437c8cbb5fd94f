//! Board filesystem facade.
//!
//! File contents travel as base64 lines so binary data survives the text
//! REPL in both directions.

use base64::{Engine, engine::general_purpose::STANDARD};
use microesp_core::{Connect, RemoteCommand, Value};

use crate::{
    device::Session,
    error::{DeviceError, Result},
};

/// Raw bytes per transferred chunk.
const CHUNK_SIZE: usize = 256;

/// Remote variable holding the open file during [`Files::put`].
const FILE_VAR: &str = "_mf";

/// Facade over the board filesystem.
pub struct Files<'s, C: Connect> {
    session: &'s mut Session<C>,
}

impl<'s, C: Connect> Files<'s, C> {
    pub(crate) const fn new(session: &'s mut Session<C>) -> Self {
        Self { session }
    }

    /// Names of the entries in `dir`.
    ///
    /// # Errors
    /// Returns [`DeviceError::Execution`] if the directory does not exist.
    pub fn ls(&mut self, dir: &str) -> Result<Vec<String>> {
        let code = RemoteCommand::new()
            .import("os")
            .print_repr(format!("os.listdir({})", Value::from(dir)))
            .build();
        let value = self.session.eval(&code)?;

        value
            .as_items()
            .and_then(|items| {
                items
                    .iter()
                    .map(|item| item.as_str().map(str::to_owned))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| DeviceError::UnexpectedResponse(format!("listdir returned {value}")))
    }

    /// Read a whole file.
    ///
    /// # Errors
    /// Returns [`DeviceError::Execution`] if the file cannot be opened, or
    /// [`DeviceError::UnexpectedResponse`] if the transfer is corrupted.
    pub fn get(&mut self, path: &str) -> Result<Vec<u8>> {
        let code = format!(
            "import ubinascii\n\
             with open({path},'rb') as f:\n \
             while True:\n  \
             c=f.read({CHUNK_SIZE})\n  \
             if not c:break\n  \
             print(ubinascii.b2a_base64(c).decode(),end='')\n",
            path = Value::from(path),
        );
        let output = self.session.exec(&code)?;

        let mut data = Vec::new();
        for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let chunk = STANDARD
                .decode(line)
                .map_err(|e| DeviceError::UnexpectedResponse(format!("file chunk: {e}")))?;
            data.extend_from_slice(&chunk);
        }

        tracing::debug!(path, bytes = data.len(), "file read");
        Ok(data)
    }

    /// Create or overwrite a file.
    ///
    /// # Errors
    /// Returns [`DeviceError::Execution`] if the file cannot be written.
    pub fn put(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let open = RemoteCommand::new()
            .import("ubinascii")
            .stmt(format!("{FILE_VAR}=open({},'wb')", Value::from(path)))
            .build();
        self.session.exec(&open)?;

        if let Err(e) = self.write_chunks(data) {
            let close = format!("{FILE_VAR}.close()");
            if let Err(close_err) = self.session.exec(&close) {
                tracing::warn!(path, "Failed to close remote file: {close_err}");
            }
            return Err(e);
        }

        self.session.exec(&format!("{FILE_VAR}.close()"))?;
        tracing::debug!(path, bytes = data.len(), "file written");
        Ok(())
    }

    fn write_chunks(&mut self, data: &[u8]) -> Result<()> {
        for chunk in data.chunks(CHUNK_SIZE) {
            let encoded = Value::from(STANDARD.encode(chunk));
            let code = format!("{FILE_VAR}.write(ubinascii.a2b_base64({encoded}))");
            self.session.exec(&code)?;
        }
        Ok(())
    }

    /// Create a directory.
    ///
    /// # Errors
    /// Returns [`DeviceError::Execution`] if the directory cannot be created.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        self.os_call("mkdir", path)
    }

    /// Remove an empty directory.
    ///
    /// # Errors
    /// Returns [`DeviceError::Execution`] if the directory cannot be removed.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        self.os_call("rmdir", path)
    }

    /// Remove a file.
    ///
    /// # Errors
    /// Returns [`DeviceError::Execution`] if the file cannot be removed.
    pub fn rm(&mut self, path: &str) -> Result<()> {
        self.os_call("remove", path)
    }

    fn os_call(&mut self, func: &str, path: &str) -> Result<()> {
        let code = RemoteCommand::new()
            .import("os")
            .call(format!("os.{func}"), &[Value::from(path)])
            .build();
        self.session.exec(&code)?;
        Ok(())
    }
}
