//! Remote command building utilities.

use std::fmt;

use crate::Value;

/// A fragment of MicroPython source built up from imports and statements.
///
/// Fragments are joined with `;` so the result stays on one line, which is
/// how every command sent by the session and the facades is shaped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteCommand {
    imports: Vec<String>,
    statements: Vec<String>,
}

impl RemoteCommand {
    /// Create an empty command.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an `import` of a remote module. Duplicates are ignored.
    #[must_use]
    pub fn import<S: Into<String>>(mut self, module: S) -> Self {
        let module = module.into();
        if !self.imports.contains(&module) {
            self.imports.push(module);
        }
        self
    }

    /// Append a statement.
    #[must_use]
    pub fn stmt<S: Into<String>>(mut self, statement: S) -> Self {
        self.statements.push(statement.into());
        self
    }

    /// Append `print(<expr>)`.
    #[must_use]
    pub fn print<S: AsRef<str>>(self, expr: S) -> Self {
        let expr = expr.as_ref();
        self.stmt(format!("print({expr})"))
    }

    /// Append `print(repr(<expr>))`, the shape the literal parser expects.
    #[must_use]
    pub fn print_repr<S: AsRef<str>>(self, expr: S) -> Self {
        let expr = expr.as_ref();
        self.stmt(format!("print(repr({expr}))"))
    }

    /// Append a call with literal arguments, e.g. `f('a', 1)`.
    #[must_use]
    pub fn call<S: AsRef<str>>(self, func: S, args: &[Value]) -> Self {
        let func = func.as_ref();
        let args = args.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        self.stmt(format!("{func}({args})"))
    }

    /// Whether nothing has been added yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.statements.is_empty()
    }

    /// Render the command source.
    #[must_use]
    pub fn build(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .imports
            .iter()
            .map(|m| format!("import {m}"))
            .chain(self.statements.iter().cloned());
        for (i, part) in parts.enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            f.write_str(&part)?;
        }
        Ok(())
    }
}

impl From<RemoteCommand> for String {
    fn from(command: RemoteCommand) -> Self {
        command.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imports_come_first() {
        let cmd = RemoteCommand::new()
            .stmt("machine.reset()")
            .import("machine");
        assert_eq!(cmd.build(), "import machine;machine.reset()");
    }

    #[test]
    fn test_duplicate_imports() {
        let cmd = RemoteCommand::new().import("os").import("os").print("os.listdir()");
        assert_eq!(cmd.build(), "import os;print(os.listdir())");
    }

    #[test]
    fn test_call_quotes_arguments() {
        let cmd = RemoteCommand::new().call("wlan_sta.connect", &[Value::from("my \"net\""), Value::from("pa'ss")]);
        assert_eq!(cmd.build(), r#"wlan_sta.connect('my "net"', 'pa\'ss')"#);
    }

    #[test]
    fn test_print_repr() {
        let cmd = RemoteCommand::new().print_repr("wlan_ap.config('mac')");
        assert_eq!(cmd.build(), "print(repr(wlan_ap.config('mac')))");
    }

    #[test]
    fn test_empty() {
        assert!(RemoteCommand::new().is_empty());
        assert_eq!(RemoteCommand::new().build(), "");
    }
}
