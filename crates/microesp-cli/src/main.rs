//! `microesp` command line tool.

mod cli;

use std::{
    fs,
    io::{self, Write},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use microesp_core::{Value, parse_literal};
use microesp_session::{ConfigParam, SerialSession};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command, WlanAction};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .init();

    let params = cli.connection_params();
    let port = params.port.clone();
    let mut session = SerialSession::new(params);
    session
        .open()
        .with_context(|| format!("Failed to open {port}"))?;

    run(&mut session, cli.command)?;

    if session.is_open() {
        session.close()?;
    }
    Ok(())
}

fn run(session: &mut SerialSession, command: Command) -> Result<()> {
    let mut stdout = io::stdout().lock();

    match command {
        Command::Exec { code } => write!(stdout, "{}", session.exec(&code)?)?,
        Command::Eval { code } => writeln!(stdout, "{}", session.eval(&code)?)?,
        Command::Run { file } => {
            let output = session
                .exec_file(&file)
                .with_context(|| format!("Failed to run {}", file.display()))?;
            write!(stdout, "{output}")?;
        }
        Command::Freq { hz } => writeln!(stdout, "{}", session.freq(hz)?)?,
        Command::Reset => session.reset()?,
        Command::UniqueId => writeln!(stdout, "{}", session.unique_id()?)?,
        Command::Ls { dir } => {
            for entry in session.files()?.ls(&dir)? {
                writeln!(stdout, "{entry}")?;
            }
        }
        Command::Get { remote, local } => {
            let data = session.files()?.get(&remote)?;
            match local {
                Some(path) => fs::write(&path, data)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => stdout.write_all(&data)?,
            }
        }
        Command::Put { local, remote } => {
            let data =
                fs::read(&local).with_context(|| format!("Failed to read {}", local.display()))?;
            let remote = match remote {
                Some(remote) => remote,
                None => local
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .context("Local path has no file name")?,
            };
            session.files()?.put(&remote, &data)?;
        }
        Command::Mkdir { path } => session.files()?.mkdir(&path)?,
        Command::Rmdir { path } => session.files()?.rmdir(&path)?,
        Command::Rm { path } => session.files()?.rm(&path)?,
        Command::Wlan { role, action } => {
            let mut wlan = session.wlan(role.into())?;
            match action {
                WlanAction::Status => {
                    let report = json!({
                        "role": wlan.role(),
                        "active": wlan.is_active()?,
                        "status": wlan.status()?,
                        "connected": wlan.is_connected()?,
                    });
                    writeln!(stdout, "{}", serde_json::to_string_pretty(&report)?)?;
                }
                WlanAction::Ifconfig => {
                    writeln!(stdout, "{}", serde_json::to_string_pretty(&wlan.ifconfig()?)?)?;
                }
                WlanAction::Scan => {
                    writeln!(stdout, "{}", serde_json::to_string_pretty(&wlan.scan()?)?)?;
                }
                WlanAction::Connect { ssid, password } => wlan.connect(&ssid, &password)?,
                WlanAction::Disconnect => wlan.disconnect()?,
                WlanAction::Activate => wlan.activate()?,
                WlanAction::Deactivate => wlan.deactivate()?,
                WlanAction::Config { param, value } => {
                    let Some(param) = ConfigParam::from_key(&param) else {
                        bail!("Unknown config parameter: {param}");
                    };
                    match value {
                        Some(value) => {
                            let value = parse_literal(&value).unwrap_or(Value::Str(value));
                            write!(stdout, "{}", wlan.set_config(param, value)?)?;
                        }
                        None => writeln!(stdout, "{}", wlan.get_config(param)?)?,
                    }
                }
            }
        }
    }

    stdout.flush()?;
    Ok(())
}
