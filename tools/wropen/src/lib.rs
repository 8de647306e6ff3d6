//! Test double for process spawning in legacy code.
//!
//! Code under test spawns through [`intercept::popen`] / [`intercept::run`] or takes a
//! [`runtime::ProcessRunner`]. Tests either wrap it in [`intercept::intercept_popen`]
//! after [`state::configure`], or hand it a [`responder::ResponderRunner`] directly.
//! Either way each spawn is answered from a JSON response table instead of a real
//! process.

pub mod config;
pub mod encoding;
pub mod errors;
pub mod intercept;
pub mod logging;
pub mod responder;
pub mod runtime;
pub mod state;
pub mod table;

use clap::{error::ErrorKind, CommandFactory, Parser, ValueEnum};
use config::{load_state, StateOverrides};
use errors::WropenError;
use responder::Responder;
use runtime::{ProcessRequest, Runtime};
use state::WropenMode;
use table::ResponseTable;

pub use intercept::{intercept_popen, intercepted};
pub use state::{configure, WropenState};

#[derive(Debug, Clone, Parser)]
#[command(name = "wropen")]
#[command(about = "Answer a command line from a wropen response table")]
pub struct Cli {
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
    #[arg(long, value_enum)]
    pub mode: Option<CliMode>,
    #[arg(long)]
    pub encoding: Option<String>,
    #[arg(long, default_value_t = false)]
    pub list: bool,
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliMode {
    Pass,
    Fail,
}

impl From<CliMode> for WropenMode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Pass => WropenMode::Pass,
            CliMode::Fail => WropenMode::Fail,
        }
    }
}

pub fn run() -> Result<i32, WropenError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| WropenError::Io(e.to_string()))?;
    let runtime = Runtime::new();
    run_with_runtime(&args, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &std::path::Path,
    runtime: &Runtime,
) -> Result<i32, WropenError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(WropenError::Cli(error.to_string())),
        },
    };

    let overrides = StateOverrides {
        mode: cli.mode.map(Into::into),
        debug: None,
        encoding: cli.encoding.clone(),
    };
    let state = load_state(
        cli.config.as_deref(),
        &overrides,
        cwd,
        runtime.file_system.as_ref(),
    )?;

    if cli.list {
        let path = state.resolve_path().ok_or_else(|| {
            WropenError::Io(format!(
                "no response table configured for mode {}",
                state.mode.as_str()
            ))
        })?;
        let table = ResponseTable::load(path, runtime.file_system.as_ref())?;
        for (key, entry) in table.entries() {
            runtime
                .terminal
                .write_line(&format!("{key}\t{}", entry.message))?;
        }
        return Ok(0);
    }

    if cli.command.is_empty() {
        return Err(WropenError::Cli(
            "a command to look up is required (or --list)".to_string(),
        ));
    }

    let request = ProcessRequest::argv(cli.command.clone());
    let responder = Responder::new(Some(&state), &request, runtime.file_system.as_ref())?;
    let (stdout, stderr) = responder.communicate();
    if !stdout.is_empty() {
        runtime.terminal.write_line(&stdout.to_string_lossy())?;
    }
    if !stderr.is_empty() {
        runtime.terminal.write_error_line(&stderr.to_string_lossy())?;
    }
    Ok(responder.returncode())
}

pub fn render_help() -> String {
    let mut cmd = Cli::command();
    cmd.render_long_help().to_string()
}
