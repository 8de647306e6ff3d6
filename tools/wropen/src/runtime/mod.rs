use crate::errors::WropenError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A command as handed to the spawning entry point.
///
/// A real runner splits a `Line` with POSIX shell quoting rules (no expansion,
/// no pipes); response tables compare it verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    Line(String),
    Argv(Vec<String>),
}

impl CommandLine {
    pub fn argv<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Argv(tokens.into_iter().map(Into::into).collect())
    }

    /// The string a response table `message` is compared against.
    pub fn normalized(&self) -> String {
        match self {
            Self::Line(line) => line.clone(),
            Self::Argv(tokens) => tokens.join(" "),
        }
    }
}

impl From<&str> for CommandLine {
    fn from(value: &str) -> Self {
        Self::Line(value.to_string())
    }
}

impl From<String> for CommandLine {
    fn from(value: String) -> Self {
        Self::Line(value)
    }
}

impl From<Vec<String>> for CommandLine {
    fn from(value: Vec<String>) -> Self {
        Self::Argv(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub command: CommandLine,
    pub cwd: Option<PathBuf>,
}

impl ProcessRequest {
    pub fn new(command: impl Into<CommandLine>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
        }
    }

    pub fn argv<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(CommandLine::argv(tokens))
    }

    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// One captured stream: text when no encoding applies, bytes otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamData {
    Text(String),
    Bytes(Vec<u8>),
}

impl StreamData {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Bytes(bytes) => bytes.is_empty(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    pub fn to_string_lossy(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Bytes(bytes) => String::from_utf8_lossy(bytes).to_string(),
        }
    }
}

impl Default for StreamData {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub returncode: i32,
    pub stdout: StreamData,
    pub stderr: StreamData,
}

/// The spawning capability code under test is handed instead of calling
/// `std::process::Command` directly.
pub trait ProcessRunner: Send + Sync {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, WropenError>;
    fn wait(&self, handle: u64) -> Result<ProcessOutput, WropenError>;
    fn kill(&self, handle: u64) -> Result<(), WropenError>;

    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, WropenError> {
        let handle = self.spawn(request)?;
        self.wait(handle)
    }
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, WropenError>;
}

pub trait Terminal: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), WropenError>;
    fn write_error_line(&self, line: &str) -> Result<(), WropenError>;
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, WropenError> {
        std::fs::read_to_string(path)
            .map_err(|e| WropenError::Io(format!("{}: {e}", path.display())))
    }
}

#[derive(Default)]
struct ProcessState {
    next_handle: u64,
    children: HashMap<u64, std::process::Child>,
}

pub struct ProductionProcessRunner {
    state: Mutex<ProcessState>,
}

impl ProductionProcessRunner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProcessState::default()),
        }
    }
}

impl Default for ProductionProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn build_command(command: &CommandLine) -> Result<std::process::Command, WropenError> {
    match command {
        CommandLine::Argv(tokens) => {
            let (program, args) = tokens
                .split_first()
                .ok_or_else(|| WropenError::Process("empty argument list".to_string()))?;
            let mut cmd = std::process::Command::new(program);
            cmd.args(args);
            Ok(cmd)
        }
        CommandLine::Line(line) => {
            let tokens = shell_words::split(line)
                .map_err(|e| WropenError::Process(format!("parse command {line:?}: {e}")))?;
            build_command(&CommandLine::Argv(tokens))
        }
    }
}

impl ProcessRunner for ProductionProcessRunner {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, WropenError> {
        let mut cmd = build_command(&request.command)?;
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| WropenError::Process(e.to_string()))?;
        let mut state = self.state.lock().expect("process lock poisoned");
        let handle = state.next_handle;
        state.next_handle += 1;
        state.children.insert(handle, child);
        Ok(handle)
    }

    fn wait(&self, handle: u64) -> Result<ProcessOutput, WropenError> {
        let child = {
            let mut state = self.state.lock().expect("process lock poisoned");
            state.children.remove(&handle)
        };
        let child =
            child.ok_or_else(|| WropenError::Process(format!("unknown handle {handle}")))?;
        let output = child
            .wait_with_output()
            .map_err(|e| WropenError::Process(e.to_string()))?;
        Ok(ProcessOutput {
            returncode: output.status.code().unwrap_or(-1),
            stdout: StreamData::Bytes(output.stdout),
            stderr: StreamData::Bytes(output.stderr),
        })
    }

    /// Kills the child and waits for it, so no zombie is left behind.
    fn kill(&self, handle: u64) -> Result<(), WropenError> {
        let mut child = {
            let mut state = self.state.lock().expect("process lock poisoned");
            state.children.remove(&handle)
        }
        .ok_or_else(|| WropenError::Process(format!("unknown handle {handle}")))?;

        if let Err(error) = child.kill() {
            let exited = child
                .try_wait()
                .map_err(|e| WropenError::Process(e.to_string()))?;
            if exited.is_none() {
                let mut state = self.state.lock().expect("process lock poisoned");
                state.children.insert(handle, child);
                return Err(WropenError::Process(error.to_string()));
            }
            return Ok(());
        }
        child
            .wait()
            .map(|_| ())
            .map_err(|e| WropenError::Process(e.to_string()))
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn write_line(&self, line: &str) -> Result<(), WropenError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| WropenError::Io(e.to_string()))
    }

    fn write_error_line(&self, line: &str) -> Result<(), WropenError> {
        use std::io::Write;
        let mut err = std::io::stderr();
        writeln!(err, "{line}").map_err(|e| WropenError::Io(e.to_string()))
    }
}

pub struct Runtime {
    pub file_system: Arc<dyn FileSystem>,
    pub terminal: Arc<dyn Terminal>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            file_system: Arc::new(ProductionFileSystem),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
    reads: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.insert(path, contents);
        fs
    }

    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
    }

    pub fn reads(&self) -> Vec<PathBuf> {
        self.reads.lock().expect("reads lock").clone()
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, WropenError> {
        self.reads
            .lock()
            .expect("reads lock")
            .push(path.to_path_buf());
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| WropenError::Io(format!("missing file {}", path.display())))
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    writes: Arc<Mutex<Vec<String>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.errors.lock().expect("errors lock").clone()
    }
}

impl Terminal for FakeTerminal {
    fn write_line(&self, line: &str) -> Result<(), WropenError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }

    fn write_error_line(&self, line: &str) -> Result<(), WropenError> {
        self.errors
            .lock()
            .expect("errors lock")
            .push(line.to_string());
        Ok(())
    }
}

/// Stand-in for a real process runner: answers from a FIFO of queued outputs.
#[derive(Default, Clone)]
pub struct FakeProcessRunner {
    responses: Arc<Mutex<Vec<Result<ProcessOutput, WropenError>>>>,
    spawned: Arc<Mutex<Vec<ProcessRequest>>>,
    kills: Arc<Mutex<Vec<u64>>>,
    next_handle: Arc<Mutex<u64>>,
}

impl FakeProcessRunner {
    pub fn push_response(&self, output: Result<ProcessOutput, WropenError>) {
        self.responses.lock().expect("responses lock").push(output);
    }

    pub fn spawned(&self) -> Vec<ProcessRequest> {
        self.spawned.lock().expect("spawned lock").clone()
    }

    pub fn kills(&self) -> Vec<u64> {
        self.kills.lock().expect("kills lock").clone()
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, WropenError> {
        self.spawned.lock().expect("spawned lock").push(request);
        let mut next = self.next_handle.lock().expect("next lock");
        let handle = *next;
        *next += 1;
        Ok(handle)
    }

    fn wait(&self, _handle: u64) -> Result<ProcessOutput, WropenError> {
        let mut responses = self.responses.lock().expect("responses lock");
        if responses.is_empty() {
            return Err(WropenError::Process("no fake response queued".to_string()));
        }
        responses.remove(0)
    }

    fn kill(&self, handle: u64) -> Result<(), WropenError> {
        self.kills.lock().expect("kills lock").push(handle);
        Ok(())
    }
}
