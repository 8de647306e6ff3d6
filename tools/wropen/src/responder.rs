//! Process surrogate answering from the active response table.

use crate::encoding::encode_text;
use crate::errors::WropenError;
use crate::logging::log_event;
use crate::runtime::{
    CommandLine, FileSystem, ProcessOutput, ProcessRequest, ProcessRunner, ProductionFileSystem,
    StreamData,
};
use crate::state::{configured_state, WropenState};
use crate::table::ResponseTable;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Stands in for one spawned process. The reply is resolved when the responder is
/// built; `communicate` only hands it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Responder {
    args: CommandLine,
    stdout: StreamData,
    stderr: StreamData,
    returncode: i32,
    entry_key: Option<String>,
}

impl Responder {
    pub fn new(
        state: Option<&WropenState>,
        request: &ProcessRequest,
        fs: &dyn FileSystem,
    ) -> Result<Self, WropenError> {
        let state = state.ok_or(WropenError::NotConfigured)?;
        let path = state.resolve_path().ok_or_else(|| {
            WropenError::Io(format!(
                "no response table configured for mode {}",
                state.mode.as_str()
            ))
        })?;
        let table = ResponseTable::load(path, fs)?;

        let command = request.command.normalized();
        let reply = table.resolve(&command);
        match &reply.entry_key {
            Some(key) => log_event(
                state.log_path.as_deref(),
                "info",
                "reply_matched",
                json!({"command": command, "entry": key, "returncode": reply.returncode}),
            ),
            None => log_event(
                state.log_path.as_deref(),
                "info",
                "reply_fallback",
                json!({"command": command}),
            ),
        }

        let (stdout, stderr) = match state.encoding.as_deref() {
            Some(label) => (
                StreamData::Bytes(encode_text(&reply.stdout, label)?),
                StreamData::Bytes(encode_text(&reply.stderr, label)?),
            ),
            None => (StreamData::Text(reply.stdout), StreamData::Text(reply.stderr)),
        };

        Ok(Self {
            args: request.command.clone(),
            stdout,
            stderr,
            returncode: reply.returncode,
            entry_key: reply.entry_key,
        })
    }

    /// `(stdout, stderr)`. Never blocks; calling it again returns the same pair.
    pub fn communicate(&self) -> (StreamData, StreamData) {
        (self.stdout.clone(), self.stderr.clone())
    }

    pub fn returncode(&self) -> i32 {
        self.returncode
    }

    pub fn args(&self) -> &CommandLine {
        &self.args
    }

    pub fn matched(&self) -> bool {
        self.entry_key.is_some()
    }

    pub fn output(&self) -> ProcessOutput {
        let (stdout, stderr) = self.communicate();
        ProcessOutput {
            returncode: self.returncode,
            stdout,
            stderr,
        }
    }
}

enum StateSource {
    Global,
    Fixed(WropenState),
}

/// `ProcessRunner` that builds a `Responder` for every spawn.
pub struct ResponderRunner {
    source: StateSource,
    fs: Arc<dyn FileSystem>,
    responders: Mutex<HashMap<u64, Responder>>,
    next_handle: Mutex<u64>,
}

impl ResponderRunner {
    /// Reads the process-wide configuration on every spawn.
    pub fn global() -> Self {
        Self::from_source(StateSource::Global, Arc::new(ProductionFileSystem))
    }

    /// Uses `state` regardless of the process-wide configuration.
    pub fn with_state(state: WropenState) -> Self {
        Self::from_source(StateSource::Fixed(state), Arc::new(ProductionFileSystem))
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    fn from_source(source: StateSource, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            source,
            fs,
            responders: Mutex::new(HashMap::new()),
            next_handle: Mutex::new(0),
        }
    }

    fn build(&self, request: &ProcessRequest) -> Result<Responder, WropenError> {
        match &self.source {
            StateSource::Global => {
                let state = configured_state();
                Responder::new(state.as_ref(), request, self.fs.as_ref())
            }
            StateSource::Fixed(state) => Responder::new(Some(state), request, self.fs.as_ref()),
        }
    }
}

impl ProcessRunner for ResponderRunner {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, WropenError> {
        let responder = self.build(&request)?;
        let mut next = self.next_handle.lock().expect("next handle lock");
        let handle = *next;
        *next += 1;
        self.responders
            .lock()
            .expect("responders lock")
            .insert(handle, responder);
        Ok(handle)
    }

    fn wait(&self, handle: u64) -> Result<ProcessOutput, WropenError> {
        self.responders
            .lock()
            .expect("responders lock")
            .remove(&handle)
            .map(|responder| responder.output())
            .ok_or_else(|| WropenError::Process(format!("unknown handle {handle}")))
    }

    fn kill(&self, handle: u64) -> Result<(), WropenError> {
        self.responders
            .lock()
            .expect("responders lock")
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| WropenError::Process(format!("unknown handle {handle}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FakeFileSystem;
    use crate::state::WropenMode;
    use std::path::Path;

    const TABLE: &str = r#"{
        "1": {"message": "ls -lh", "reply": ["a", "b"], "error": [], "returncode": 2},
        "2": {"message": "cat missing", "error": ["cat: missing: No such file"], "returncode": 1}
    }"#;

    fn fs() -> FakeFileSystem {
        let fs = FakeFileSystem::with_file("/pass.json", TABLE);
        fs.insert(
            "/fail.json",
            r#"{"1": {"message": "ls -lh", "error": ["boom"], "returncode": 9}}"#,
        );
        fs
    }

    fn state() -> WropenState {
        WropenState::new(WropenMode::Pass, "/pass.json").with_fail_path("/fail.json")
    }

    #[test]
    fn unconfigured_responder_is_rejected() {
        let err = Responder::new(None, &ProcessRequest::new("ls"), &fs()).expect_err("no state");
        assert!(matches!(err, WropenError::NotConfigured));
    }

    #[test]
    fn argv_request_matches_joined_message() {
        let responder =
            Responder::new(Some(&state()), &ProcessRequest::argv(["ls", "-lh"]), &fs())
                .expect("responder");
        let (stdout, stderr) = responder.communicate();
        assert_eq!(stdout, StreamData::Text("a\nb".to_string()));
        assert_eq!(stderr, StreamData::Text(String::new()));
        assert_eq!(responder.returncode(), 2);
        assert!(responder.matched());
        assert_eq!(responder.communicate(), (stdout, stderr));
    }

    #[test]
    fn unmatched_request_echoes_command() {
        let responder = Responder::new(Some(&state()), &ProcessRequest::new("echo hi"), &fs())
            .expect("responder");
        assert_eq!(
            responder.communicate(),
            (
                StreamData::Text("echo hi".to_string()),
                StreamData::Text(String::new())
            )
        );
        assert_eq!(responder.returncode(), 0);
        assert!(!responder.matched());
    }

    #[test]
    fn fail_mode_reads_fail_table() {
        let mut state = state();
        state.mode = WropenMode::Fail;
        let fs = fs();
        let responder =
            Responder::new(Some(&state), &ProcessRequest::new("ls -lh"), &fs).expect("responder");
        assert_eq!(responder.returncode(), 9);
        assert_eq!(fs.reads(), vec![Path::new("/fail.json").to_path_buf()]);
    }

    #[test]
    fn fail_mode_without_fail_table_is_io_error() {
        let state = WropenState::new(WropenMode::Fail, "/pass.json");
        let err = Responder::new(Some(&state), &ProcessRequest::new("ls"), &fs())
            .expect_err("no fail path");
        assert!(matches!(err, WropenError::Io(_)));
    }

    #[test]
    fn encoding_applies_to_matched_and_fallback_alike() {
        let state = state().with_encoding("utf-8");
        let matched = Responder::new(Some(&state), &ProcessRequest::new("ls -lh"), &fs())
            .expect("responder");
        assert_eq!(
            matched.communicate(),
            (
                StreamData::Bytes(b"a\nb".to_vec()),
                StreamData::Bytes(Vec::new())
            )
        );
        let fallback = Responder::new(Some(&state), &ProcessRequest::new("echo hi"), &fs())
            .expect("responder");
        assert_eq!(
            fallback.communicate(),
            (
                StreamData::Bytes(b"echo hi".to_vec()),
                StreamData::Bytes(Vec::new())
            )
        );
    }

    #[test]
    fn unknown_encoding_fails_construction() {
        let state = state().with_encoding("no-such-charset");
        let err = Responder::new(Some(&state), &ProcessRequest::new("ls -lh"), &fs())
            .expect_err("bad encoding");
        assert!(matches!(err, WropenError::UnknownEncoding(_)));
    }

    #[test]
    fn reply_the_charset_cannot_represent_fails_construction() {
        let fs = FakeFileSystem::with_file(
            "/pass.json",
            r#"{"1": {"message": "ls", "reply": ["file 日.txt"]}}"#,
        );
        let state = WropenState::new(WropenMode::Pass, "/pass.json").with_encoding("latin1");
        let err =
            Responder::new(Some(&state), &ProcessRequest::new("ls"), &fs).expect_err("unmappable");
        assert!(matches!(err, WropenError::Encode(_)));
    }

    #[test]
    fn missing_table_propagates_io_error() {
        let state = WropenState::new(WropenMode::Pass, "/absent.json");
        let err = Responder::new(Some(&state), &ProcessRequest::new("ls"), &fs())
            .expect_err("missing table");
        assert!(matches!(err, WropenError::Io(_)));
    }

    #[test]
    fn runner_with_injected_state_serves_each_spawn() {
        let runner = ResponderRunner::with_state(state()).with_file_system(Arc::new(fs()));
        let out = runner.run(ProcessRequest::new("cat missing")).expect("run");
        assert_eq!(out.returncode, 1);
        assert_eq!(
            out.stderr,
            StreamData::Text("cat: missing: No such file".to_string())
        );

        let handle = runner.spawn(ProcessRequest::new("ls -lh")).expect("spawn");
        runner.kill(handle).expect("kill");
        assert!(runner.wait(handle).is_err());
    }
}
