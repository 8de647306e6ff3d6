use std::sync::Arc;
use wropen::errors::WropenError;
use wropen::responder::ResponderRunner;
use wropen::runtime::{FakeFileSystem, ProcessRequest, ProcessRunner, StreamData};
use wropen::state::{WropenMode, WropenState};

const TABLE: &str = r#"{
    "10": {"message": "git rev-parse --abbrev-ref HEAD", "reply": ["feature/x"]},
    "11": {"message": "git push origin feature/x", "error": ["rejected"], "returncode": 1}
}"#;

/// Code under test that takes its spawning capability as a parameter.
fn push_current_branch(runner: &dyn ProcessRunner) -> Result<String, WropenError> {
    let branch = runner.run(ProcessRequest::argv(["git", "rev-parse", "--abbrev-ref", "HEAD"]))?;
    let branch = branch.stdout.to_string_lossy();
    let push = runner.run(ProcessRequest::argv(["git", "push", "origin", branch.as_str()]))?;
    if push.returncode != 0 {
        return Err(WropenError::Process(push.stderr.to_string_lossy()));
    }
    Ok(branch)
}

fn runner(state: WropenState) -> ResponderRunner {
    ResponderRunner::with_state(state)
        .with_file_system(Arc::new(FakeFileSystem::with_file("/tables/pass.json", TABLE)))
}

#[test]
fn injected_runner_drives_code_under_test() {
    let runner = runner(WropenState::new(WropenMode::Pass, "/tables/pass.json"));
    let err = push_current_branch(&runner).expect_err("push rejected");
    assert!(matches!(err, WropenError::Process(msg) if msg == "rejected"));
}

#[test]
fn injected_runner_ignores_process_wide_configuration() {
    let runner = runner(WropenState::new(WropenMode::Pass, "/tables/pass.json"));
    let out = runner
        .run(ProcessRequest::new("git rev-parse --abbrev-ref HEAD"))
        .expect("run");
    assert_eq!(out.stdout, StreamData::Text("feature/x".to_string()));
    assert!(!wropen::state::is_configured());
}

#[test]
fn repeated_calls_return_identical_replies() {
    let runner = runner(WropenState::new(WropenMode::Pass, "/tables/pass.json"));
    let request = ProcessRequest::argv(["git", "push", "origin", "feature/x"]);
    let first = runner.run(request.clone()).expect("first");
    let second = runner.run(request).expect("second");
    assert_eq!(first, second);
    assert_eq!(first.returncode, 1);
}
