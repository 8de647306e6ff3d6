use wropen::errors::WropenError;
use wropen::intercept::{entry_point, intercept_popen, same_runner};
use wropen::responder::ResponderRunner;
use wropen::runtime::{ProcessRequest, ProcessRunner};

#[test]
fn responder_before_configure_is_not_configured() {
    let runner = ResponderRunner::global();
    let err = runner
        .run(ProcessRequest::argv(["ls", "-lh"]))
        .expect_err("unconfigured");
    assert!(matches!(err, WropenError::NotConfigured));
    assert!(!wropen::state::is_configured());
}

#[test]
fn intercept_without_configuration_leaves_entry_point_alone() {
    let before = entry_point();
    let inside = intercept_popen(entry_point);
    assert!(same_runner(&before, &inside));
    assert!(same_runner(&before, &entry_point()));
}

#[test]
fn update_state_before_configure_is_not_configured() {
    let err = wropen::state::update_state(|state| state.debug = true).expect_err("unconfigured");
    assert!(matches!(err, WropenError::NotConfigured));
}
