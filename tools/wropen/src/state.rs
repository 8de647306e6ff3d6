//! The process-wide configuration every responder reads at construction time.
//!
//! Follows the `OnceLock<Mutex<Option<…>>>` slot pattern: the slot starts empty,
//! `configure` fills it, and it is never cleared for the rest of the process.

use crate::errors::WropenError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// Selects which response table file is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WropenMode {
    #[default]
    Pass,
    Fail,
}

impl WropenMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WropenState {
    pub mode: WropenMode,
    pub pass_path: PathBuf,
    pub fail_path: Option<PathBuf>,
    /// `false` turns `intercept_popen` into a plain call.
    pub debug: bool,
    /// Charset label the replies are encoded with; `None` keeps them as text.
    pub encoding: Option<String>,
    pub log_path: Option<PathBuf>,
}

impl WropenState {
    pub fn new(mode: WropenMode, pass_path: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            pass_path: pass_path.into(),
            fail_path: None,
            debug: false,
            encoding: None,
            log_path: None,
        }
    }

    pub fn with_fail_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fail_path = Some(path.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = Some(label.into());
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// The table file for the active mode. Fail mode without a fail path yields `None`;
    /// that is only reported once a responder actually needs the table.
    pub fn resolve_path(&self) -> Option<&Path> {
        match self.mode {
            WropenMode::Pass => Some(self.pass_path.as_path()),
            WropenMode::Fail => self.fail_path.as_deref(),
        }
    }
}

static WROPEN_STATE: OnceLock<Mutex<Option<WropenState>>> = OnceLock::new();

fn state_slot() -> &'static Mutex<Option<WropenState>> {
    WROPEN_STATE.get_or_init(|| Mutex::new(None))
}

/// Install `state` as the process-wide configuration, replacing any previous one.
pub fn configure(state: WropenState) {
    *state_slot().lock().expect("state lock") = Some(state);
}

pub fn is_configured() -> bool {
    state_slot().lock().expect("state lock").is_some()
}

/// Snapshot of the active configuration.
pub fn configured_state() -> Option<WropenState> {
    state_slot().lock().expect("state lock").clone()
}

/// Mutate the active configuration in place (mode, debug and encoding are
/// expected to change between calls).
pub fn update_state(apply: impl FnOnce(&mut WropenState)) -> Result<(), WropenError> {
    let mut guard = state_slot().lock().expect("state lock");
    let state = guard.as_mut().ok_or(WropenError::NotConfigured)?;
    apply(state);
    Ok(())
}
