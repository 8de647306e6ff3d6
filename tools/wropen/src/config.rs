use crate::errors::WropenError;
use crate::runtime::FileSystem;
use crate::state::{WropenMode, WropenState};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PASS_PATH: &str = "wropen.json";

#[derive(Debug, Clone, Default)]
pub struct StateOverrides {
    pub mode: Option<WropenMode>,
    pub debug: Option<bool>,
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialStateConfig {
    mode: Option<WropenMode>,
    pass_path: Option<PathBuf>,
    fail_path: Option<PathBuf>,
    debug: Option<bool>,
    encoding: Option<String>,
    log_path: Option<PathBuf>,
}

/// Build a state from defaults, the TOML file at `config_path` (if any) and `overrides`.
///
/// Relative table and log paths in the file are taken relative to the file itself;
/// without a file they are taken relative to `process_cwd`.
pub fn load_state(
    config_path: Option<&Path>,
    overrides: &StateOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<WropenState, WropenError> {
    let mut state = WropenState::new(WropenMode::Pass, DEFAULT_PASS_PATH);
    let mut base = process_cwd.to_path_buf();

    if let Some(path) = config_path {
        let path = absolutize_path(process_cwd, path);
        let file_contents = fs.read_to_string(&path)?;
        let partial: PartialStateConfig = toml::from_str(&file_contents)
            .map_err(|e| WropenError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut state, partial);
        if let Some(parent) = path.parent() {
            base = parent.to_path_buf();
        }
    }

    apply_overrides(&mut state, overrides);

    state.pass_path = absolutize_path(&base, &state.pass_path);
    state.fail_path = state.fail_path.map(|p| absolutize_path(&base, &p));
    state.log_path = state.log_path.map(|p| absolutize_path(&base, &p));
    Ok(state)
}

fn merge_partial_config(state: &mut WropenState, partial: PartialStateConfig) {
    if let Some(mode) = partial.mode {
        state.mode = mode;
    }
    if let Some(pass_path) = partial.pass_path {
        state.pass_path = pass_path;
    }
    if let Some(fail_path) = partial.fail_path {
        state.fail_path = Some(fail_path);
    }
    if let Some(debug) = partial.debug {
        state.debug = debug;
    }
    if let Some(encoding) = partial.encoding {
        state.encoding = Some(encoding);
    }
    if let Some(log_path) = partial.log_path {
        state.log_path = Some(log_path);
    }
}

fn apply_overrides(state: &mut WropenState, overrides: &StateOverrides) {
    if let Some(mode) = overrides.mode {
        state.mode = mode;
    }
    if let Some(debug) = overrides.debug {
        state.debug = debug;
    }
    if let Some(encoding) = &overrides.encoding {
        state.encoding = Some(encoding.clone());
    }
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FakeFileSystem;

    #[test]
    fn defaults_apply_without_a_file() {
        let fs = FakeFileSystem::default();
        let state =
            load_state(None, &StateOverrides::default(), Path::new("/work"), &fs).expect("state");
        assert_eq!(state.mode, WropenMode::Pass);
        assert_eq!(state.pass_path, PathBuf::from("/work/wropen.json"));
        assert_eq!(state.fail_path, None);
        assert!(!state.debug);
        assert_eq!(state.encoding, None);
    }

    #[test]
    fn file_values_resolve_against_the_config_dir() {
        let fs = FakeFileSystem::with_file(
            "/cfg/wropen.toml",
            r#"
mode = "fail"
pass_path = "tables/pass.json"
fail_path = "/abs/fail.json"
debug = true
encoding = "utf-8"
log_path = "logs/events.jsonl"
"#,
        );
        let state = load_state(
            Some(Path::new("/cfg/wropen.toml")),
            &StateOverrides::default(),
            Path::new("/elsewhere"),
            &fs,
        )
        .expect("state");
        assert_eq!(state.mode, WropenMode::Fail);
        assert_eq!(state.pass_path, PathBuf::from("/cfg/tables/pass.json"));
        assert_eq!(state.fail_path, Some(PathBuf::from("/abs/fail.json")));
        assert!(state.debug);
        assert_eq!(state.encoding.as_deref(), Some("utf-8"));
        assert_eq!(state.log_path, Some(PathBuf::from("/cfg/logs/events.jsonl")));
    }

    #[test]
    fn overrides_win_over_file() {
        let fs = FakeFileSystem::with_file("/cfg/wropen.toml", "mode = \"fail\"\ndebug = true\n");
        let overrides = StateOverrides {
            mode: Some(WropenMode::Pass),
            debug: Some(false),
            encoding: Some("latin1".to_string()),
        };
        let state = load_state(
            Some(Path::new("wropen.toml")),
            &overrides,
            Path::new("/cfg"),
            &fs,
        )
        .expect("state");
        assert_eq!(state.mode, WropenMode::Pass);
        assert!(!state.debug);
        assert_eq!(state.encoding.as_deref(), Some("latin1"));
    }

    #[test]
    fn unknown_keys_are_config_parse_errors() {
        let fs = FakeFileSystem::with_file("/cfg/wropen.toml", "moed = \"pass\"\n");
        let err = load_state(
            Some(Path::new("/cfg/wropen.toml")),
            &StateOverrides::default(),
            Path::new("/"),
            &fs,
        )
        .expect_err("typo");
        assert!(matches!(err, WropenError::ConfigParse(_)));
    }

    #[test]
    fn missing_config_file_is_io_error() {
        let fs = FakeFileSystem::default();
        let err = load_state(
            Some(Path::new("/cfg/wropen.toml")),
            &StateOverrides::default(),
            Path::new("/"),
            &fs,
        )
        .expect_err("missing");
        assert!(matches!(err, WropenError::Io(_)));
    }
}
