//! The process-wide spawn entry point and the scope that redirects it.
//!
//! Legacy code spawns through [`popen`] or [`run`]. Inside [`intercept_popen`] the
//! entry point answers from the configured response table; outside it, spawns reach
//! whatever runner was installed before (real processes by default).
//!
//! Scopes are serialized process-wide: the outermost scope on a thread holds
//! `SCOPE_LOCK` until it exits. Nested scopes on the same thread save and restore
//! the entry point without taking the lock again.

use crate::errors::WropenError;
use crate::logging::log_event;
use crate::responder::ResponderRunner;
use crate::runtime::{ProcessOutput, ProcessRequest, ProcessRunner, ProductionProcessRunner};
use crate::state::configured_state;
use serde_json::json;
use std::cell::Cell;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

static ENTRY_POINT: OnceLock<Mutex<Arc<dyn ProcessRunner>>> = OnceLock::new();
static SCOPE_LOCK: Mutex<()> = Mutex::new(());

thread_local! {
    static SCOPE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

fn entry_slot() -> &'static Mutex<Arc<dyn ProcessRunner>> {
    ENTRY_POINT.get_or_init(|| Mutex::new(Arc::new(ProductionProcessRunner::new())))
}

/// The runner spawns currently go through.
pub fn entry_point() -> Arc<dyn ProcessRunner> {
    Arc::clone(&entry_slot().lock().unwrap_or_else(PoisonError::into_inner))
}

/// Install `runner` as the spawn entry point and return the one it replaces.
pub fn replace_entry_point(runner: Arc<dyn ProcessRunner>) -> Arc<dyn ProcessRunner> {
    let mut slot = entry_slot().lock().unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *slot, runner)
}

/// Whether `a` and `b` are the same runner instance.
pub fn same_runner(a: &Arc<dyn ProcessRunner>, b: &Arc<dyn ProcessRunner>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// A process started through the entry point. Keeps the runner that spawned it, so
/// it can still be collected after the scope it was spawned in has ended.
///
/// Dropping it without `communicate` or `kill` kills and reaps the process.
pub struct SpawnedProcess {
    runner: Arc<dyn ProcessRunner>,
    handle: Option<u64>,
}

impl SpawnedProcess {
    /// Wait for the process and collect `(stdout, stderr)` plus the return code.
    pub fn communicate(mut self) -> Result<ProcessOutput, WropenError> {
        let handle = self.take_handle()?;
        self.runner.wait(handle)
    }

    pub fn kill(mut self) -> Result<(), WropenError> {
        let handle = self.take_handle()?;
        self.runner.kill(handle)
    }

    fn take_handle(&mut self) -> Result<u64, WropenError> {
        self.handle
            .take()
            .ok_or_else(|| WropenError::Process("process already collected".to_string()))
    }
}

impl Drop for SpawnedProcess {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.runner.kill(handle);
        }
    }
}

pub fn popen(request: ProcessRequest) -> Result<SpawnedProcess, WropenError> {
    let runner = entry_point();
    let handle = runner.spawn(request)?;
    Ok(SpawnedProcess {
        runner,
        handle: Some(handle),
    })
}

pub fn run(request: ProcessRequest) -> Result<ProcessOutput, WropenError> {
    popen(request)?.communicate()
}

struct InterceptGuard {
    previous: Arc<dyn ProcessRunner>,
    log_path: Option<PathBuf>,
    _scope: Option<MutexGuard<'static, ()>>,
}

impl InterceptGuard {
    fn install(runner: Arc<dyn ProcessRunner>, log_path: Option<PathBuf>) -> Self {
        let outermost = SCOPE_DEPTH.with(|depth| depth.get() == 0);
        let scope = outermost.then(|| SCOPE_LOCK.lock().unwrap_or_else(PoisonError::into_inner));
        SCOPE_DEPTH.with(|depth| depth.set(depth.get() + 1));

        let previous = replace_entry_point(runner);
        log_event(
            log_path.as_deref(),
            "info",
            "intercept_begin",
            json!({"depth": SCOPE_DEPTH.with(Cell::get)}),
        );
        Self {
            previous,
            log_path,
            _scope: scope,
        }
    }
}

impl Drop for InterceptGuard {
    fn drop(&mut self) {
        let depth = SCOPE_DEPTH.with(Cell::get);
        replace_entry_point(Arc::clone(&self.previous));
        SCOPE_DEPTH.with(|cell| cell.set(depth.saturating_sub(1)));
        log_event(
            self.log_path.as_deref(),
            "info",
            "intercept_end",
            json!({"depth": depth, "panicking": std::thread::panicking()}),
        );
    }
}

/// Run `f` with spawning redirected to the configured response tables.
///
/// Without a configuration, or with `debug` off, `f` runs untouched. Otherwise the
/// previous entry point is restored however `f` exits, unwinding included.
pub fn intercept_popen<T>(f: impl FnOnce() -> T) -> T {
    let Some(state) = configured_state().filter(|state| state.debug) else {
        return f();
    };
    let _guard = InterceptGuard::install(Arc::new(ResponderRunner::global()), state.log_path);
    f()
}

/// Wrap `f` so every call runs inside [`intercept_popen`].
pub fn intercepted<T>(f: impl Fn() -> T) -> impl Fn() -> T {
    move || intercept_popen(&f)
}
