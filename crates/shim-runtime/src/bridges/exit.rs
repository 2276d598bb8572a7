//! `proc_exit` and the strategies that honor it.
//!
//! Whether the host process can actually be terminated is decided by the
//! embedder, not probed at runtime: the runtime is handed an
//! [`ExitStrategy`] and calls it with the guest's code.

use crate::host::HostState;
use shim_core::{Error, ExitCode, Result};
use std::io::Write;
use std::sync::Mutex;
use wasmtime::{Caller, Linker};

/// Import namespace of `proc_exit`.
pub const NAMESPACE: &str = "wasi_snapshot_preview1";

/// Decides what `proc_exit` does with the guest's code.
pub trait ExitStrategy: Send + Sync + std::fmt::Debug {
    /// Handles an exit request. Implementations that terminate the process
    /// do not return.
    fn exit(&self, code: ExitCode);

    /// Returns `true` if [`Self::exit`] terminates the host process.
    fn terminates(&self) -> bool;
}

/// Terminates the host process with the guest's code.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl ExitStrategy for ProcessExit {
    fn exit(&self, code: ExitCode) {
        tracing::info!("Guest requested exit with code {}", code);
        std::process::exit(code.as_i32());
    }

    fn terminates(&self) -> bool {
        true
    }
}

/// Reports the guest's code without terminating.
///
/// Used when the host has no process to end (embedding, tests). The last
/// reported code can be read back with [`ReportExit::last_code`].
///
/// # Examples
///
/// ```
/// use shim_core::ExitCode;
/// use shim_runtime::bridges::exit::{ExitStrategy, ReportExit};
///
/// let strategy = ReportExit::new();
/// strategy.exit(ExitCode::from_i32(42));
/// assert_eq!(strategy.last_code(), Some(ExitCode::from_i32(42)));
/// ```
#[derive(Debug, Default)]
pub struct ReportExit {
    last: Mutex<Option<ExitCode>>,
}

impl ReportExit {
    /// Creates a strategy with no code reported yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the most recently reported code.
    #[must_use]
    pub fn last_code(&self) -> Option<ExitCode> {
        *self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ExitStrategy for ReportExit {
    fn exit(&self, code: ExitCode) {
        tracing::info!("exit code: {}", code);
        *self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(code);
    }

    fn terminates(&self) -> bool {
        false
    }
}

/// Handles a `proc_exit` call from the guest.
///
/// Guest output is flushed first so nothing written before the exit is lost.
pub fn proc_exit(host: &mut HostState, code: i32) {
    let code = ExitCode::from_i32(code);
    if let Err(e) = host.stdout.flush() {
        tracing::warn!("Failed to flush guest output before exit: {}", e);
    }
    if !host.exit.terminates() {
        host.stats.exit_request = Some(code);
    }
    host.exit.exit(code);
}

pub(crate) fn link(linker: &mut Linker<HostState>) -> Result<()> {
    linker
        .func_wrap(
            NAMESPACE,
            "proc_exit",
            |mut caller: Caller<'_, HostState>, code: i32| {
                tracing::debug!("proc_exit({})", code);
                proc_exit(caller.data_mut(), code);
            },
        )
        .map_err(|e| Error::WasmError {
            message: format!("Failed to link proc_exit: {e}"),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostIo;
    use std::sync::Arc;

    #[test]
    fn test_report_exit_records_code() {
        let strategy = Arc::new(ReportExit::new());
        let mut host = HostState::for_tests(HostIo::new(strategy.clone()));

        proc_exit(&mut host, 42);

        assert_eq!(strategy.last_code(), Some(ExitCode::from_i32(42)));
        assert_eq!(host.stats.exit_request, Some(ExitCode::from_i32(42)));
    }

    #[test]
    fn test_report_exit_keeps_latest_code() {
        let strategy = ReportExit::new();
        assert_eq!(strategy.last_code(), None);
        strategy.exit(ExitCode::from_i32(1));
        strategy.exit(ExitCode::from_i32(7));
        assert_eq!(strategy.last_code(), Some(ExitCode::from_i32(7)));
        assert!(!strategy.terminates());
    }

    #[test]
    fn test_process_exit_terminates() {
        assert!(ProcessExit.terminates());
    }
}
