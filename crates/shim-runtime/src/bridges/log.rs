//! `console.log`: numeric diagnostics from the guest.

use crate::host::HostState;
use shim_core::{Error, Result};
use wasmtime::{Caller, Linker};

/// Import namespace of `log`.
pub const NAMESPACE: &str = "console";

/// Tracing target guest messages are emitted under.
pub const TARGET: &str = "guest";

/// Emits one guest log line.
pub fn log(host: &mut HostState, value: f64) {
    tracing::info!(target: TARGET, "WebAssembly log: {}", value);
    host.stats.guest_logs += 1;
}

pub(crate) fn link(linker: &mut Linker<HostState>) -> Result<()> {
    linker
        .func_wrap(
            NAMESPACE,
            "log",
            |mut caller: Caller<'_, HostState>, value: f64| {
                log(caller.data_mut(), value);
            },
        )
        .map_err(|e| Error::WasmError {
            message: format!("Failed to link console.log: {e}"),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridges::exit::ReportExit;
    use crate::host::HostIo;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_log_counts_messages() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let mut host = HostState::for_tests(HostIo::new(Arc::new(ReportExit::new())));

        log(&mut host, 1.5);
        log(&mut host, f64::NAN);

        assert_eq!(host.stats.guest_logs, 2);
    }

    #[test]
    fn test_log_uses_guest_target() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_target(true)
            .finish();
        let mut host = HostState::for_tests(HostIo::new(Arc::new(ReportExit::new())));

        tracing::subscriber::with_default(subscriber, || log(&mut host, 2.5));

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains(TARGET), "output: {output}");
        assert!(output.contains("WebAssembly log: 2.5"), "output: {output}");
    }
}
