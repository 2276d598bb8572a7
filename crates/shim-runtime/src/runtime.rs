//! Guest runtime on Wasmtime.
//!
//! [`Runtime`] owns the engine and a linker carrying every host import. Each
//! run gets a fresh store, so pollable ids start at 0 again and nothing leaks
//! between guests.
//!
//! # Examples
//!
//! ```no_run
//! use shim_runtime::{Runtime, config::{ExitMode, RuntimeConfig}, host::HostIo};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RuntimeConfig::builder().exit_mode(ExitMode::Report).build();
//! let runtime = Runtime::new(config)?;
//!
//! let wasm_bytes = std::fs::read("guest.wasm")?;
//! let report = runtime.run(&wasm_bytes, HostIo::for_mode(ExitMode::Report)).await?;
//! println!("guest returned {}", report.exit_code);
//! # Ok(())
//! # }
//! ```

use crate::bridges;
use crate::config::RuntimeConfig;
use crate::host::{HostIo, HostState};
use crate::loader::ModuleSource;
use crate::stats::RunReport;
use shim_core::{Error, ExitCode, Result};
use std::time::Instant;
use wasmtime::{Config, Engine, Linker, Module, Store, Strategy, WasmBacktraceDetails};

/// Loads, links and runs guests.
///
/// Every call to [`Runtime::run`] uses its own store. Runs are expected on
/// the tokio runtime that also drives the guest's timers.
pub struct Runtime {
    engine: Engine,
    linker: Linker<HostState>,
    config: RuntimeConfig,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Creates a runtime and links the host imports.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for an invalid configuration and
    /// [`Error::WasmError`] if the engine or linker cannot be set up.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;

        let mut wasmtime_config = Config::new();
        wasmtime_config.wasm_backtrace_details(WasmBacktraceDetails::Enable);
        wasmtime_config.async_support(true);
        wasmtime_config.strategy(Strategy::Cranelift);

        // Guests compiled against imported string builtins also rely on the
        // GC, typed function reference and exception handling proposals.
        if config.string_builtins() {
            wasmtime_config.wasm_reference_types(true);
            wasmtime_config.wasm_function_references(true);
            wasmtime_config.wasm_gc(true);
            wasmtime_config.wasm_exceptions(true);
        }

        let engine = Engine::new(&wasmtime_config).map_err(|e| Error::WasmError {
            message: format!("Failed to create Wasmtime engine: {e}"),
        })?;

        let mut linker = Linker::new(&engine);
        bridges::link_imports(&mut linker)?;

        Ok(Self {
            engine,
            linker,
            config,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Compiles module bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compile`] if the bytes are not a valid module for
    /// this engine.
    pub fn compile(&self, wasm_bytes: &[u8]) -> Result<Module> {
        tracing::debug!("Compiling WASM module ({} bytes)", wasm_bytes.len());
        let compilation_start = Instant::now();

        let module = Module::new(&self.engine, wasm_bytes).map_err(|e| Error::Compile {
            message: format!("{e:#}"),
        })?;

        tracing::info!("Module compiled in {:?}", compilation_start.elapsed());
        Ok(module)
    }

    /// Compiles and runs a guest.
    ///
    /// # Errors
    ///
    /// See [`Runtime::compile`] and [`Runtime::run_module`].
    pub async fn run(&self, wasm_bytes: &[u8], io: HostIo) -> Result<RunReport> {
        let module = self.compile(wasm_bytes)?;
        self.run_module(&module, io).await
    }

    /// Loads a guest from `source`, then compiles and runs it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleLoad`] if the bytes cannot be obtained, then
    /// anything [`Runtime::run`] returns.
    pub async fn run_source(&self, source: &ModuleSource, io: HostIo) -> Result<RunReport> {
        let wasm_bytes = source.load().await?;
        self.run(&wasm_bytes, io).await
    }

    /// Instantiates a compiled guest and invokes its run entrypoint.
    ///
    /// The returned report carries the entrypoint's integer result. The
    /// runtime does not turn it into a process exit.
    ///
    /// # Errors
    ///
    /// - [`Error::Instantiate`] if the imports do not match
    /// - [`Error::MissingExport`] if the memory export or the entrypoint is
    ///   absent or mistyped
    /// - the typed error a host import failed with (protocol violations,
    ///   memory access)
    /// - [`Error::ExecutionError`] for any other trap
    pub async fn run_module(&self, module: &Module, io: HostIo) -> Result<RunReport> {
        let mut store = Store::new(&self.engine, HostState::new(io, &self.config));
        store.limiter(|state| &mut state.limiter);

        let instance = self
            .linker
            .instantiate_async(&mut store, module)
            .await
            .map_err(|e| match e.downcast::<Error>() {
                Ok(err) => err,
                Err(e) => Error::Instantiate {
                    message: format!("{e:#}"),
                },
            })?;

        let memory_export = self.config.memory_export();
        if instance.get_memory(&mut store, memory_export).is_none() {
            return Err(Error::MissingExport {
                name: memory_export.to_string(),
            });
        }

        let entrypoint = self.config.entrypoint();
        tracing::debug!("Getting entry point function: {}", entrypoint);
        let func = instance
            .get_typed_func::<(), i32>(&mut store, entrypoint)
            .map_err(|e| {
                tracing::debug!("Entry point lookup failed: {}", e);
                Error::MissingExport {
                    name: entrypoint.to_string(),
                }
            })?;

        let start_time = Instant::now();
        tracing::debug!("Calling entry point function asynchronously");
        let result = func.call_async(&mut store, ()).await.map_err(|e| {
            tracing::error!("WASM execution trap: {:#}", e);
            into_run_error(e)
        })?;

        let elapsed = start_time.elapsed();
        let exit_code = ExitCode::from_i32(result);
        tracing::info!(
            "WASM execution completed in {:?}, exit code: {}",
            elapsed,
            exit_code
        );

        let state = store.data();
        Ok(RunReport::new(
            exit_code,
            elapsed,
            state.registry().len(),
            *state.stats(),
        ))
    }
}

/// Recovers the typed error a host import trapped with.
fn into_run_error(e: anyhow::Error) -> Error {
    match e.downcast::<Error>() {
        Ok(err) => err,
        Err(e) => Error::ExecutionError {
            message: format!("WASM execution failed: {e}"),
            source: Some(e.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridges::exit::ReportExit;
    use std::sync::Arc;

    fn report_io() -> HostIo {
        HostIo::new(Arc::new(ReportExit::new())).with_stdout(Vec::new())
    }

    fn runtime_with_entry(entry: &str) -> Runtime {
        Runtime::new(RuntimeConfig::builder().entrypoint(entry).build()).unwrap()
    }

    #[test]
    fn test_runtime_creation() {
        let runtime = Runtime::new(RuntimeConfig::default());
        assert!(runtime.is_ok());
    }

    #[test]
    fn test_runtime_rejects_invalid_config() {
        let err = Runtime::new(RuntimeConfig::builder().entrypoint("").build()).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_runtime_without_string_builtins() {
        let config = RuntimeConfig::builder().string_builtins(false).build();
        assert!(Runtime::new(config).is_ok());
    }

    #[test]
    fn test_exception_tags_follow_capability_flag() {
        let wasm = wat::parse_str(
            r#"
            (module
                (tag $exception (param i32))
                (memory (export "memory") 1))
            "#,
        )
        .unwrap();

        let enabled = Runtime::new(RuntimeConfig::default()).unwrap();
        assert!(enabled.compile(&wasm).is_ok());

        let disabled = Runtime::new(RuntimeConfig::builder().string_builtins(false).build()).unwrap();
        let err = disabled.compile(&wasm).unwrap_err();
        assert!(matches!(err, Error::Compile { .. }));
    }

    #[test]
    fn test_compile_invalid_wasm() {
        let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
        let err = runtime.compile(b"not wasm").unwrap_err();
        assert!(matches!(err, Error::Compile { .. }));
    }

    #[tokio::test]
    async fn test_run_returns_entrypoint_result() {
        let wasm = wat::parse_str(
            r#"
            (module
                (memory (export "memory") 1)
                (func (export "run") (result i32)
                    i32.const 42))
            "#,
        )
        .unwrap();

        let report = runtime_with_entry("run")
            .run(&wasm, report_io())
            .await
            .unwrap();

        assert_eq!(report.exit_code, ExitCode::from_i32(42));
        assert_eq!(report.pollables, 0);
        assert_eq!(report.polls, 0);
    }

    #[tokio::test]
    async fn test_default_entrypoint_name() {
        let wasm = wat::parse_str(
            r#"
            (module
                (memory (export "memory") 1)
                (func (export "wasi:cli/run@0.2.1#run") (result i32)
                    i32.const 0))
            "#,
        )
        .unwrap();

        let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
        let report = runtime.run(&wasm, report_io()).await.unwrap();
        assert!(report.exit_code.is_success());
    }

    #[tokio::test]
    async fn test_missing_memory_export() {
        let wasm = wat::parse_str(
            r#"
            (module
                (func (export "run") (result i32)
                    i32.const 0))
            "#,
        )
        .unwrap();

        let err = runtime_with_entry("run")
            .run(&wasm, report_io())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingExport { name } if name == "memory"));
    }

    #[tokio::test]
    async fn test_mistyped_entrypoint() {
        let wasm = wat::parse_str(
            r#"
            (module
                (memory (export "memory") 1)
                (func (export "run")))
            "#,
        )
        .unwrap();

        let err = runtime_with_entry("run")
            .run(&wasm, report_io())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingExport { name } if name == "run"));
    }

    #[tokio::test]
    async fn test_guest_trap_is_execution_error() {
        let wasm = wat::parse_str(
            r#"
            (module
                (memory (export "memory") 1)
                (func (export "run") (result i32)
                    unreachable))
            "#,
        )
        .unwrap();

        let err = runtime_with_entry("run")
            .run(&wasm, report_io())
            .await
            .unwrap_err();
        assert!(err.is_execution_error());
    }
}
