//! Host state shared with the guest through the Wasmtime store.
//!
//! [`HostIo`] carries the capabilities an embedder injects (where guest
//! stdout goes, what `proc_exit` does). [`HostState`] is the store data the
//! bridges operate on: the pollable registry, the injected capabilities, the
//! names of the guest exports the bridges call back into and the run
//! counters.
//!
//! # Examples
//!
//! ```
//! use shim_runtime::bridges::exit::ReportExit;
//! use shim_runtime::host::HostIo;
//! use std::sync::Arc;
//!
//! let io = HostIo::new(Arc::new(ReportExit::new())).with_stdout(Vec::new());
//! assert!(!io.exit_strategy().terminates());
//! ```

use crate::bridges::exit::{ExitStrategy, ProcessExit, ReportExit};
use crate::config::{ExitMode, RuntimeConfig};
use crate::pollable::PollableRegistry;
use crate::stats::HostStats;
use std::io::Write;
use std::sync::Arc;
use wasmtime::ResourceLimiter;

/// Capabilities injected by the embedder for one run.
pub struct HostIo {
    stdout: Box<dyn Write + Send>,
    exit: Arc<dyn ExitStrategy>,
}

impl std::fmt::Debug for HostIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostIo")
            .field("exit", &self.exit)
            .finish_non_exhaustive()
    }
}

impl HostIo {
    /// Creates host capabilities writing to the process stdout.
    #[must_use]
    pub fn new(exit: Arc<dyn ExitStrategy>) -> Self {
        Self {
            stdout: Box::new(std::io::stdout()),
            exit,
        }
    }

    /// Creates host capabilities for the given exit mode.
    #[must_use]
    pub fn for_mode(mode: ExitMode) -> Self {
        match mode {
            ExitMode::Process => Self::new(Arc::new(ProcessExit)),
            ExitMode::Report => Self::new(Arc::new(ReportExit::new())),
        }
    }

    /// Redirects guest stdout.
    #[must_use]
    pub fn with_stdout(mut self, stdout: impl Write + Send + 'static) -> Self {
        self.stdout = Box::new(stdout);
        self
    }

    /// Returns the exit strategy.
    #[must_use]
    pub fn exit_strategy(&self) -> &dyn ExitStrategy {
        self.exit.as_ref()
    }
}

/// Names of the guest exports the bridges use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestExports {
    /// Exported linear memory
    pub memory: String,
    /// Export called after every completed poll
    pub resume: String,
}

/// Store data for one guest instance.
pub struct HostState {
    pub(crate) registry: PollableRegistry,
    pub(crate) stdout: Box<dyn Write + Send>,
    pub(crate) exit: Arc<dyn ExitStrategy>,
    pub(crate) exports: GuestExports,
    pub(crate) stats: HostStats,
    pub(crate) limiter: MemoryLimiter,
}

impl std::fmt::Debug for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostState")
            .field("pollables", &self.registry.len())
            .field("exports", &self.exports)
            .field("stats", &self.stats)
            .field("exit", &self.exit)
            .finish_non_exhaustive()
    }
}

impl HostState {
    /// Creates store data from injected capabilities and configuration.
    #[must_use]
    pub fn new(io: HostIo, config: &RuntimeConfig) -> Self {
        Self {
            registry: PollableRegistry::new(),
            stdout: io.stdout,
            exit: io.exit,
            exports: GuestExports {
                memory: config.memory_export().to_string(),
                resume: config.resume_export().to_string(),
            },
            stats: HostStats::default(),
            limiter: MemoryLimiter {
                max_memory_bytes: config.memory_limit_bytes(),
            },
        }
    }

    /// Returns the pollable registry.
    #[must_use]
    pub const fn registry(&self) -> &PollableRegistry {
        &self.registry
    }

    /// Returns the run counters.
    #[must_use]
    pub const fn stats(&self) -> &HostStats {
        &self.stats
    }

    #[cfg(test)]
    pub(crate) fn for_tests(io: HostIo) -> Self {
        Self::new(io, &RuntimeConfig::default())
    }
}

/// Memory limiter for the guest store.
#[derive(Debug)]
pub(crate) struct MemoryLimiter {
    max_memory_bytes: usize,
}

impl ResourceLimiter for MemoryLimiter {
    fn memory_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        if desired > self.max_memory_bytes {
            tracing::warn!(
                "Memory limit exceeded: {} > {}",
                desired,
                self.max_memory_bytes
            );
            Ok(false)
        } else {
            tracing::trace!("Memory growing: {} -> {} bytes", current, desired);
            Ok(true)
        }
    }

    fn table_growing(
        &mut self,
        _current: usize,
        _desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }
}
