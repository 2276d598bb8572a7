//! wasi-shim CLI.
//!
//! Loads a precompiled guest module from a path or URL, links the host
//! imports and runs the guest's entrypoint. The process exits with the
//! integer the entrypoint returns, or with the code passed to `proc_exit`.
//!
//! # Examples
//!
//! ```bash
//! # Run a local module
//! wasi-shim guest.wasm
//!
//! # Fetch a remote module and print run statistics
//! wasi-shim --stats https://example.com/guest.wasm
//!
//! # Use a configuration file, overriding the entrypoint
//! wasi-shim --config shim.toml --entry _start guest.wasm
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use shim_runtime::Runtime;
use shim_runtime::config::{ExitMode, RuntimeConfig};
use shim_runtime::host::HostIo;
use shim_runtime::loader::ModuleSource;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Runs precompiled WASI guests that drive their own event loop.
#[derive(Parser, Debug)]
#[command(name = "wasi-shim")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Module path or http(s) URL (falls back to `fallback_url` from config)
    #[arg(env = "WASI_SHIM_MODULE")]
    module: Option<String>,

    /// TOML configuration file
    #[arg(short, long, env = "WASI_SHIM_CONFIG")]
    config: Option<PathBuf>,

    /// Run entrypoint export
    #[arg(long = "entry", env = "WASI_SHIM_ENTRY")]
    entrypoint: Option<String>,

    /// Export called after every completed poll
    #[arg(long, env = "WASI_SHIM_RESUME_EXPORT")]
    resume_export: Option<String>,

    /// Linear-memory ceiling in megabytes
    #[arg(long, env = "WASI_SHIM_MEMORY_LIMIT_MB")]
    memory_limit_mb: Option<usize>,

    /// What `proc_exit` does: `process` terminates, `report` only records
    #[arg(long, env = "WASI_SHIM_EXIT_MODE", value_parser = ExitMode::from_str)]
    exit_mode: Option<ExitMode>,

    /// Print the run report as JSON on stderr
    #[arg(long)]
    stats: bool,

    /// Enable verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

/// Log line encoding on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    /// Builds the runtime configuration: file first, then flag overrides.
    fn runtime_config(&self) -> Result<RuntimeConfig> {
        let base = match &self.config {
            Some(path) => RuntimeConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => RuntimeConfig::default(),
        };

        let mut builder = base.to_builder();
        if let Some(entrypoint) = &self.entrypoint {
            builder = builder.entrypoint(entrypoint);
        }
        if let Some(resume_export) = &self.resume_export {
            builder = builder.resume_export(resume_export);
        }
        if let Some(mb) = self.memory_limit_mb {
            builder = builder.memory_limit_mb(mb);
        }
        if let Some(mode) = self.exit_mode {
            builder = builder.exit_mode(mode);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    let config = cli.runtime_config()?;
    let source = ModuleSource::resolve(cli.module.as_deref(), &config)?;
    let io = HostIo::for_mode(config.exit_mode());
    tracing::debug!("Running {} (exit mode: {})", source, config.exit_mode().as_str());

    let runtime = Runtime::new(config).context("failed to initialize runtime")?;
    let report = runtime
        .run_source(&source, io)
        .await
        .with_context(|| format!("failed to run {source}"))?;

    if cli.stats {
        eprintln!("{}", serde_json::to_string_pretty(&report)?);
    }

    std::process::exit(report.exit_code.as_i32());
}

/// Initializes logging infrastructure.
///
/// Sets up tracing subscriber with environment filter on stderr, leaving
/// stdout to the guest.
fn init_logging(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt_layer).init(),
        LogFormat::Json => registry.with(fmt_layer.json()).init(),
    }
}
