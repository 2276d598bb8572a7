//! Runtime configuration.
//!
//! Names the guest exports the runtime talks to, the linear-memory ceiling,
//! the compile-time capability flags and how `proc_exit` behaves.
//! Configuration can be built in code, or loaded from a TOML file where every
//! key is optional.
//!
//! # Examples
//!
//! ```
//! use shim_runtime::config::{ExitMode, RuntimeConfig};
//!
//! let config = RuntimeConfig::builder()
//!     .memory_limit_mb(64)
//!     .exit_mode(ExitMode::Report)
//!     .build();
//!
//! assert_eq!(config.memory_limit_bytes(), 64 * 1024 * 1024);
//! assert_eq!(config.resume_export(), "main_loop");
//! ```

use serde::Deserialize;
use shim_core::{Error, Result};
use std::path::Path;
use std::str::FromStr;

/// How `proc_exit` is honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitMode {
    /// Terminate the host process with the guest's code.
    #[default]
    Process,
    /// Only report the code; the guest keeps running.
    Report,
}

impl ExitMode {
    /// Returns the string representation of the mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Report => "report",
        }
    }
}

impl FromStr for ExitMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "report" => Ok(Self::Report),
            _ => Err(Error::InvalidArgument(format!(
                "invalid exit mode: '{s}' (expected: process or report)"
            ))),
        }
    }
}

/// Configuration for [`crate::Runtime`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Export invoked to start the guest
    entrypoint: String,

    /// Export invoked after every completed poll
    resume_export: String,

    /// Name of the exported linear memory
    memory_export: String,

    /// Linear-memory ceiling in megabytes
    memory_limit_mb: usize,

    /// Enable the proposals the imported string builtins are built on
    string_builtins: bool,

    /// Behavior of `proc_exit`
    exit_mode: ExitMode,

    /// Module location used when none is given explicitly
    fallback_url: Option<String>,
}

impl RuntimeConfig {
    /// Default run entrypoint
    pub const DEFAULT_ENTRYPOINT: &'static str = "wasi:cli/run@0.2.1#run";

    /// Default resumption export
    pub const DEFAULT_RESUME_EXPORT: &'static str = "main_loop";

    /// Default memory export
    pub const DEFAULT_MEMORY_EXPORT: &'static str = "memory";

    /// Default memory limit: 1024 pages of 64KiB
    pub const DEFAULT_MEMORY_LIMIT_MB: usize = 64;

    /// Creates a new configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Parses a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the document is malformed, contains
    /// unknown keys or fails validation.
    ///
    /// # Examples
    ///
    /// ```
    /// use shim_runtime::config::{ExitMode, RuntimeConfig};
    ///
    /// let config = RuntimeConfig::from_toml_str(r#"
    ///     entrypoint = "_start"
    ///     exit_mode = "report"
    /// "#).unwrap();
    ///
    /// assert_eq!(config.entrypoint(), "_start");
    /// assert_eq!(config.exit_mode(), ExitMode::Report);
    /// assert_eq!(config.memory_export(), "memory");
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).map_err(|e| Error::ConfigError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| Error::ConfigError {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&source)
    }

    /// Checks that every export name is set and the memory limit is positive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let names = [
            ("entrypoint", &self.entrypoint),
            ("resume_export", &self.resume_export),
            ("memory_export", &self.memory_export),
        ];
        if let Some((field, _)) = names.iter().find(|(_, name)| name.is_empty()) {
            return Err(Error::ConfigError {
                message: format!("{field} must not be empty"),
            });
        }
        if self.memory_limit_mb == 0 {
            return Err(Error::ConfigError {
                message: "memory_limit_mb must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Returns a builder seeded with this configuration.
    #[must_use]
    pub fn to_builder(&self) -> RuntimeConfigBuilder {
        RuntimeConfigBuilder {
            entrypoint: Some(self.entrypoint.clone()),
            resume_export: Some(self.resume_export.clone()),
            memory_export: Some(self.memory_export.clone()),
            memory_limit_mb: Some(self.memory_limit_mb),
            string_builtins: Some(self.string_builtins),
            exit_mode: Some(self.exit_mode),
            fallback_url: self.fallback_url.clone(),
        }
    }

    /// Returns the run entrypoint export name.
    #[inline]
    #[must_use]
    pub fn entrypoint(&self) -> &str {
        &self.entrypoint
    }

    /// Returns the resumption export name.
    #[inline]
    #[must_use]
    pub fn resume_export(&self) -> &str {
        &self.resume_export
    }

    /// Returns the memory export name.
    #[inline]
    #[must_use]
    pub fn memory_export(&self) -> &str {
        &self.memory_export
    }

    /// Returns memory limit in bytes.
    #[inline]
    #[must_use]
    pub const fn memory_limit_bytes(&self) -> usize {
        self.memory_limit_mb.saturating_mul(1024 * 1024)
    }

    /// Returns whether the string-builtins capability is enabled.
    #[inline]
    #[must_use]
    pub const fn string_builtins(&self) -> bool {
        self.string_builtins
    }

    /// Returns the `proc_exit` behavior.
    #[inline]
    #[must_use]
    pub const fn exit_mode(&self) -> ExitMode {
        self.exit_mode
    }

    /// Returns the fallback module location, if any.
    #[inline]
    #[must_use]
    pub fn fallback_url(&self) -> Option<&str> {
        self.fallback_url.as_deref()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            entrypoint: Self::DEFAULT_ENTRYPOINT.to_string(),
            resume_export: Self::DEFAULT_RESUME_EXPORT.to_string(),
            memory_export: Self::DEFAULT_MEMORY_EXPORT.to_string(),
            memory_limit_mb: Self::DEFAULT_MEMORY_LIMIT_MB,
            string_builtins: true,
            exit_mode: ExitMode::Process,
            fallback_url: None,
        }
    }
}

/// Builder for [`RuntimeConfig`].
///
/// # Examples
///
/// ```
/// use shim_runtime::config::RuntimeConfig;
///
/// let config = RuntimeConfig::builder()
///     .entrypoint("run")
///     .resume_export("resume")
///     .string_builtins(false)
///     .build();
///
/// assert_eq!(config.entrypoint(), "run");
/// assert!(!config.string_builtins());
/// ```
#[derive(Debug, Default)]
pub struct RuntimeConfigBuilder {
    entrypoint: Option<String>,
    resume_export: Option<String>,
    memory_export: Option<String>,
    memory_limit_mb: Option<usize>,
    string_builtins: Option<bool>,
    exit_mode: Option<ExitMode>,
    fallback_url: Option<String>,
}

impl RuntimeConfigBuilder {
    /// Sets the run entrypoint export name.
    #[must_use]
    pub fn entrypoint(mut self, name: impl Into<String>) -> Self {
        self.entrypoint = Some(name.into());
        self
    }

    /// Sets the resumption export name.
    #[must_use]
    pub fn resume_export(mut self, name: impl Into<String>) -> Self {
        self.resume_export = Some(name.into());
        self
    }

    /// Sets the memory export name.
    #[must_use]
    pub fn memory_export(mut self, name: impl Into<String>) -> Self {
        self.memory_export = Some(name.into());
        self
    }

    /// Sets memory limit in megabytes.
    #[must_use]
    pub const fn memory_limit_mb(mut self, mb: usize) -> Self {
        self.memory_limit_mb = Some(mb);
        self
    }

    /// Enables or disables the string-builtins capability.
    #[must_use]
    pub const fn string_builtins(mut self, enabled: bool) -> Self {
        self.string_builtins = Some(enabled);
        self
    }

    /// Sets the `proc_exit` behavior.
    #[must_use]
    pub const fn exit_mode(mut self, mode: ExitMode) -> Self {
        self.exit_mode = Some(mode);
        self
    }

    /// Sets the fallback module location.
    #[must_use]
    pub fn fallback_url(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }

    /// Builds the configuration, filling unset fields with defaults.
    #[must_use]
    pub fn build(self) -> RuntimeConfig {
        let defaults = RuntimeConfig::default();
        RuntimeConfig {
            entrypoint: self.entrypoint.unwrap_or(defaults.entrypoint),
            resume_export: self.resume_export.unwrap_or(defaults.resume_export),
            memory_export: self.memory_export.unwrap_or(defaults.memory_export),
            memory_limit_mb: self.memory_limit_mb.unwrap_or(defaults.memory_limit_mb),
            string_builtins: self.string_builtins.unwrap_or(defaults.string_builtins),
            exit_mode: self.exit_mode.unwrap_or(defaults.exit_mode),
            fallback_url: self.fallback_url.or(defaults.fallback_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.entrypoint(), "wasi:cli/run@0.2.1#run");
        assert_eq!(config.resume_export(), "main_loop");
        assert_eq!(config.memory_export(), "memory");
        assert_eq!(config.memory_limit_bytes(), 64 * 1024 * 1024);
        assert!(config.string_builtins());
        assert_eq!(config.exit_mode(), ExitMode::Process);
        assert!(config.fallback_url().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = RuntimeConfig::builder()
            .memory_export("mem")
            .memory_limit_mb(8)
            .fallback_url("https://example.com/guest.wasm")
            .build();
        assert_eq!(config.memory_export(), "mem");
        assert_eq!(config.memory_limit_bytes(), 8 * 1024 * 1024);
        assert_eq!(config.fallback_url(), Some("https://example.com/guest.wasm"));
        assert_eq!(config.entrypoint(), RuntimeConfig::DEFAULT_ENTRYPOINT);
    }

    #[test]
    fn test_to_builder_round_trip() {
        let config = RuntimeConfig::builder().exit_mode(ExitMode::Report).build();
        let rebuilt = config.to_builder().memory_limit_mb(16).build();
        assert_eq!(rebuilt.exit_mode(), ExitMode::Report);
        assert_eq!(rebuilt.memory_limit_bytes(), 16 * 1024 * 1024);
    }

    #[test]
    fn test_toml_partial_document() {
        let config = RuntimeConfig::from_toml_str("memory_limit_mb = 32\nstring_builtins = false\n")
            .unwrap();
        assert_eq!(config.memory_limit_bytes(), 32 * 1024 * 1024);
        assert!(!config.string_builtins());
        assert_eq!(config.resume_export(), "main_loop");
    }

    #[test]
    fn test_toml_rejects_unknown_keys() {
        let err = RuntimeConfig::from_toml_str("timeout = 5\n").unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_toml_rejects_zero_memory_limit() {
        let err = RuntimeConfig::from_toml_str("memory_limit_mb = 0\n").unwrap_err();
        assert!(err.to_string().contains("memory_limit_mb"));
    }

    #[test]
    fn test_validate_rejects_empty_export() {
        let config = RuntimeConfig::builder().resume_export("").build();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("resume_export"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shim.toml");
        std::fs::write(&path, "exit_mode = \"report\"\n").unwrap();

        let config = RuntimeConfig::load(&path).unwrap();
        assert_eq!(config.exit_mode(), ExitMode::Report);

        let missing = RuntimeConfig::load(&dir.path().join("absent.toml"));
        assert!(missing.unwrap_err().is_config_error());
    }

    #[test]
    fn test_exit_mode_parsing() {
        assert_eq!("process".parse::<ExitMode>().unwrap(), ExitMode::Process);
        assert_eq!("REPORT".parse::<ExitMode>().unwrap(), ExitMode::Report);
        assert!("abort".parse::<ExitMode>().is_err());
        assert_eq!(ExitMode::Report.as_str(), "report");
    }
}
