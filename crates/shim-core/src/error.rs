//! Error types for the wasi-shim runtime.
//!
//! All fallible operations in the workspace return [`Error`]. Host functions
//! running inside the guest convert it into a trap; the runtime recovers the
//! typed variant from the trap when the entrypoint unwinds.
//!
//! # Examples
//!
//! ```
//! use shim_core::{Error, PollableId, Result};
//!
//! fn resolve(issued: u32, id: PollableId) -> Result<()> {
//!     if id.as_u32() >= issued {
//!         return Err(Error::UnknownPollable { id });
//!     }
//!     Ok(())
//! }
//!
//! let err = resolve(2, PollableId::new(7)).unwrap_err();
//! assert!(err.is_protocol_violation());
//! ```

use crate::PollableId;
use thiserror::Error;

/// Main error type for the wasi-shim runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// Module bytes could not be obtained.
    ///
    /// Raised when reading a local module file fails or when fetching a
    /// remote module returns a transport or HTTP error.
    #[error("Failed to load module from {location}")]
    ModuleLoad {
        /// Path or URL the module was loaded from
        location: String,
        /// Underlying I/O or HTTP error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Module bytes are malformed or use unsupported features.
    #[error("Failed to compile module: {message}")]
    Compile {
        /// Diagnostic from the compiler
        message: String,
    },

    /// Module compiled but could not be instantiated against the import
    /// surface (missing or mistyped imports, start function trap).
    #[error("Failed to instantiate module: {message}")]
    Instantiate {
        /// Diagnostic from the linker
        message: String,
    },

    /// The guest does not export a required item with the expected type.
    #[error("Guest export '{name}' is missing or has the wrong type")]
    MissingExport {
        /// Name of the export
        name: String,
    },

    /// The guest referenced a pollable id that was never issued.
    #[error("Unknown pollable id: {id}")]
    UnknownPollable {
        /// Id passed by the guest
        id: PollableId,
    },

    /// The guest asked to poll an empty set of pollables.
    #[error("Poll called with an empty pollable set")]
    EmptyPollSet,

    /// The pollable arena cannot hand out another id.
    #[error("Pollable id space exhausted after {issued} subscriptions")]
    IdSpaceExhausted {
        /// Number of ids already issued
        issued: usize,
    },

    /// A guest pointer/length pair falls outside linear memory.
    #[error("Guest memory access out of bounds: offset {offset}, length {len}, memory size {size}")]
    MemoryAccess {
        /// Start offset requested by the guest
        offset: usize,
        /// Number of bytes requested
        len: usize,
        /// Current size of linear memory in bytes
        size: usize,
    },

    /// Configuration error.
    ///
    /// Raised when configuration is invalid or a config file cannot be parsed.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration problem
        message: String,
    },

    /// Invalid argument error.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Wasmtime engine or linker setup failed.
    #[error("WASM error: {message}")]
    WasmError {
        /// Description of the failure
        message: String,
    },

    /// The guest trapped while running.
    #[error("Execution failed: {message}")]
    ExecutionError {
        /// Description of the trap
        message: String,
        /// Underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Returns `true` if the guest broke the import protocol.
    ///
    /// Covers unknown pollable ids, empty poll sets and out-of-bounds memory
    /// accesses. All of these abort the run.
    ///
    /// # Examples
    ///
    /// ```
    /// use shim_core::Error;
    ///
    /// assert!(Error::EmptyPollSet.is_protocol_violation());
    /// ```
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::UnknownPollable { .. } | Self::EmptyPollSet | Self::MemoryAccess { .. }
        )
    }

    /// Returns `true` if the module could not be loaded, compiled or
    /// instantiated.
    ///
    /// # Examples
    ///
    /// ```
    /// use shim_core::Error;
    ///
    /// let err = Error::Compile {
    ///     message: "bad magic".to_string(),
    /// };
    /// assert!(err.is_module_error());
    /// ```
    #[must_use]
    pub const fn is_module_error(&self) -> bool {
        matches!(
            self,
            Self::ModuleLoad { .. }
                | Self::Compile { .. }
                | Self::Instantiate { .. }
                | Self::MissingExport { .. }
        )
    }

    /// Returns `true` if this is a configuration error.
    ///
    /// # Examples
    ///
    /// ```
    /// use shim_core::Error;
    ///
    /// let err = Error::ConfigError {
    ///     message: "Invalid memory limit".to_string(),
    /// };
    /// assert!(err.is_config_error());
    /// ```
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError { .. })
    }

    /// Returns `true` if the guest trapped.
    #[must_use]
    pub const fn is_execution_error(&self) -> bool {
        matches!(self, Self::ExecutionError { .. })
    }
}

/// Result type alias used throughout the workspace.
///
/// # Examples
///
/// ```
/// use shim_core::{Error, Result};
///
/// fn validate_limit(mb: usize) -> Result<usize> {
///     if mb == 0 {
///         return Err(Error::ConfigError {
///             message: "memory limit must be positive".to_string(),
///         });
///     }
///     Ok(mb)
/// }
///
/// assert!(validate_limit(64).is_ok());
/// assert!(validate_limit(0).is_err());
/// ```
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_violation_detection() {
        let err = Error::UnknownPollable {
            id: PollableId::new(3),
        };
        assert!(err.is_protocol_violation());
        assert!(!err.is_module_error());

        let err = Error::MemoryAccess {
            offset: 65_530,
            len: 8,
            size: 65_536,
        };
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_module_error_detection() {
        let err = Error::ModuleLoad {
            location: "missing.wasm".to_string(),
            source: "not found".into(),
        };
        assert!(err.is_module_error());
        assert!(!err.is_protocol_violation());

        let err = Error::MissingExport {
            name: "memory".to_string(),
        };
        assert!(err.is_module_error());
    }

    #[test]
    fn test_config_error_detection() {
        let err = Error::ConfigError {
            message: "Invalid configuration".to_string(),
        };
        assert!(err.is_config_error());
        assert!(!err.is_execution_error());
    }

    #[test]
    fn test_error_display() {
        let err = Error::UnknownPollable {
            id: PollableId::new(12),
        };
        assert_eq!(err.to_string(), "Unknown pollable id: 12");

        let err = Error::MemoryAccess {
            offset: 10,
            len: 4,
            size: 12,
        };
        let display = format!("{err}");
        assert!(display.contains("out of bounds"));
        assert!(display.contains("offset 10"));
    }

    #[test]
    fn test_module_load_keeps_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::ModuleLoad {
            location: "guest.wasm".to_string(),
            source: Box::new(io),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("guest.wasm"));
    }
}
