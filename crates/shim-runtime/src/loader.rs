//! Module loading.
//!
//! A module is located either by a filesystem path or by an `http(s)` URL.
//! When no location is given, the configured fallback URL is used.

use crate::config::RuntimeConfig;
use shim_core::{Error, Result};
use std::fmt;
use std::path::PathBuf;

/// Where module bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// Local file
    Path(PathBuf),
    /// Remote module fetched over HTTP(S)
    Url(String),
}

impl ModuleSource {
    /// Classifies a location string.
    ///
    /// # Examples
    ///
    /// ```
    /// use shim_runtime::loader::ModuleSource;
    ///
    /// assert!(matches!(ModuleSource::parse("https://example.com/a.wasm"), ModuleSource::Url(_)));
    /// assert!(matches!(ModuleSource::parse("./guest.wasm"), ModuleSource::Path(_)));
    /// ```
    #[must_use]
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Self::Url(location.to_string())
        } else {
            Self::Path(PathBuf::from(location))
        }
    }

    /// Picks the module location from an explicit argument or the config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if neither is set.
    pub fn resolve(location: Option<&str>, config: &RuntimeConfig) -> Result<Self> {
        location
            .or_else(|| config.fallback_url())
            .map(Self::parse)
            .ok_or_else(|| {
                Error::InvalidArgument(
                    "no module given and no fallback_url configured".to_string(),
                )
            })
    }

    /// Reads the module bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleLoad`] on I/O failures, transport errors and
    /// non-success HTTP statuses.
    pub async fn load(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            Self::Path(path) => tokio::fs::read(path).await.map_err(|e| self.load_error(e))?,
            Self::Url(url) => fetch(url).await.map_err(|e| self.load_error(e))?,
        };
        tracing::info!("Loaded module from {} ({} bytes)", self, bytes.len());
        Ok(bytes)
    }

    fn load_error(&self, source: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::ModuleLoad {
            location: self.to_string(),
            source: Box::new(source),
        }
    }
}

impl fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

async fn fetch(url: &str) -> reqwest::Result<Vec<u8>> {
    tracing::debug!("Fetching module from {}", url);
    let response = reqwest::get(url).await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}
