//! Core types and errors for the wasi-shim runtime.
//!
//! This crate provides the foundational types shared by the runtime and the
//! command-line front end.
//!
//! # Architecture
//!
//! The core consists of:
//! - Strong domain types (`PollableId`, `ExitCode`)
//! - Error hierarchy with contextual information

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod error;
mod types;

pub use error::{Error, Result};
pub use types::{ExitCode, PollableId};
