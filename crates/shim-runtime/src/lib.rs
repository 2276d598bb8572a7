//! Host runtime for WASI guests that drive their own event loop.
//!
//! The guest imports a small host surface (poll, monotonic-clock timers,
//! `fd_write`, `proc_exit` and a numeric `console.log`). Asynchronous waits
//! are turned into pollables; a completed `poll` re-enters the guest through
//! its resumption export.

#![warn(missing_docs, missing_debug_implementations)]

pub mod bridges;
pub mod config;
pub mod host;
pub mod loader;
pub mod memory;
pub mod pollable;
pub mod runtime;
pub mod stats;

pub use runtime::Runtime;
