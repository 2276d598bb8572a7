//! Host implementations of the guest imports.
//!
//! | Namespace                            | Name                 | Signature              |
//! |--------------------------------------|----------------------|------------------------|
//! | `wasi:io/poll@0.2.1`                 | `poll`               | `(i32, i32, i32) -> ()`|
//! | `wasi:clocks/monotonic-clock@0.2.1`  | `subscribe-duration` | `(i64) -> i32`         |
//! | `wasi_snapshot_preview1`             | `fd_write`           | `(i32 x4) -> i32`      |
//! | `wasi_snapshot_preview1`             | `proc_exit`          | `(i32) -> ()`          |
//! | `console`                            | `log`                | `(f64) -> ()`          |
//!
//! Every bridge exposes a plain function with the logic and a crate-private
//! `link` that registers it on the [`Linker`].

pub mod clock;
pub mod exit;
pub mod log;
pub mod poll;
pub mod stdio;

use crate::host::HostState;
use shim_core::Result;
use wasmtime::Linker;

/// Registers every host import on `linker`.
pub(crate) fn link_imports(linker: &mut Linker<HostState>) -> Result<()> {
    poll::link(linker)?;
    clock::link(linker)?;
    stdio::link(linker)?;
    exit::link(linker)?;
    log::link(linker)?;
    tracing::debug!("Host imports linked");
    Ok(())
}
