//! `fd_write`: vectored writes to host stdout.
//!
//! Only descriptor 1 produces output; any other descriptor returns success
//! and leaves guest memory alone, `nwritten` included. Each iovec is decoded as UTF-8 on its
//! own (invalid sequences become U+FFFD, as a non-fatal text decoder does),
//! the chunks are joined in order and written in one go. The byte count
//! reported back to the guest is the sum of the iovec lengths, not the
//! number of characters produced.

use crate::host::HostState;
use crate::memory::{GuestView, GuestViewMut, exported_memory};
use shim_core::{Error, Result};
use std::io::Write;
use wasmtime::{Caller, Linker};

/// Import namespace of `fd_write`.
pub const NAMESPACE: &str = "wasi_snapshot_preview1";

/// Descriptor that reaches host stdout.
pub const STDOUT_FD: i32 = 1;

/// WASI `errno` for success.
pub const ERRNO_SUCCESS: i32 = 0;

/// Text gathered from a list of iovecs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gathered {
    /// Decoded text, chunks concatenated in iovec order
    pub text: String,
    /// Total bytes referenced by the iovecs
    pub bytes: u32,
}

/// Decodes `iovs_len` iovecs at `iovs_ptr`.
///
/// # Errors
///
/// Returns [`Error::MemoryAccess`] if the iovec array or any referenced
/// range is out of bounds.
///
/// # Examples
///
/// ```
/// use shim_runtime::bridges::stdio::gather;
/// use shim_runtime::memory::GuestView;
///
/// let mut data = vec![0u8; 24];
/// data[0..4].copy_from_slice(&16u32.to_le_bytes());
/// data[4..8].copy_from_slice(&3u32.to_le_bytes());
/// data[16..19].copy_from_slice(b"abc");
///
/// let gathered = gather(&GuestView::new(&data), 0, 1).unwrap();
/// assert_eq!(gathered.text, "abc");
/// assert_eq!(gathered.bytes, 3);
/// ```
pub fn gather(view: &GuestView<'_>, iovs_ptr: u32, iovs_len: u32) -> Result<Gathered> {
    let mut text = String::new();
    let mut bytes: u32 = 0;
    for iov in view.read_iovecs(iovs_ptr, iovs_len)? {
        let chunk = view.iovec_bytes(iov)?;
        text.push_str(&String::from_utf8_lossy(chunk));
        bytes = bytes.saturating_add(iov.len);
    }
    Ok(Gathered { text, bytes })
}

/// Handles an `fd_write` call from the guest and returns the `errno`.
///
/// # Errors
///
/// Fails on out-of-bounds pointers or a missing memory export. Host stdout
/// errors are logged, not reported to the guest.
pub fn fd_write(
    caller: &mut Caller<'_, HostState>,
    fd: i32,
    iovs_ptr: u32,
    iovs_len: u32,
    nwritten_ptr: u32,
) -> Result<i32> {
    // Other descriptors succeed without reading or writing guest memory.
    if fd != STDOUT_FD {
        tracing::debug!("fd_write to fd {} ignored", fd);
        return Ok(ERRNO_SUCCESS);
    }

    let memory_name = caller.data().exports.memory.clone();
    let memory = exported_memory(caller, &memory_name)?;

    let gathered = gather(&GuestView::new(memory.data(&*caller)), iovs_ptr, iovs_len)?;
    tracing::debug!("fd_write({} iovecs, {} bytes)", iovs_len, gathered.bytes);

    let host = caller.data_mut();
    if let Err(e) = host
        .stdout
        .write_all(gathered.text.as_bytes())
        .and_then(|()| host.stdout.flush())
    {
        tracing::warn!("Failed to write guest output: {}", e);
    }
    host.stats.bytes_written += u64::from(gathered.bytes);

    GuestViewMut::new(memory.data_mut(&mut *caller)).write_u32(nwritten_ptr, gathered.bytes)?;
    Ok(ERRNO_SUCCESS)
}

pub(crate) fn link(linker: &mut Linker<HostState>) -> Result<()> {
    linker
        .func_wrap(
            NAMESPACE,
            "fd_write",
            |mut caller: Caller<'_, HostState>,
             fd: i32,
             iovs_ptr: i32,
             iovs_len: i32,
             nwritten_ptr: i32|
             -> wasmtime::Result<i32> {
                Ok(fd_write(
                    &mut caller,
                    fd,
                    iovs_ptr.cast_unsigned(),
                    iovs_len.cast_unsigned(),
                    nwritten_ptr.cast_unsigned(),
                )?)
            },
        )
        .map_err(|e| Error::WasmError {
            message: format!("Failed to link fd_write: {e}"),
        })?;
    Ok(())
}
