//! Typed access to guest linear memory.
//!
//! The guest owns a single growable buffer. Bridges never keep a reference
//! to it across calls: every access borrows a fresh [`GuestView`] or
//! [`GuestViewMut`] from the `wasmtime::Memory` handle, because `memory.grow`
//! may move the buffer and invalidate older slices.
//!
//! All multi-byte values are little-endian. Every pointer/length pair is
//! bounds-checked; an out-of-range access yields [`Error::MemoryAccess`].
//!
//! # Examples
//!
//! ```
//! use shim_runtime::memory::{GuestView, IoVec};
//!
//! let mut data = vec![0u8; 32];
//! data[0..4].copy_from_slice(&16u32.to_le_bytes());
//! data[4..8].copy_from_slice(&2u32.to_le_bytes());
//! data[16..18].copy_from_slice(b"hi");
//!
//! let view = GuestView::new(&data);
//! let iovs = view.read_iovecs(0, 1).unwrap();
//! assert_eq!(iovs, vec![IoVec { offset: 16, len: 2 }]);
//! assert_eq!(view.iovec_bytes(iovs[0]).unwrap(), b"hi");
//! ```

use shim_core::{Error, PollableId, Result};
use wasmtime::{Caller, Extern, Memory};

/// Size of one `{offset: u32, length: u32}` iovec entry.
pub const IOVEC_SIZE: u32 = 8;

/// Size of the `{ready: u32, index: u32}` poll result.
pub const POLL_RESULT_SIZE: usize = 8;

/// One contiguous byte range in guest memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoVec {
    /// Start offset in linear memory
    pub offset: u32,
    /// Number of bytes
    pub len: u32,
}

/// Read-only view over guest memory for the duration of one access.
#[derive(Debug, Clone, Copy)]
pub struct GuestView<'a> {
    data: &'a [u8],
}

impl<'a> GuestView<'a> {
    /// Wraps a borrowed slice of linear memory.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Current size of linear memory in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the guest has no memory pages.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrows `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the range is out of bounds.
    pub fn bytes(&self, offset: u32, len: u32) -> Result<&'a [u8]> {
        let data = self.data;
        let range = checked_range(data.len(), offset as usize, len as usize)?;
        Ok(&data[range])
    }

    /// Reads a little-endian `u32` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the word is out of bounds.
    pub fn read_u32(&self, offset: u32) -> Result<u32> {
        let bytes = self.bytes(offset, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads `count` consecutive little-endian `u32` words at `ptr`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the array is out of bounds.
    pub fn read_u32_array(&self, ptr: u32, count: u32) -> Result<Vec<u32>> {
        let byte_len = byte_len(ptr, count, 4, self.data.len())?;
        let bytes = self.bytes(ptr, byte_len)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect())
    }

    /// Reads `count` pollable ids stored as `u32` at `ptr`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the id array is out of bounds.
    pub fn read_pollable_ids(&self, ptr: u32, count: u32) -> Result<Vec<PollableId>> {
        Ok(self
            .read_u32_array(ptr, count)?
            .into_iter()
            .map(PollableId::new)
            .collect())
    }

    /// Decodes `count` iovec entries of [`IOVEC_SIZE`] bytes each at `ptr`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the iovec array is out of bounds.
    /// The referenced ranges themselves are checked by [`Self::iovec_bytes`].
    pub fn read_iovecs(&self, ptr: u32, count: u32) -> Result<Vec<IoVec>> {
        let byte_len = byte_len(ptr, count, IOVEC_SIZE, self.data.len())?;
        let bytes = self.bytes(ptr, byte_len)?;
        Ok(bytes
            .chunks_exact(IOVEC_SIZE as usize)
            .map(|entry| IoVec {
                offset: u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]),
                len: u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]),
            })
            .collect())
    }

    /// Borrows the bytes an iovec points at.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the range is out of bounds.
    pub fn iovec_bytes(&self, iov: IoVec) -> Result<&'a [u8]> {
        self.bytes(iov.offset, iov.len)
    }
}

/// Mutable view over guest memory for the duration of one access.
#[derive(Debug)]
pub struct GuestViewMut<'a> {
    data: &'a mut [u8],
}

impl<'a> GuestViewMut<'a> {
    /// Wraps a mutably borrowed slice of linear memory.
    #[must_use]
    pub const fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    /// Writes a little-endian `u32` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the word is out of bounds.
    pub fn write_u32(&mut self, offset: u32, value: u32) -> Result<()> {
        let range = checked_range(self.data.len(), offset as usize, 4)?;
        self.data[range].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Writes the `{ready, index}` poll result at `out_ptr`.
    ///
    /// Both words are checked before either is written, so a failed call
    /// leaves guest memory untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the struct is out of bounds.
    pub fn write_poll_result(&mut self, out_ptr: u32, ready: bool, id: PollableId) -> Result<()> {
        checked_range(self.data.len(), out_ptr as usize, POLL_RESULT_SIZE)?;
        self.write_u32(out_ptr, u32::from(ready))?;
        self.write_u32(out_ptr + 4, id.as_u32())
    }
}

/// Looks up the guest's exported linear memory.
///
/// # Errors
///
/// Returns [`Error::MissingExport`] if the guest has no memory export named
/// `name`.
pub fn exported_memory<T>(caller: &mut Caller<'_, T>, name: &str) -> Result<Memory> {
    caller
        .get_export(name)
        .and_then(Extern::into_memory)
        .ok_or_else(|| Error::MissingExport {
            name: name.to_string(),
        })
}

fn checked_range(size: usize, offset: usize, len: usize) -> Result<std::ops::Range<usize>> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(offset..end),
        _ => Err(Error::MemoryAccess { offset, len, size }),
    }
}

fn byte_len(ptr: u32, count: u32, elem: u32, size: usize) -> Result<u32> {
    count.checked_mul(elem).ok_or(Error::MemoryAccess {
        offset: ptr as usize,
        len: usize::MAX,
        size,
    })
}
