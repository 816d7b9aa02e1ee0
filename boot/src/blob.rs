//! blob.rs — device tree buffers in firmware pool memory
//!
//! A `DtBlob` exclusively owns one pool allocation. Every hand-off
//! (resolver → grower → publisher) is a move: the previous owner's buffer
//! is released exactly once, when its `DtBlob` is dropped, and publication
//! leaks the final buffer to the firmware on purpose (it must outlive us).

use core::fmt;
use core::ptr::{self, NonNull};
use core::slice;

use crate::error::{FdtError, LoaderError};
use crate::fdt::{self, Fdt};

/// Source of blob memory. On firmware this is `AllocatePool` with a memory
/// type that survives into the OS.
pub trait BlobPool {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// # Safety
    /// `ptr` must come from `allocate(size)` on this pool and must not have
    /// been released already.
    unsafe fn release(&self, ptr: NonNull<u8>, size: usize);
}

/// A device tree blob owned by this process.
///
/// Invariants: the buffer is fully initialized, `total_size <= capacity`,
/// and the first `total_size` bytes start with a valid FDT header.
pub struct DtBlob<'p, P: BlobPool + ?Sized> {
    pool: &'p P,
    ptr: NonNull<u8>,
    capacity: usize,
    total_size: usize,
}

/// A failed `grow`; the input blob comes back untouched.
pub struct GrowError<'p, P: BlobPool + ?Sized> {
    pub blob: DtBlob<'p, P>,
    pub error: LoaderError,
}

impl<'p, P: BlobPool + ?Sized> From<GrowError<'p, P>> for LoaderError {
    fn from(e: GrowError<'p, P>) -> Self {
        e.error
    }
}

impl<'p, P: BlobPool + ?Sized> fmt::Debug for GrowError<'p, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrowError").field("blob", &self.blob).field("error", &self.error).finish()
    }
}

impl<'p, P: BlobPool + ?Sized> DtBlob<'p, P> {
    /// Copy a blob read from disk into pool memory.
    ///
    /// The whole of `bytes` is kept (files may carry padding past
    /// `totalsize`), but only the declared size counts as content.
    pub fn from_bytes(pool: &'p P, bytes: &[u8]) -> Result<Self, LoaderError> {
        let total_size = Fdt::parse(bytes)?.total_size();
        let mut blob = Self::zeroed(pool, bytes.len())?;
        blob.bytes_mut().copy_from_slice(bytes);
        blob.total_size = total_size;
        Ok(blob)
    }

    fn zeroed(pool: &'p P, size: usize) -> Result<Self, LoaderError> {
        let ptr = pool.allocate(size).ok_or(LoaderError::OutOfMemory)?;
        // SAFETY: fresh allocation of `size` bytes.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Ok(Self { pool, ptr, capacity: size, total_size: 0 })
    }

    /// Self-declared size (the header's `totalsize`).
    #[inline]
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whole buffer, including any capacity past `total_size`.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: owned, initialized allocation of `capacity` bytes.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.capacity) }
    }

    /// The first `total_size` bytes.
    pub fn content(&self) -> &[u8] {
        &self.as_bytes()[..self.total_size]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusivity.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.capacity) }
    }

    pub fn fdt(&self) -> Result<Fdt<'_>, FdtError> {
        Fdt::parse(self.content())
    }

    /// Re-home the blob into a new buffer of `total_size + extra` bytes whose
    /// header declares that size.
    ///
    /// On success the old buffer is released. On failure nothing was
    /// mutated, and the caller gets the original blob back in the error.
    pub fn grow(self, extra: usize) -> Result<Self, GrowError<'p, P>> {
        let new_size = match self.total_size.checked_add(extra) {
            Some(n) if n <= u32::MAX as usize => n,
            _ => {
                let error = FdtError::NoSpace { need: usize::MAX, have: self.total_size }.into();
                return Err(GrowError { blob: self, error });
            }
        };

        let mut grown = match Self::zeroed(self.pool, new_size) {
            Ok(b) => b,
            Err(error) => return Err(GrowError { blob: self, error }),
        };

        if let Err(e) = fdt::open_into(self.content(), grown.bytes_mut()) {
            return Err(GrowError { blob: self, error: e.into() });
        }
        grown.total_size = new_size;
        Ok(grown)
    }

    /// Give up ownership without releasing the buffer. Returns its base and
    /// capacity; the memory now belongs to whoever the pointer is handed to.
    pub fn into_raw(self) -> (NonNull<u8>, usize) {
        let raw = (self.ptr, self.capacity);
        core::mem::forget(self);
        raw
    }
}

impl<'p, P: BlobPool + ?Sized> Drop for DtBlob<'p, P> {
    fn drop(&mut self) {
        // SAFETY: we own the allocation and it is released only here.
        unsafe { self.pool.release(self.ptr, self.capacity) }
    }
}

impl<'p, P: BlobPool + ?Sized> fmt::Debug for DtBlob<'p, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DtBlob")
            .field("ptr", &self.ptr)
            .field("capacity", &self.capacity)
            .field("total_size", &self.total_size)
            .finish()
    }
}
