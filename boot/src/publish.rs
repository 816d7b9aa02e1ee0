//! publish.rs — hand the grown blob to the firmware
//!
//! Recording leaks the blob's buffer: from here on it belongs to the
//! configuration table, and through it to the OS loader.

use core::ptr::NonNull;
use core::slice;

use log::info;

use crate::blob::{BlobPool, DtBlob};
use crate::error::LoaderError;
use crate::fingerprint::Fingerprint;
use crate::tables::{TableDirectory, TableId};

/// What was published, as the arbiter will later compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedDescriptor {
    fingerprint: Fingerprint,
    total_size: usize,
    data: NonNull<u8>,
}

impl PublishedDescriptor {
    /// Fingerprint the blob's content and take its buffer over.
    pub fn record<P: BlobPool + ?Sized>(blob: DtBlob<'_, P>) -> Self {
        let total_size = blob.total_size();
        let fingerprint = Fingerprint(crate::fingerprint::crc32(blob.content()));
        let (data, _capacity) = blob.into_raw();
        Self { fingerprint, total_size, data }
    }

    /// Install the recorded buffer as the device tree table. A failure
    /// leaves the buffer and this record intact.
    pub fn install<D: TableDirectory + ?Sized>(&self, directory: &D) -> Result<(), LoaderError> {
        directory.install(TableId::DeviceTree, self.data.as_ptr())?;
        info!("published device tree: {} bytes, crc32 {}", self.total_size, self.fingerprint);
        Ok(())
    }

    #[inline]
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    #[inline]
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    #[inline]
    pub fn data(&self) -> NonNull<u8> {
        self.data
    }

    /// The published content.
    ///
    /// # Safety
    /// Only valid while boot services run and before anything else took the
    /// buffer over; the firmware, not us, owns it.
    pub unsafe fn content(&self) -> &[u8] {
        slice::from_raw_parts(self.data.as_ptr(), self.total_size)
    }
}

/// Record and install in one go. The descriptor comes back on install
/// failure too, so the caller can still report it.
pub fn publish<P, D>(
    blob: DtBlob<'_, P>,
    directory: &D,
) -> Result<PublishedDescriptor, (PublishedDescriptor, LoaderError)>
where
    P: BlobPool + ?Sized,
    D: TableDirectory + ?Sized,
{
    let descriptor = PublishedDescriptor::record(blob);
    match descriptor.install(directory) {
        Ok(()) => Ok(descriptor),
        Err(e) => Err((descriptor, e)),
    }
}
