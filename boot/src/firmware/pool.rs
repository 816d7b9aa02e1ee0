use core::ptr::NonNull;

use uefi::table::boot::{BootServices, MemoryType};

use crate::blob::BlobPool;

/// Pool memory of one fixed type.
pub struct FirmwarePool<'a> {
    bt: &'a BootServices,
    memory_type: MemoryType,
}

impl<'a> FirmwarePool<'a> {
    /// For device tree blobs: kept across ExitBootServices, reclaimable by
    /// the OS once it has consumed the tables.
    pub fn blobs(bt: &'a BootServices) -> Self {
        Self { bt, memory_type: MemoryType::ACPI_RECLAIM }
    }

    /// For tables read by the OS at runtime (RT properties).
    pub fn runtime(bt: &'a BootServices) -> Self {
        Self { bt, memory_type: MemoryType::RUNTIME_SERVICES_DATA }
    }
}

impl BlobPool for FirmwarePool<'_> {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.bt
            .allocate_pool(self.memory_type, size)
            .ok()
            .and_then(NonNull::new)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, _size: usize) {
        let _ = self.bt.free_pool(ptr.as_ptr());
    }
}
