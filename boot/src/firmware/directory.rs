//! directory.rs — the EFI system configuration table as a `TableDirectory`

use core::ptr::NonNull;

use uefi::table::{Boot, SystemTable};
use uefi::Guid;

use super::status_of;
use crate::error::LoaderError;
use crate::tables::{TableDirectory, TableId};

fn guid_of(id: TableId) -> Guid {
    Guid::from_bytes(id.guid_bytes())
}

/// Owns its own handle on the system table so it can be moved into the
/// ExitBootServices hook.
pub struct FirmwareDirectory {
    st: SystemTable<Boot>,
}

impl FirmwareDirectory {
    /// # Safety
    /// Must not be used once boot services are gone; the ExitBootServices
    /// notification itself still runs with them.
    pub unsafe fn new(st: &SystemTable<Boot>) -> Self {
        Self { st: st.unsafe_clone() }
    }
}

impl TableDirectory for FirmwareDirectory {
    fn install(&self, id: TableId, table: *const u8) -> Result<(), LoaderError> {
        // SAFETY: `table` is either null (removal) or memory that outlives
        // boot services, as every caller allocates it from a firmware pool.
        unsafe {
            self.st
                .boot_services()
                .install_configuration_table(&guid_of(id), table.cast())
        }
        .map_err(|e| LoaderError::Install { status: status_of(&e) })
    }

    fn lookup(&self, id: TableId) -> Option<NonNull<u8>> {
        let guid = guid_of(id);
        self.st
            .config_table()
            .iter()
            .find(|entry| entry.guid == guid)
            .and_then(|entry| NonNull::new(entry.address as *mut u8))
    }
}

