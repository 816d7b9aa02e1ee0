//! tables.rs — configuration table identities and the directory they live in
//!
//! The firmware keeps one entry per GUID. Installing under an existing GUID
//! replaces the entry; installing a null pointer removes it.

use core::mem;
use core::ptr::{self, NonNull};

use bitflags::bitflags;
use uuid::{uuid, Uuid};
use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, Unaligned};

use crate::blob::BlobPool;
use crate::error::LoaderError;

/// Configuration table identities the loader reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TableId {
    DeviceTree,
    /// ACPI 1.0 RSDP.
    Acpi,
    /// ACPI 2.0+ RSDP.
    Acpi20,
    RtProperties,
    Smbios,
    Smbios3,
}

/// Both ACPI identities, in the order they are retracted.
pub const ACPI_TABLES: [TableId; 2] = [TableId::Acpi, TableId::Acpi20];

impl TableId {
    pub const fn guid(self) -> Uuid {
        match self {
            TableId::DeviceTree => uuid!("b1b621d5-f19c-41a5-830b-d9152c69aae0"),
            TableId::Acpi => uuid!("eb9d2d30-2d88-11d3-9a16-0090273fc14d"),
            TableId::Acpi20 => uuid!("8868e871-e4f1-11d3-bc22-0080c73c8881"),
            TableId::RtProperties => uuid!("eb66918a-7eef-402a-842e-931d21c38ae9"),
            TableId::Smbios => uuid!("eb9d2d31-2d88-11d3-9a16-0090273fc14d"),
            TableId::Smbios3 => uuid!("f2fd1544-9794-4a2c-992e-e5bbcf20e394"),
        }
    }

    /// `guid()` in EFI_GUID memory order (first three fields little-endian).
    pub fn guid_bytes(self) -> [u8; 16] {
        self.guid().to_bytes_le()
    }
}

/// The firmware's global configuration table directory.
pub trait TableDirectory {
    /// Install `table` under `id`, replacing any previous entry. A null
    /// `table` removes the entry.
    fn install(&self, id: TableId, table: *const u8) -> Result<(), LoaderError>;

    fn lookup(&self, id: TableId) -> Option<NonNull<u8>>;

    fn remove(&self, id: TableId) -> Result<(), LoaderError> {
        self.install(id, ptr::null())
    }
}

bitflags! {
    /// EFI_RT_PROPERTIES_TABLE.RuntimeServicesSupported
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RtServices: u32 {
        const GET_TIME = 0x0001;
        const SET_TIME = 0x0002;
        const GET_WAKEUP_TIME = 0x0004;
        const SET_WAKEUP_TIME = 0x0008;
        const GET_VARIABLE = 0x0010;
        const GET_NEXT_VARIABLE_NAME = 0x0020;
        const SET_VARIABLE = 0x0040;
        const SET_VIRTUAL_ADDRESS_MAP = 0x0080;
        const CONVERT_POINTER = 0x0100;
        const GET_NEXT_HIGH_MONOTONIC_COUNT = 0x0200;
        const RESET_SYSTEM = 0x0400;
        const UPDATE_CAPSULE = 0x0800;
        const QUERY_CAPSULE_CAPABILITIES = 0x1000;
        const QUERY_VARIABLE_INFO = 0x2000;
    }
}

/// EFI_RT_PROPERTIES_TABLE, version 1.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, AsBytes, Unaligned)]
pub struct RtPropertiesTable {
    pub version: U16<LittleEndian>,
    pub length: U16<LittleEndian>,
    pub runtime_services_supported: U32<LittleEndian>,
}

impl RtPropertiesTable {
    pub const VERSION: u16 = 1;

    pub fn new(supported: RtServices) -> Self {
        Self {
            version: U16::new(Self::VERSION),
            length: U16::new(mem::size_of::<Self>() as u16),
            runtime_services_supported: U32::new(supported.bits()),
        }
    }
}

/// Declare which runtime services the OS may use. `pool` must hand out
/// runtime-services memory: the table is read after ExitBootServices.
pub fn install_rt_properties<D, P>(
    directory: &D,
    pool: &P,
    supported: RtServices,
) -> Result<(), LoaderError>
where
    D: TableDirectory + ?Sized,
    P: BlobPool + ?Sized,
{
    let table = RtPropertiesTable::new(supported);
    let bytes = table.as_bytes();
    let ptr = pool.allocate(bytes.len()).ok_or(LoaderError::OutOfMemory)?;
    // SAFETY: fresh allocation of `bytes.len()` bytes.
    unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) };

    if let Err(e) = directory.install(TableId::RtProperties, ptr.as_ptr()) {
        // SAFETY: never handed out.
        unsafe { pool.release(ptr, bytes.len()) };
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingPool, MemoryDirectory};
    use core::slice;

    #[test]
    fn rt_properties_layout() {
        let table = RtPropertiesTable::new(RtServices::empty());
        assert_eq!(table.as_bytes(), &[1, 0, 8, 0, 0, 0, 0, 0]);
        let table = RtPropertiesTable::new(RtServices::GET_TIME | RtServices::RESET_SYSTEM);
        assert_eq!(table.runtime_services_supported.get(), 0x0401);
    }

    #[test]
    fn rt_properties_installed_in_pool_memory() {
        let pool = CountingPool::new();
        let dir = MemoryDirectory::new();
        install_rt_properties(&dir, &pool, RtServices::empty()).unwrap();

        let ptr = dir.lookup(TableId::RtProperties).unwrap();
        let bytes = unsafe { slice::from_raw_parts(ptr.as_ptr(), 8) };
        assert_eq!(bytes, &[1, 0, 8, 0, 0, 0, 0, 0]);
        assert_eq!(pool.live(), 1);
    }

    #[test]
    fn rt_properties_released_when_install_fails() {
        let pool = CountingPool::new();
        let dir = MemoryDirectory::new();
        dir.fail_installs_of(TableId::RtProperties);
        assert!(matches!(
            install_rt_properties(&dir, &pool, RtServices::empty()),
            Err(LoaderError::Install { .. })
        ));
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn null_install_removes() {
        let dir = MemoryDirectory::new();
        let acpi = [0u8; 4];
        dir.install(TableId::Acpi, acpi.as_ptr()).unwrap();
        assert!(dir.lookup(TableId::Acpi).is_some());
        dir.remove(TableId::Acpi).unwrap();
        assert!(dir.lookup(TableId::Acpi).is_none());
    }

    #[test]
    fn guid_bytes_follow_efi_layout() {
        assert_eq!(
            TableId::DeviceTree.guid_bytes(),
            [0xd5, 0x21, 0xb6, 0xb1, 0x9c, 0xf1, 0xa5, 0x41, 0x83, 0x0b, 0xd9, 0x15, 0x2c, 0x69, 0xaa, 0xe0]
        );
        assert_eq!(
            TableId::Acpi20.guid_bytes(),
            [0x71, 0xe8, 0x68, 0x88, 0xf1, 0xe4, 0xd3, 0x11, 0xbc, 0x22, 0x00, 0x80, 0xc7, 0x3c, 0x88, 0x81]
        );
    }

    #[test]
    fn guids_are_distinct() {
        let ids = [
            TableId::DeviceTree,
            TableId::Acpi,
            TableId::Acpi20,
            TableId::RtProperties,
            TableId::Smbios,
            TableId::Smbios3,
        ];
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a.guid(), b.guid());
            }
        }
    }
}
