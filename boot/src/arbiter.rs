//! arbiter.rs — DT vs ACPI, decided once at ExitBootServices
//!
//! A device-tree aware OS loader patches the published blob in place
//! (chosen node, bootargs, initrd). If the blob still fingerprints as
//! published when boot services end, nobody used it and ACPI stays. If it
//! changed, the OS is booting with the device tree and must not see ACPI
//! as well, so both ACPI tables are retracted.
//!
//! The hook runs after the firmware has started tearing down boot
//! services: nothing here allocates or logs.

use core::slice;

use crate::error::LoaderError;
use crate::fdt::{FdtHeader, HEADER_SIZE};
use crate::fingerprint::Fingerprint;
use crate::publish::PublishedDescriptor;
use crate::tables::{TableDirectory, TableId, ACPI_TABLES};

/// Outcome of the exit-time check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No device tree entry at exit; nothing was touched.
    TableMissing,
    /// Device tree untouched since publication; ACPI kept.
    KeepAcpi,
    /// Device tree rewritten; ACPI tables removed.
    RetractAcpi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterState {
    Armed,
    Decided(Decision),
}

/// Owns what was published and the directory to act on.
#[derive(Debug)]
pub struct Arbiter<D: TableDirectory> {
    descriptor: PublishedDescriptor,
    directory: D,
    state: ArbiterState,
}

impl<D: TableDirectory> Arbiter<D> {
    pub fn arm(descriptor: PublishedDescriptor, directory: D) -> Self {
        Self { descriptor, directory, state: ArbiterState::Armed }
    }

    #[inline]
    pub fn state(&self) -> ArbiterState {
        self.state
    }

    #[inline]
    pub fn descriptor(&self) -> &PublishedDescriptor {
        &self.descriptor
    }

    /// Run the decision. Returns `None` if it was already taken; a second
    /// delivery never touches the directory.
    pub fn on_exit_boot_services(&mut self) -> Option<Decision> {
        if let ArbiterState::Decided(_) = self.state {
            return None;
        }

        let decision = match self.directory.lookup(TableId::DeviceTree) {
            None => Decision::TableMissing,
            Some(table) => {
                // SAFETY: the directory hands out the address of a live
                // configuration table, read no further than its header and
                // then its own declared size.
                if unsafe { self.unchanged(table.as_ptr()) } {
                    Decision::KeepAcpi
                } else {
                    for id in ACPI_TABLES {
                        // Too late to report anything; the other table is
                        // still removed.
                        let _ = self.directory.remove(id);
                    }
                    Decision::RetractAcpi
                }
            }
        };

        self.state = ArbiterState::Decided(decision);
        Some(decision)
    }

    /// Does the table at `table` still hold exactly what was published?
    /// A bad header or a different declared size counts as a change.
    unsafe fn unchanged(&self, table: *const u8) -> bool {
        let header = match FdtHeader::read(slice::from_raw_parts(table, HEADER_SIZE)) {
            Ok(h) => h,
            Err(_) => return false,
        };
        let size = self.descriptor.total_size();
        if header.total_size() != size {
            return false;
        }
        let content = slice::from_raw_parts(table, size);
        Fingerprint::over(content, size) == Some(self.descriptor.fingerprint())
    }
}

/// Source of the one ExitBootServices notification.
pub trait ExitBootServicesEvents<D: TableDirectory> {
    /// Hand the arbiter over to be run when boot services end. Only one
    /// arbiter may be registered per boot.
    fn register(&mut self, arbiter: Arbiter<D>) -> Result<(), LoaderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::DtBlob;
    use crate::publish::publish;
    use crate::testing::{CountingPool, FdtBuilder, ManualEvents, MemoryDirectory};
    use pretty_assertions::assert_eq;

    const ACPI: [u8; 8] = *b"RSD PTR ";
    const ACPI20: [u8; 8] = *b"RSD PTR2";

    /// Directory with both ACPI tables and a freshly published device tree.
    fn published(pool: &CountingPool) -> (MemoryDirectory, PublishedDescriptor) {
        let dir = MemoryDirectory::new();
        dir.install(TableId::Acpi, ACPI.as_ptr()).unwrap();
        dir.install(TableId::Acpi20, ACPI20.as_ptr()).unwrap();
        let blob = DtBlob::from_bytes(pool, &FdtBuilder::new().build())
            .unwrap()
            .grow(0x400)
            .unwrap();
        let descriptor = publish(blob, &dir).unwrap();
        (dir, descriptor)
    }

    fn poke(descriptor: &PublishedDescriptor, offset: usize, value: u8) {
        unsafe { *descriptor.data().as_ptr().add(offset) = value };
    }

    #[test]
    fn untouched_blob_keeps_acpi() {
        let pool = CountingPool::new();
        let (dir, descriptor) = published(&pool);
        let mut arbiter = Arbiter::arm(descriptor, dir.clone());
        assert_eq!(arbiter.state(), ArbiterState::Armed);

        assert_eq!(arbiter.on_exit_boot_services(), Some(Decision::KeepAcpi));
        assert_eq!(arbiter.state(), ArbiterState::Decided(Decision::KeepAcpi));
        assert!(dir.lookup(TableId::Acpi).is_some());
        assert!(dir.lookup(TableId::Acpi20).is_some());
        assert_eq!(dir.lookup(TableId::DeviceTree), Some(descriptor.data()));
    }

    #[test]
    fn rewritten_blob_retracts_both_acpi_tables() {
        let pool = CountingPool::new();
        let (dir, descriptor) = published(&pool);
        // Somewhere inside the strings block, as a property edit would.
        poke(&descriptor, descriptor.total_size() - 0x400 - 2, b'X');

        let mut arbiter = Arbiter::arm(descriptor, dir.clone());
        assert_eq!(arbiter.on_exit_boot_services(), Some(Decision::RetractAcpi));
        assert_eq!(dir.lookup(TableId::Acpi), None);
        assert_eq!(dir.lookup(TableId::Acpi20), None);
        assert_eq!(dir.lookup(TableId::DeviceTree), Some(descriptor.data()));
    }

    #[test]
    fn header_field_edit_counts_as_rewritten() {
        let pool = CountingPool::new();
        let (dir, descriptor) = published(&pool);
        // boot_cpuid_phys
        poke(&descriptor, 28, 0x01);
        let mut arbiter = Arbiter::arm(descriptor, dir.clone());
        assert_eq!(arbiter.on_exit_boot_services(), Some(Decision::RetractAcpi));
    }

    #[test]
    fn second_delivery_is_ignored() {
        let pool = CountingPool::new();
        let (dir, descriptor) = published(&pool);
        let mut arbiter = Arbiter::arm(descriptor, dir.clone());
        assert_eq!(arbiter.on_exit_boot_services(), Some(Decision::KeepAcpi));

        // A rewrite after the decision must not be acted on.
        poke(&descriptor, 60, 0xAA);
        let installs = dir.installs();
        assert_eq!(arbiter.on_exit_boot_services(), None);
        assert_eq!(dir.installs(), installs);
        assert!(dir.lookup(TableId::Acpi).is_some());
        assert_eq!(arbiter.state(), ArbiterState::Decided(Decision::KeepAcpi));
    }

    #[test]
    fn missing_table_is_a_no_op() {
        let pool = CountingPool::new();
        let (dir, descriptor) = published(&pool);
        dir.remove(TableId::DeviceTree).unwrap();
        let installs = dir.installs();

        let mut arbiter = Arbiter::arm(descriptor, dir.clone());
        assert_eq!(arbiter.on_exit_boot_services(), Some(Decision::TableMissing));
        assert_eq!(dir.installs(), installs);
        assert!(dir.lookup(TableId::Acpi).is_some());
    }

    #[test]
    fn replaced_table_with_other_size_counts_as_rewritten() {
        let pool = CountingPool::new();
        let (dir, descriptor) = published(&pool);
        let other = FdtBuilder::new().model("replacement").build();
        dir.install(TableId::DeviceTree, other.as_ptr()).unwrap();

        let mut arbiter = Arbiter::arm(descriptor, dir.clone());
        assert_eq!(arbiter.on_exit_boot_services(), Some(Decision::RetractAcpi));
        assert_eq!(dir.lookup(TableId::Acpi), None);
    }

    #[test]
    fn clobbered_header_counts_as_rewritten() {
        let pool = CountingPool::new();
        let (dir, descriptor) = published(&pool);
        poke(&descriptor, 0, 0);

        let mut arbiter = Arbiter::arm(descriptor, dir.clone());
        assert_eq!(arbiter.on_exit_boot_services(), Some(Decision::RetractAcpi));
    }

    #[test]
    fn acpi_removal_failure_still_decides() {
        let pool = CountingPool::new();
        let (dir, descriptor) = published(&pool);
        dir.fail_installs_of(TableId::Acpi);
        poke(&descriptor, 60, 0xAA);

        let mut arbiter = Arbiter::arm(descriptor, dir.clone());
        assert_eq!(arbiter.on_exit_boot_services(), Some(Decision::RetractAcpi));
        assert!(dir.lookup(TableId::Acpi).is_some());
        assert_eq!(dir.lookup(TableId::Acpi20), None);
    }

    #[test]
    fn registered_arbiter_runs_on_event() {
        let pool = CountingPool::new();
        let (dir, descriptor) = published(&pool);
        let mut events = ManualEvents::new();
        events.register(Arbiter::arm(descriptor, dir.clone())).unwrap();

        poke(&descriptor, 60, 0xAA);
        assert_eq!(events.fire(), Some(Decision::RetractAcpi));
        assert_eq!(events.fire(), None);
        assert_eq!(dir.lookup(TableId::Acpi20), None);
    }

    #[test]
    fn only_one_registration() {
        let pool = CountingPool::new();
        let (dir, descriptor) = published(&pool);
        let mut events = ManualEvents::new();
        events.register(Arbiter::arm(descriptor, dir.clone())).unwrap();
        assert_eq!(
            events.register(Arbiter::arm(descriptor, dir.clone())).unwrap_err(),
            LoaderError::AlreadyRegistered
        );
    }
}
