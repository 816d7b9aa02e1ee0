//! testing.rs — host doubles for the firmware-facing traits

use std::alloc::{self, Layout};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::ptr::NonNull;
use std::rc::Rc;

use uuid::Uuid;

use crate::arbiter::{Arbiter, Decision, ExitBootServicesEvents};
use crate::blob::BlobPool;
use crate::chid::ChidKind;
use crate::error::LoaderError;
use crate::fdt::FDT_MAGIC;
use crate::resolver::{FileLookup, HardwareIds};
use crate::tables::{TableDirectory, TableId};

const EFI_ERROR: usize = 1 << (usize::BITS - 1);
pub const EFI_NOT_FOUND: usize = EFI_ERROR | 14;
pub const EFI_OUT_OF_RESOURCES: usize = EFI_ERROR | 9;

/* ---------- pool ---------- */

/// Heap-backed pool that counts what goes in and out.
#[derive(Debug, Default)]
pub struct CountingPool {
    allocations: Cell<usize>,
    releases: Cell<usize>,
    failing: Cell<bool>,
    budget: Cell<Option<usize>>,
}

impl CountingPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    pub fn releases(&self) -> usize {
        self.releases.get()
    }

    pub fn live(&self) -> usize {
        self.allocations() - self.releases()
    }

    pub fn fail_next_allocations(&self, fail: bool) {
        self.failing.set(fail);
    }

    /// Allow `n` more allocations, then fail.
    pub fn fail_after(&self, n: usize) {
        self.budget.set(Some(n));
    }

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size.max(1), 8).unwrap()
    }
}

impl BlobPool for CountingPool {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if self.failing.get() {
            return None;
        }
        match self.budget.get() {
            Some(0) => return None,
            Some(n) => self.budget.set(Some(n - 1)),
            None => {}
        }
        let ptr = NonNull::new(unsafe { alloc::alloc_zeroed(Self::layout(size)) })?;
        self.allocations.set(self.allocations.get() + 1);
        Some(ptr)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) {
        self.releases.set(self.releases.get() + 1);
        alloc::dealloc(ptr.as_ptr(), Self::layout(size));
    }
}

/* ---------- configuration table directory ---------- */

#[derive(Debug, Default)]
struct DirectoryState {
    tables: BTreeMap<TableId, usize>,
    failing: Vec<TableId>,
    installs: usize,
}

/// In-memory table directory. Clones share state, so a test can keep a
/// handle while the arbiter owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory(Rc<RefCell<DirectoryState>>);

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every install (or removal) of `id` fails from now on.
    pub fn fail_installs_of(&self, id: TableId) {
        self.0.borrow_mut().failing.push(id);
    }

    /// Successful installs and removals so far.
    pub fn installs(&self) -> usize {
        self.0.borrow().installs
    }

    pub fn entries(&self) -> usize {
        self.0.borrow().tables.len()
    }
}

impl TableDirectory for MemoryDirectory {
    fn install(&self, id: TableId, table: *const u8) -> Result<(), LoaderError> {
        let mut state = self.0.borrow_mut();
        if state.failing.contains(&id) {
            return Err(LoaderError::Install { status: EFI_OUT_OF_RESOURCES });
        }
        if table.is_null() {
            if state.tables.remove(&id).is_none() {
                return Err(LoaderError::Install { status: EFI_NOT_FOUND });
            }
        } else {
            state.tables.insert(id, table as usize);
        }
        state.installs += 1;
        Ok(())
    }

    fn lookup(&self, id: TableId) -> Option<NonNull<u8>> {
        let address = *self.0.borrow().tables.get(&id)?;
        NonNull::new(address as *mut u8)
    }
}

/* ---------- volume ---------- */

#[derive(Debug, Default)]
pub struct MemoryVolume {
    files: HashMap<String, Vec<u8>>,
    reads: Vec<String>,
}

impl MemoryVolume {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, bytes: Vec<u8>) {
        self.files.insert(path.into(), bytes);
    }

    /// Every path asked for, in order, hits and misses alike.
    pub fn reads(&self) -> &[String] {
        &self.reads
    }
}

impl FileLookup for MemoryVolume {
    fn read(&mut self, path: &str) -> Result<Vec<u8>, LoaderError> {
        self.reads.push(path.into());
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| LoaderError::Io { path: path.into(), status: EFI_NOT_FOUND })
    }
}

/* ---------- hardware ids ---------- */

#[derive(Debug, Default)]
pub struct FixedIds(BTreeMap<ChidKind, Uuid>);

impl FixedIds {
    pub fn new(ids: impl IntoIterator<Item = (ChidKind, Uuid)>) -> Self {
        Self(ids.into_iter().collect())
    }
}

impl HardwareIds for FixedIds {
    fn hardware_id(&self, kind: ChidKind) -> Option<Uuid> {
        self.0.get(&kind).copied()
    }
}

/* ---------- exit-boot-services ---------- */

/// Event source fired by hand, as often as a test likes.
#[derive(Debug)]
pub struct ManualEvents<D: TableDirectory> {
    arbiter: Option<Arbiter<D>>,
}

impl<D: TableDirectory> ManualEvents<D> {
    pub fn new() -> Self {
        Self { arbiter: None }
    }

    pub fn is_registered(&self) -> bool {
        self.arbiter.is_some()
    }

    pub fn fire(&mut self) -> Option<Decision> {
        self.arbiter.as_mut()?.on_exit_boot_services()
    }
}

impl<D: TableDirectory> ExitBootServicesEvents<D> for ManualEvents<D> {
    fn register(&mut self, arbiter: Arbiter<D>) -> Result<(), LoaderError> {
        if self.arbiter.is_some() {
            return Err(LoaderError::AlreadyRegistered);
        }
        self.arbiter = Some(arbiter);
        Ok(())
    }
}

/// Event source whose registration always fails with `status`.
#[derive(Debug)]
pub struct RefusingEvents {
    status: usize,
    attempts: usize,
}

impl RefusingEvents {
    pub fn new(status: usize) -> Self {
        Self { status, attempts: 0 }
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

impl<D: TableDirectory> ExitBootServicesEvents<D> for RefusingEvents {
    fn register(&mut self, _arbiter: Arbiter<D>) -> Result<(), LoaderError> {
        self.attempts += 1;
        Err(LoaderError::Firmware { status: self.status })
    }
}

/* ---------- blobs ---------- */

const FDT_BEGIN_NODE: u32 = 0x1;
const FDT_END_NODE: u32 = 0x2;
const FDT_PROP: u32 = 0x3;
const FDT_END: u32 = 0x9;

const STRINGS: &[u8] = b"compatible\0model\0";
const NAMEOFF_COMPATIBLE: u32 = 0;
const NAMEOFF_MODEL: u32 = 11;

/// Minimal well-formed FDT: `/` with `compatible` and `model`, an empty
/// `/chosen`, and one reserve map entry.
#[derive(Debug, Clone)]
pub struct FdtBuilder {
    version: u32,
    strings_first: bool,
    model: String,
}

impl FdtBuilder {
    pub fn new() -> Self {
        Self { version: 17, strings_first: false, model: "Acme Board".into() }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Place the strings block before the structure block.
    pub fn strings_first(mut self) -> Self {
        self.strings_first = true;
        self
    }

    pub fn model(mut self, model: &str) -> Self {
        self.model = model.into();
        self
    }

    fn structure(&self) -> Vec<u8> {
        let mut s = Vec::new();
        token(&mut s, FDT_BEGIN_NODE);
        padded(&mut s, b"\0");
        prop(&mut s, NAMEOFF_COMPATIBLE, b"acme,board\0");
        let mut model = self.model.clone().into_bytes();
        model.push(0);
        prop(&mut s, NAMEOFF_MODEL, &model);
        token(&mut s, FDT_BEGIN_NODE);
        padded(&mut s, b"chosen\0");
        token(&mut s, FDT_END_NODE);
        token(&mut s, FDT_END_NODE);
        token(&mut s, FDT_END);
        s
    }

    pub fn build(&self) -> Vec<u8> {
        let mut rsv = Vec::new();
        rsv.extend_from_slice(&0x8000_0000u64.to_be_bytes());
        rsv.extend_from_slice(&0x1000u64.to_be_bytes());
        rsv.extend_from_slice(&[0u8; 16]);
        let structure = self.structure();

        let off_rsv = 40;
        let (off_struct, off_strings, total) = if self.strings_first {
            let off_strings = off_rsv + rsv.len();
            let off_struct = align4(off_strings + STRINGS.len());
            (off_struct, off_strings, off_struct + structure.len())
        } else {
            let off_struct = off_rsv + rsv.len();
            let off_strings = off_struct + structure.len();
            (off_struct, off_strings, off_strings + STRINGS.len())
        };

        let mut blob = vec![0u8; total];
        let last_comp = if self.version >= 16 { 16 } else { 2 };
        let size_struct = if self.version >= 17 { structure.len() as u32 } else { 0 };
        let header = [
            FDT_MAGIC,
            total as u32,
            off_struct as u32,
            off_strings as u32,
            off_rsv as u32,
            self.version,
            last_comp,
            0,
            STRINGS.len() as u32,
            size_struct,
        ];
        for (i, word) in header.iter().enumerate() {
            blob[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
        }
        blob[off_rsv..off_rsv + rsv.len()].copy_from_slice(&rsv);
        blob[off_struct..off_struct + structure.len()].copy_from_slice(&structure);
        blob[off_strings..off_strings + STRINGS.len()].copy_from_slice(STRINGS);
        blob
    }
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

fn token(out: &mut Vec<u8>, token: u32) {
    out.extend_from_slice(&token.to_be_bytes());
}

fn padded(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes);
    out.resize(align4(out.len()), 0);
}

fn prop(out: &mut Vec<u8>, nameoff: u32, value: &[u8]) {
    token(out, FDT_PROP);
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(&nameoff.to_be_bytes());
    padded(out, value);
}
