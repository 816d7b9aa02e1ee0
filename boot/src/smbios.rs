//! smbios.rs — SMBIOS entry point + structure table walker
//!
//! Extracts just the strings CHIDs are built from:
//! - type 0 (BIOS): vendor, version, major/minor release
//! - type 1 (System): manufacturer, product name, SKU, family
//! - type 2 (Baseboard): manufacturer, product
//! - type 3 (Enclosure): chassis type
//!
//! Only the first structure of each type is used.

use alloc::string::{String, ToString};
use core::mem;
use core::slice;

use log::debug;

use zerocopy::byteorder::{LittleEndian, U16, U32, U64};
use zerocopy::{FromBytes, Unaligned};

use crate::chid::{self, ChidKind, SmbiosField};
use crate::error::LoaderError;
use crate::resolver::HardwareIds;
use crate::tables::{TableDirectory, TableId};

const SM21_ANCHOR: &[u8; 4] = b"_SM_";
const SM21_INTERMEDIATE_ANCHOR: &[u8; 5] = b"_DMI_";
const SM3_ANCHOR: &[u8; 5] = b"_SM3_";

const TYPE_BIOS: u8 = 0;
const TYPE_SYSTEM: u8 = 1;
const TYPE_BASEBOARD: u8 = 2;
const TYPE_ENCLOSURE: u8 = 3;
const TYPE_END: u8 = 127;

/// SMBIOS 2.1 (32-bit) entry point structure.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, Unaligned)]
struct Smbios21Entry {
    anchor: [u8; 4],
    checksum: u8,
    length: u8,
    major: u8,
    minor: u8,
    max_structure_size: U16<LittleEndian>,
    revision: u8,
    formatted_area: [u8; 5],
    intermediate_anchor: [u8; 5],
    intermediate_checksum: u8,
    table_length: U16<LittleEndian>,
    table_address: U32<LittleEndian>,
    structure_count: U16<LittleEndian>,
    bcd_revision: u8,
}

/// SMBIOS 3.x (64-bit) entry point structure.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, Unaligned)]
struct Smbios3Entry {
    anchor: [u8; 5],
    checksum: u8,
    length: u8,
    major: u8,
    minor: u8,
    docrev: u8,
    revision: u8,
    reserved: u8,
    table_max_size: U32<LittleEndian>,
    table_address: U64<LittleEndian>,
}

/// Where the structure table lives, per the entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureTable {
    pub address: u64,
    /// Exact length (2.1) or upper bound (3.x).
    pub length: usize,
    pub major: u8,
    pub minor: u8,
}

/// Size of the entry point structure starting with `anchor`, if known.
pub fn entry_point_len(anchor: &[u8]) -> Option<usize> {
    if anchor.starts_with(SM3_ANCHOR) {
        Some(mem::size_of::<Smbios3Entry>())
    } else if anchor.starts_with(SM21_ANCHOR) {
        Some(mem::size_of::<Smbios21Entry>())
    } else {
        None
    }
}

fn checksum_ok(bytes: &[u8]) -> bool {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) == 0
}

/// Parse and checksum an SMBIOS 2.1 or 3.x entry point.
pub fn parse_entry_point(bytes: &[u8]) -> Result<StructureTable, LoaderError> {
    if bytes.starts_with(SM3_ANCHOR) {
        let entry = Smbios3Entry::read_from_prefix(bytes)
            .ok_or(LoaderError::Smbios("short 3.x entry point"))?;
        let len = entry.length as usize;
        if len < mem::size_of::<Smbios3Entry>() || len > bytes.len() || !checksum_ok(&bytes[..len]) {
            return Err(LoaderError::Smbios("bad 3.x entry point checksum"));
        }
        return Ok(StructureTable {
            address: entry.table_address.get(),
            length: entry.table_max_size.get() as usize,
            major: entry.major,
            minor: entry.minor,
        });
    }

    if bytes.starts_with(SM21_ANCHOR) {
        let entry = Smbios21Entry::read_from_prefix(bytes)
            .ok_or(LoaderError::Smbios("short 2.1 entry point"))?;
        let len = entry.length as usize;
        if len < 0x1f || len > bytes.len() || !checksum_ok(&bytes[..len]) {
            return Err(LoaderError::Smbios("bad 2.1 entry point checksum"));
        }
        if &entry.intermediate_anchor != SM21_INTERMEDIATE_ANCHOR || !checksum_ok(&bytes[0x10..0x1f]) {
            return Err(LoaderError::Smbios("bad 2.1 intermediate entry point"));
        }
        return Ok(StructureTable {
            address: entry.table_address.get() as u64,
            length: entry.table_length.get() as usize,
            major: entry.major,
            minor: entry.minor,
        });
    }

    Err(LoaderError::Smbios("no entry point anchor"))
}

/// Platform identity strings, trimmed. `None` means absent or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmbiosInfo {
    pub manufacturer: Option<String>,
    pub family: Option<String>,
    pub product_name: Option<String>,
    pub product_sku: Option<String>,
    pub baseboard_manufacturer: Option<String>,
    pub baseboard_product: Option<String>,
    pub bios_vendor: Option<String>,
    pub bios_version: Option<String>,
    /// `%02x` of the BIOS major release byte.
    pub bios_major_release: Option<String>,
    pub bios_minor_release: Option<String>,
    /// `%x` of the chassis type, lock bit masked.
    pub enclosure_kind: Option<String>,
}

impl SmbiosInfo {
    pub fn field(&self, field: SmbiosField) -> Option<&str> {
        let value = match field {
            SmbiosField::Manufacturer => &self.manufacturer,
            SmbiosField::Family => &self.family,
            SmbiosField::ProductName => &self.product_name,
            SmbiosField::ProductSku => &self.product_sku,
            SmbiosField::BaseboardManufacturer => &self.baseboard_manufacturer,
            SmbiosField::BaseboardProduct => &self.baseboard_product,
            SmbiosField::BiosVendor => &self.bios_vendor,
            SmbiosField::BiosVersion => &self.bios_version,
            SmbiosField::BiosMajorRelease => &self.bios_major_release,
            SmbiosField::BiosMinorRelease => &self.bios_minor_release,
            SmbiosField::EnclosureKind => &self.enclosure_kind,
        };
        value.as_deref()
    }

    /// Walk a structure table. Malformed trailing data ends the walk; what
    /// was collected until then is kept.
    pub fn from_structures(table: &[u8]) -> Self {
        let mut info = SmbiosInfo::default();
        let mut seen = [false; 4];
        let mut rest = table;

        while rest.len() >= 4 {
            let ty = rest[0];
            let len = rest[1] as usize;
            if ty == TYPE_END || len < 4 || len > rest.len() {
                break;
            }
            let formatted = &rest[..len];
            let Some(strings_len) = string_set_len(&rest[len..]) else {
                break;
            };
            let strings = &rest[len..len + strings_len];

            if (ty as usize) < seen.len() && !seen[ty as usize] {
                seen[ty as usize] = true;
                info.absorb(ty, formatted, strings);
            }
            rest = &rest[len + strings_len..];
        }
        info
    }

    fn absorb(&mut self, ty: u8, formatted: &[u8], strings: &[u8]) {
        let text = |offset: usize| -> Option<String> {
            let index = *formatted.get(offset)?;
            string_at(strings, index)
        };
        match ty {
            TYPE_BIOS => {
                self.bios_vendor = text(0x04);
                self.bios_version = text(0x05);
                self.bios_major_release = formatted.get(0x14).map(|b| alloc::format!("{:02x}", b));
                self.bios_minor_release = formatted.get(0x15).map(|b| alloc::format!("{:02x}", b));
            }
            TYPE_SYSTEM => {
                self.manufacturer = text(0x04);
                self.product_name = text(0x05);
                self.product_sku = text(0x19);
                self.family = text(0x1a);
            }
            TYPE_BASEBOARD => {
                self.baseboard_manufacturer = text(0x04);
                self.baseboard_product = text(0x05);
            }
            TYPE_ENCLOSURE => {
                self.enclosure_kind = formatted.get(0x05).map(|b| alloc::format!("{:x}", b & 0x7f));
            }
            _ => {}
        }
    }
}

impl HardwareIds for SmbiosInfo {
    fn hardware_id(&self, kind: ChidKind) -> Option<uuid::Uuid> {
        chid::derive(kind, self)
    }
}

/// Length of the string set following a formatted area, including the
/// double-NUL terminator.
fn string_set_len(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|w| w == [0, 0]).map(|end| end + 2)
}

/// 1-based string lookup; index 0 means "no string".
fn string_at(strings: &[u8], index: u8) -> Option<String> {
    if index == 0 {
        return None;
    }
    let raw = strings.split(|&b| b == 0).nth(index as usize - 1)?;
    let value = String::from_utf8_lossy(raw).trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Find the SMBIOS tables through the configuration table, 3.x first.
/// `Ok(None)` when the platform publishes none.
///
/// # Safety
/// Entries in `directory` must point at mapped memory (identity mapped
/// while boot services run), as must the structure table they name.
pub unsafe fn locate<D: TableDirectory + ?Sized>(directory: &D) -> Result<Option<SmbiosInfo>, LoaderError> {
    let Some(entry) = directory.lookup(TableId::Smbios3).or_else(|| directory.lookup(TableId::Smbios)) else {
        return Ok(None);
    };
    let anchor = slice::from_raw_parts(entry.as_ptr(), SM3_ANCHOR.len());
    let len = entry_point_len(anchor).ok_or(LoaderError::Smbios("no entry point anchor"))?;
    let table = parse_entry_point(slice::from_raw_parts(entry.as_ptr(), len))?;
    debug!("SMBIOS {}.{}: {} bytes at {:#x}", table.major, table.minor, table.length, table.address);

    if table.address == 0 || table.length == 0 {
        return Err(LoaderError::Smbios("empty structure table"));
    }
    let structures = slice::from_raw_parts(table.address as usize as *const u8, table.length);
    Ok(Some(SmbiosInfo::from_structures(structures)))
}
