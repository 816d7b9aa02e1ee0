//! chid.rs — Computer Hardware IDs
//!
//! A CHID is a name-based (v5) UUID over the UTF-16LE encoding of a fixed
//! set of SMBIOS strings joined with `&`, in the Microsoft
//! ComputerHardwareIds namespace. Each `ChidKind` names one field set,
//! from most specific (HardwareID-0) to least (HardwareID-14).

use alloc::vec::Vec;
use core::fmt;

use uuid::{uuid, Uuid};

#[cfg(feature = "logging")]
use crate::resolver::HardwareIds;
use crate::smbios::SmbiosInfo;

pub const CHID_NAMESPACE: Uuid = uuid!("70ffd812-4c7f-4c7d-0000-000000000000");

/// SMBIOS-derived strings a CHID can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmbiosField {
    Manufacturer,
    Family,
    ProductName,
    ProductSku,
    BaseboardManufacturer,
    BaseboardProduct,
    BiosVendor,
    BiosVersion,
    BiosMajorRelease,
    BiosMinorRelease,
    EnclosureKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChidKind {
    Chid0,
    Chid1,
    Chid2,
    Chid3,
    Chid4,
    Chid5,
    Chid6,
    Chid7,
    Chid8,
    Chid9,
    Chid10,
    Chid11,
    Chid12,
    Chid13,
    Chid14,
}

/// Most to least specific, skipping the BIOS-version kinds (they change on
/// every firmware update) and the overly generic ones.
pub const DEFAULT_PRIORITY: [ChidKind; 9] = [
    ChidKind::Chid3,
    ChidKind::Chid6,
    ChidKind::Chid8,
    ChidKind::Chid10,
    ChidKind::Chid4,
    ChidKind::Chid5,
    ChidKind::Chid7,
    ChidKind::Chid9,
    ChidKind::Chid11,
];

impl ChidKind {
    pub const ALL: [ChidKind; 15] = [
        ChidKind::Chid0,
        ChidKind::Chid1,
        ChidKind::Chid2,
        ChidKind::Chid3,
        ChidKind::Chid4,
        ChidKind::Chid5,
        ChidKind::Chid6,
        ChidKind::Chid7,
        ChidKind::Chid8,
        ChidKind::Chid9,
        ChidKind::Chid10,
        ChidKind::Chid11,
        ChidKind::Chid12,
        ChidKind::Chid13,
        ChidKind::Chid14,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn fields(self) -> &'static [SmbiosField] {
        use SmbiosField::*;
        match self {
            ChidKind::Chid0 => &[
                Manufacturer, Family, ProductName, ProductSku,
                BiosVendor, BiosVersion, BiosMajorRelease, BiosMinorRelease,
            ],
            ChidKind::Chid1 => &[
                Manufacturer, Family, ProductName,
                BiosVendor, BiosVersion, BiosMajorRelease, BiosMinorRelease,
            ],
            ChidKind::Chid2 => &[
                Manufacturer, ProductName,
                BiosVendor, BiosVersion, BiosMajorRelease, BiosMinorRelease,
            ],
            ChidKind::Chid3 => &[
                Manufacturer, Family, ProductName, ProductSku,
                BaseboardManufacturer, BaseboardProduct,
            ],
            ChidKind::Chid4 => &[Manufacturer, Family, ProductName, ProductSku],
            ChidKind::Chid5 => &[Manufacturer, Family, ProductName],
            ChidKind::Chid6 => &[Manufacturer, ProductSku, BaseboardManufacturer, BaseboardProduct],
            ChidKind::Chid7 => &[Manufacturer, ProductSku],
            ChidKind::Chid8 => &[Manufacturer, ProductName, BaseboardManufacturer, BaseboardProduct],
            ChidKind::Chid9 => &[Manufacturer, ProductName],
            ChidKind::Chid10 => &[Manufacturer, Family, BaseboardManufacturer, BaseboardProduct],
            ChidKind::Chid11 => &[Manufacturer, Family],
            ChidKind::Chid12 => &[Manufacturer, EnclosureKind],
            ChidKind::Chid13 => &[Manufacturer, BaseboardManufacturer, BaseboardProduct],
            ChidKind::Chid14 => &[Manufacturer],
        }
    }
}

impl fmt::Display for ChidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HardwareID-{}", self.index())
    }
}

/// Derive the CHID of `kind`. `None` if any field it needs is missing or
/// blank; that kind simply does not exist for this machine.
pub fn derive(kind: ChidKind, info: &SmbiosInfo) -> Option<Uuid> {
    let mut name = Vec::new();
    for (i, field) in kind.fields().iter().enumerate() {
        let value = info.field(*field)?.trim();
        if value.is_empty() {
            return None;
        }
        if i > 0 {
            push_utf16le(&mut name, "&");
        }
        push_utf16le(&mut name, value);
    }
    Some(Uuid::new_v5(&CHID_NAMESPACE, &name))
}

/// Debug dump of every derivable CHID, most specific first.
#[cfg(feature = "logging")]
pub fn log_all<I: HardwareIds + ?Sized>(ids: &I) {
    for kind in ChidKind::ALL {
        if let Some(id) = ids.hardware_id(kind) {
            log::debug!("{{{id}}}   <- {kind}");
        }
    }
}

fn push_utf16le(out: &mut Vec<u8>, s: &str) {
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
}
