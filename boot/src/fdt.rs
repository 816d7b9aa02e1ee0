//! fdt.rs — flattened device tree header view + expand-into-buffer
//!
//! Only the properties the loader relies on are implemented here:
//! - the self-described `totalsize`
//! - block layout validation (bounds, ordering)
//! - `open_into`, the structure-preserving copy into a larger buffer
//!
//! Node and property contents are never interpreted.
//!
//! Layout (big-endian):
//!   +------------------------+ 0
//!   | header (40 bytes, v17) |
//!   +------------------------+ off_mem_rsvmap
//!   | memory reserve map     |  16-byte (addr, size) pairs, (0, 0) terminated
//!   +------------------------+ off_dt_struct
//!   | structure block        |  tokens, FDT_END terminated
//!   +------------------------+ off_dt_strings
//!   | strings block          |
//!   +------------------------+
//!   | free space             |
//!   +------------------------+ totalsize

use core::mem;

use zerocopy::byteorder::{BigEndian, U32};
use zerocopy::{AsBytes, FromBytes, Unaligned};

use crate::error::FdtError;

pub const FDT_MAGIC: u32 = 0xd00d_feed;

/// Oldest header version whose blocks can be located (v16 lacks `size_dt_struct`).
pub const FIRST_SUPPORTED_VERSION: u32 = 16;
pub const LAST_SUPPORTED_VERSION: u32 = 17;
/// Version written by `open_into`.
pub const OUTPUT_VERSION: u32 = 17;
pub const OUTPUT_LAST_COMP_VERSION: u32 = 16;

pub const HEADER_SIZE: usize = mem::size_of::<FdtHeader>();
const V16_HEADER_SIZE: usize = HEADER_SIZE - 4;
const RSV_ENTRY_SIZE: usize = 16;

const FDT_BEGIN_NODE: u32 = 0x1;
const FDT_END_NODE: u32 = 0x2;
const FDT_PROP: u32 = 0x3;
const FDT_NOP: u32 = 0x4;
const FDT_END: u32 = 0x9;

type Be32 = U32<BigEndian>;

/// On-wire header. Read and written with zerocopy, so unaligned input is fine.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, AsBytes, Unaligned)]
pub struct FdtHeader {
    pub magic: Be32,
    pub totalsize: Be32,
    pub off_dt_struct: Be32,
    pub off_dt_strings: Be32,
    pub off_mem_rsvmap: Be32,
    pub version: Be32,
    pub last_comp_version: Be32,
    pub boot_cpuid_phys: Be32,
    pub size_dt_strings: Be32,
    /// v17+ only.
    pub size_dt_struct: Be32,
}

impl FdtHeader {
    /// Read the header and check the magic. Nothing else is validated.
    pub fn read(bytes: &[u8]) -> Result<Self, FdtError> {
        let header = FdtHeader::read_from_prefix(bytes).ok_or(FdtError::Truncated {
            need: HEADER_SIZE,
            have: bytes.len(),
        })?;
        if header.magic.get() != FDT_MAGIC {
            return Err(FdtError::BadMagic(header.magic.get()));
        }
        Ok(header)
    }

    #[inline]
    pub fn total_size(&self) -> usize {
        self.totalsize.get() as usize
    }

    #[inline]
    pub fn version(&self) -> u32 {
        self.version.get()
    }
}

/// Declared total size of the blob starting at `bytes`.
pub fn total_size(bytes: &[u8]) -> Result<usize, FdtError> {
    FdtHeader::read(bytes).map(|h| h.total_size())
}

/// Validated view over exactly `totalsize` bytes of a blob.
#[derive(Clone, Copy, Debug)]
pub struct Fdt<'a> {
    header: FdtHeader,
    bytes: &'a [u8],
    rsv_len: usize,
    struct_len: usize,
}

impl<'a> Fdt<'a> {
    /// Parse and validate a blob. `bytes` may be longer than the declared
    /// size; the excess is ignored.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FdtError> {
        let header = FdtHeader::read(bytes)?;

        let version = header.version();
        if version < FIRST_SUPPORTED_VERSION {
            return Err(FdtError::BadVersion(version));
        }
        let last_comp = header.last_comp_version.get();
        if last_comp > LAST_SUPPORTED_VERSION {
            return Err(FdtError::BadVersion(last_comp));
        }

        let total = header.total_size();
        let min_header = if version >= 17 { HEADER_SIZE } else { V16_HEADER_SIZE };
        if total < min_header {
            return Err(FdtError::BadLayout);
        }
        if total > bytes.len() {
            return Err(FdtError::Truncated { need: total, have: bytes.len() });
        }
        let bytes = &bytes[..total];

        let off_rsv = header.off_mem_rsvmap.get() as usize;
        let off_struct = header.off_dt_struct.get() as usize;
        let off_strings = header.off_dt_strings.get() as usize;
        let size_strings = header.size_dt_strings.get() as usize;

        if off_rsv < min_header || off_rsv > total || off_struct > total {
            return Err(FdtError::BadLayout);
        }
        let strings_end = off_strings.checked_add(size_strings).ok_or(FdtError::BadLayout)?;
        if strings_end > total {
            return Err(FdtError::BadLayout);
        }

        let rsv_len = reserve_map_len(bytes, off_rsv)?;

        let struct_len = if version >= 17 {
            let len = header.size_dt_struct.get() as usize;
            let end = off_struct.checked_add(len).ok_or(FdtError::BadLayout)?;
            if end > total {
                return Err(FdtError::BadLayout);
            }
            len
        } else {
            structure_len(bytes, off_struct)?
        };

        Ok(Self { header, bytes, rsv_len, struct_len })
    }

    #[inline]
    pub fn header(&self) -> &FdtHeader {
        &self.header
    }

    #[inline]
    pub fn total_size(&self) -> usize {
        self.bytes.len()
    }

    /// The blob's content, exactly `totalsize` bytes.
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Reserve map including its terminating (0, 0) entry.
    pub fn mem_rsvmap(&self) -> &'a [u8] {
        let start = self.header.off_mem_rsvmap.get() as usize;
        &self.bytes[start..start + self.rsv_len]
    }

    pub fn structure(&self) -> &'a [u8] {
        let start = self.header.off_dt_struct.get() as usize;
        &self.bytes[start..start + self.struct_len]
    }

    pub fn strings(&self) -> &'a [u8] {
        let start = self.header.off_dt_strings.get() as usize;
        &self.bytes[start..start + self.header.size_dt_strings.get() as usize]
    }

    /// Blocks are in canonical order (header, reserve map, structure,
    /// strings) with no overlap. Gaps are allowed.
    fn in_order(&self) -> bool {
        let h = &self.header;
        let off_rsv = h.off_mem_rsvmap.get() as usize;
        let off_struct = h.off_dt_struct.get() as usize;
        let off_strings = h.off_dt_strings.get() as usize;
        off_rsv >= align8(HEADER_SIZE)
            && off_struct >= off_rsv + self.rsv_len
            && off_strings >= off_struct + self.struct_len
            && self.total_size() >= off_strings + h.size_dt_strings.get() as usize
    }
}

/// Copy `src` into `dst`, so that the result declares `totalsize == dst.len()`.
///
/// Content is preserved: the reserve map, structure and strings blocks
/// are byte-identical afterwards. An in-order blob keeps its layout; a
/// misordered one is rewritten in canonical order. The output is always a
/// v17 header. Free space at the end of `dst` is zeroed.
pub fn open_into(src: &[u8], dst: &mut [u8]) -> Result<(), FdtError> {
    let fdt = Fdt::parse(src)?;
    let bufsize = u32::try_from(dst.len()).map_err(|_| FdtError::BadLayout)?;
    let struct_len = fdt.struct_len as u32;

    if fdt.in_order() {
        let total = fdt.total_size();
        if dst.len() < total {
            return Err(FdtError::NoSpace { need: total, have: dst.len() });
        }
        dst[..total].copy_from_slice(fdt.as_bytes());
        dst[total..].fill(0);

        let mut header = fdt.header;
        header.version = Be32::new(OUTPUT_VERSION);
        header.size_dt_struct = Be32::new(struct_len);
        header.totalsize = Be32::new(bufsize);
        return write_header(&header, dst);
    }

    let rsv = fdt.mem_rsvmap();
    let structure = fdt.structure();
    let strings = fdt.strings();

    let off_rsv = align8(HEADER_SIZE);
    let off_struct = off_rsv + rsv.len();
    let off_strings = off_struct + structure.len();
    let need = off_strings + strings.len();
    if dst.len() < need {
        return Err(FdtError::NoSpace { need, have: dst.len() });
    }

    dst.fill(0);
    dst[off_rsv..off_struct].copy_from_slice(rsv);
    dst[off_struct..off_strings].copy_from_slice(structure);
    dst[off_strings..need].copy_from_slice(strings);

    let header = FdtHeader {
        magic: Be32::new(FDT_MAGIC),
        totalsize: Be32::new(bufsize),
        off_dt_struct: Be32::new(off_struct as u32),
        off_dt_strings: Be32::new(off_strings as u32),
        off_mem_rsvmap: Be32::new(off_rsv as u32),
        version: Be32::new(OUTPUT_VERSION),
        last_comp_version: Be32::new(OUTPUT_LAST_COMP_VERSION),
        boot_cpuid_phys: fdt.header.boot_cpuid_phys,
        size_dt_strings: Be32::new(strings.len() as u32),
        size_dt_struct: Be32::new(struct_len),
    };
    write_header(&header, dst)
}

fn write_header(header: &FdtHeader, dst: &mut [u8]) -> Result<(), FdtError> {
    let have = dst.len();
    header
        .write_to_prefix(dst)
        .ok_or(FdtError::NoSpace { need: HEADER_SIZE, have })
}

/* ---------- block scanning (bounds-checked) ---------- */

#[inline]
const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

#[inline]
const fn align8(n: usize) -> usize {
    (n + 7) & !7
}

fn be32_at(bytes: &[u8], offset: usize) -> Result<u32, FdtError> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(FdtError::Truncated { need: offset + 4, have: bytes.len() })
}

fn reserve_map_len(bytes: &[u8], start: usize) -> Result<usize, FdtError> {
    let mut offset = start;
    loop {
        let entry = bytes
            .get(offset..offset + RSV_ENTRY_SIZE)
            .ok_or(FdtError::BadLayout)?;
        offset += RSV_ENTRY_SIZE;
        if entry.iter().all(|&b| b == 0) {
            return Ok(offset - start);
        }
    }
}

/// Length of the structure block up to and including FDT_END.
/// Needed for v16 blobs, which do not record it.
fn structure_len(bytes: &[u8], start: usize) -> Result<usize, FdtError> {
    let mut offset = start;
    loop {
        let token_offset = offset;
        let token = be32_at(bytes, offset)?;
        offset += 4;
        match token {
            FDT_BEGIN_NODE => {
                let name_len = bytes
                    .get(offset..)
                    .and_then(|rest| rest.iter().position(|&b| b == 0))
                    .ok_or(FdtError::Truncated { need: offset + 1, have: bytes.len() })?;
                offset = align4(offset + name_len + 1);
            }
            FDT_PROP => {
                let len = be32_at(bytes, offset)? as usize;
                offset = align4(offset + 8 + len);
            }
            FDT_END_NODE | FDT_NOP => {}
            FDT_END => return Ok(offset - start),
            token => return Err(FdtError::BadStructure { token, offset: token_offset }),
        }
        if offset > bytes.len() {
            return Err(FdtError::Truncated { need: offset, have: bytes.len() });
        }
    }
}
