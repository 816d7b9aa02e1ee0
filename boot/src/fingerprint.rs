//! fingerprint.rs — change detection for the published device tree
//!
//! The fingerprint is a CRC-32 (IEEE 802.3, reflected), i.e. the same value
//! the firmware's `CalculateCrc32` boot service produces. It is a change
//! detector only; nothing here is an integrity guarantee.

use core::fmt;

const CRC32_TABLE: [u32; 256] = crc32_table();

const fn crc32_table() -> [u32; 256] {
    const POLYNOMIAL: u32 = 0xEDB8_8320;
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLYNOMIAL } else { crc >> 1 };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC-32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc = (crc >> 8) ^ CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize];
    }
    !crc
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u32);

impl Fingerprint {
    /// Fingerprint of the first `total_size` bytes of `bytes`.
    ///
    /// Anything past `total_size` (unused buffer capacity) is not content
    /// and never contributes. Returns `None` if `bytes` is shorter than
    /// `total_size`.
    pub fn over(bytes: &[u8], total_size: usize) -> Option<Self> {
        bytes.get(..total_size).map(|content| Fingerprint(crc32(content)))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
