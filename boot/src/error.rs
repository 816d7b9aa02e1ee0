//! error.rs — dtbloader error kinds
//!
//! Every step of the augmentation path (resolve, grow, publish, arm) reports
//! through `LoaderError`. None of them is fatal to the boot: the entry point
//! logs the error and still chainloads the next stage.

use alloc::string::String;
use thiserror::Error;

/// Structural failures of a flattened device tree blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FdtError {
    #[error("bad FDT magic 0x{0:08x}")]
    BadMagic(u32),
    #[error("unsupported FDT version {0}")]
    BadVersion(u32),
    #[error("FDT truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("FDT block layout out of bounds")]
    BadLayout,
    #[error("bad structure token 0x{token:x} at offset {offset}")]
    BadStructure { token: u32, offset: usize },
    #[error("FDT needs {need} bytes, buffer has {have}")]
    NoSpace { need: usize, have: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    /// No CHID candidate and no override file could be loaded.
    #[error("no matching device tree found")]
    NotFound,

    #[error("out of pool memory")]
    OutOfMemory,

    #[error("corrupt device tree: {0}")]
    CorruptBlob(#[from] FdtError),

    /// `InstallConfigurationTable` failed; `status` is the raw EFI_STATUS.
    #[error("configuration table install failed (status 0x{status:x})")]
    Install { status: usize },

    #[error("cannot read {path} (status 0x{status:x})")]
    Io { path: String, status: usize },

    #[error("config line {line}: {reason}")]
    Config { line: usize, reason: &'static str },

    #[error("SMBIOS: {0}")]
    Smbios(&'static str),

    #[error("firmware call failed (status 0x{status:x})")]
    Firmware { status: usize },

    /// The exit-boot-services arbiter may only be registered once.
    #[error("exit-boot-services hook already registered")]
    AlreadyRegistered,
}

impl LoaderError {
    /// True for the failures a missing file produces. The resolver treats
    /// these as "try the next candidate", never as a hard stop.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoaderError::NotFound | LoaderError::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn fdt_errors_convert_into_corrupt_blob() {
        let err: LoaderError = FdtError::BadMagic(0x1234).into();
        assert_eq!(err, LoaderError::CorruptBlob(FdtError::BadMagic(0x1234)));
        assert_eq!(err.to_string(), "corrupt device tree: bad FDT magic 0x00001234");
    }

    #[test]
    fn io_failures_count_as_not_found() {
        let io = LoaderError::Io { path: "\\dtb\\x.dtb".into(), status: 14 };
        assert!(io.is_not_found());
        assert!(LoaderError::NotFound.is_not_found());
        assert!(!LoaderError::OutOfMemory.is_not_found());
    }
}
