//! firmware — the library traits on top of the `uefi` crate
//!
//! - `pool`      : `AllocatePool` backed `BlobPool`
//! - `volume`    : files on the volume we were loaded from
//! - `directory` : the system configuration table
//! - `event`     : the ExitBootServices notification
//! - `chainload` : load and start the next stage
//! - `ui`        : console banner and failure block

pub mod chainload;
pub mod directory;
pub mod event;
pub mod pool;
pub mod ui;
pub mod volume;

pub use directory::FirmwareDirectory;
pub use event::ExitHook;
pub use pool::FirmwarePool;
pub use volume::VolumeFiles;

use core::fmt::Debug;

/// Raw EFI_STATUS carried by a `uefi` error.
pub(crate) fn status_of<T: Debug>(e: &uefi::Error<T>) -> usize {
    e.status().0
}
