//! volume.rs — whole-file reads from our own boot volume

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use log::debug;
use uefi::proto::loaded_image::LoadedImage;
use uefi::proto::media::file::{Directory, File, FileAttribute, FileInfo, FileMode};
use uefi::proto::media::fs::SimpleFileSystem;
use uefi::table::boot::BootServices;
use uefi::{CString16, Handle, Status};

use super::status_of;
use crate::error::LoaderError;
use crate::resolver::FileLookup;

/// Largest file we are willing to pull into memory.
const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Root directory of the volume `image` was loaded from.
pub struct VolumeFiles {
    root: Directory,
}

impl VolumeFiles {
    pub fn open(bt: &BootServices, image: Handle) -> Result<Self, LoaderError> {
        let firmware = |status| LoaderError::Firmware { status };
        let device = bt
            .open_protocol_exclusive::<LoadedImage>(image)
            .map_err(|e| firmware(status_of(&e)))?
            .device();
        let mut fs = bt
            .open_protocol_exclusive::<SimpleFileSystem>(device)
            .map_err(|e| firmware(status_of(&e)))?;
        let root = fs.open_volume().map_err(|e| firmware(status_of(&e)))?;
        Ok(Self { root })
    }
}

impl FileLookup for VolumeFiles {
    fn read(&mut self, path: &str) -> Result<Vec<u8>, LoaderError> {
        let io = |status: usize| LoaderError::Io { path: String::from(path), status };

        let name = CString16::try_from(path).map_err(|_| io(Status::INVALID_PARAMETER.0))?;
        let handle = self
            .root
            .open(&name, FileMode::Read, FileAttribute::empty())
            .map_err(|e| io(status_of(&e)))?;
        let mut file = handle.into_regular_file().ok_or_else(|| io(Status::NOT_FOUND.0))?;

        let size = file
            .get_boxed_info::<FileInfo>()
            .map_err(|e| io(status_of(&e)))?
            .file_size();
        if size > MAX_FILE_SIZE {
            return Err(io(Status::BAD_BUFFER_SIZE.0));
        }

        let mut bytes = vec![0u8; size as usize];
        let mut filled = 0;
        while filled < bytes.len() {
            let n = file.read(&mut bytes[filled..]).map_err(|e| io(status_of(&e)))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        bytes.truncate(filled);
        debug!("read {path}: {filled} bytes");
        Ok(bytes)
    }
}
