//! chainload.rs — start the next stage from our own directory

use alloc::string::ToString;
use alloc::vec::Vec;

use log::info;
use uefi::proto::device_path::build::{self, DevicePathBuilder};
use uefi::proto::device_path::media::FilePath;
use uefi::proto::device_path::LoadedImageDevicePath;
use uefi::table::boot::{BootServices, LoadImageSource};
use uefi::{CString16, Handle, Status};

use super::status_of;
use crate::chainload::sibling_path;
use crate::error::LoaderError;

fn firmware(status: Status) -> LoaderError {
    LoaderError::Firmware { status: status.0 }
}

/// Load `next_stage` from the directory `image` was loaded from, and run
/// it. Only returns if the next stage could not be started or exited.
pub fn start_sibling(bt: &BootServices, image: Handle, next_stage: &str) -> Result<(), LoaderError> {
    let own = bt
        .open_protocol_exclusive::<LoadedImageDevicePath>(image)
        .map_err(|e| LoaderError::Firmware { status: status_of(&e) })?;

    // Same device nodes, new file path node.
    let mut storage = Vec::new();
    let mut builder = DevicePathBuilder::with_vec(&mut storage);
    let mut target = None;
    for node in own.node_iter() {
        if let Ok(file) = <&FilePath>::try_from(node) {
            let own_path = file
                .path_name()
                .to_cstring16()
                .map_err(|_| firmware(Status::INVALID_PARAMETER))?;
            target = Some(sibling_path(&own_path.to_string(), next_stage));
            break;
        }
        builder = builder.push(&node).map_err(|_| firmware(Status::BUFFER_TOO_SMALL))?;
    }
    let target = target.ok_or_else(|| firmware(Status::NO_MEDIA))?;

    let path_name = CString16::try_from(target.as_str()).map_err(|_| firmware(Status::INVALID_PARAMETER))?;
    let device_path = builder
        .push(&build::media::FilePath { path_name: &path_name })
        .and_then(|b| b.finalize())
        .map_err(|_| firmware(Status::BUFFER_TOO_SMALL))?;
    drop(own);

    info!("chainloading {target}");
    let next = bt
        .load_image(image, LoadImageSource::FromFilePath { file_path: device_path, from_boot_manager: false })
        .map_err(|e| LoaderError::Io { path: target.clone(), status: status_of(&e) })?;
    bt.start_image(next).map_err(|e| LoaderError::Firmware { status: status_of(&e) })
}
