#![no_std]
#![no_main]

use log::{error, info, warn};
use uefi::prelude::*;

use dtbloader::config::{LoaderConfig, CONFIG_PATH};
use dtbloader::firmware::{chainload, ui, ExitHook, FirmwareDirectory, FirmwarePool, VolumeFiles};
use dtbloader::pipeline::{self, Report};
use dtbloader::smbios;
use dtbloader::tables::{install_rt_properties, RtServices};
use dtbloader::{FileLookup, LoaderError};

/// Entry point for UEFI firmware
#[entry]
fn efi_main(image: Handle, mut system_table: SystemTable<Boot>) -> Status {
    if let Err(e) = uefi_services::init(&mut system_table) {
        return e.status();
    }
    ui::draw_banner(&mut system_table);

    let config = load_config(image, &system_table);
    log::set_max_level(config.log_level);

    announce_no_runtime_services(&system_table);

    match augment(image, &system_table, &config) {
        Ok(Some(report)) => {
            info!(
                "device tree {} from {}: {} bytes, crc32 {}",
                report.path, report.source, report.total_size, report.fingerprint
            );
            if let Some(e) = &report.unarmed {
                ui::display_failure(&mut system_table, "ACPI ARBITRATION DISABLED", e);
            }
        }
        Ok(None) => info!("no SMBIOS tables, skipping device tree"),
        Err(e) => {
            error!("device tree not installed: {e}");
            ui::display_failure(&mut system_table, "NO DEVICE TREE", &e);
        }
    }

    match chainload::start_sibling(system_table.boot_services(), image, &config.next_stage) {
        Ok(()) => Status::SUCCESS,
        Err(e) => {
            ui::display_failure(&mut system_table, "CHAINLOAD FAILED", &e);
            match e {
                LoaderError::Io { status, .. } | LoaderError::Firmware { status } => Status(status),
                _ => Status::LOAD_ERROR,
            }
        }
    }
}

/// Once, before anything is resolved. Failure only costs the table.
fn announce_no_runtime_services(st: &SystemTable<Boot>) {
    let pool = FirmwarePool::runtime(st.boot_services());
    // SAFETY: used only while boot services run.
    let directory = unsafe { FirmwareDirectory::new(st) };
    if let Err(e) = install_rt_properties(&directory, &pool, RtServices::empty()) {
        warn!("RT properties table not installed: {e}");
    }
}

/// `\dtbloader.conf` over the defaults. Any problem with it leaves the
/// defaults in place.
fn load_config(image: Handle, st: &SystemTable<Boot>) -> LoaderConfig {
    let bytes = VolumeFiles::open(st.boot_services(), image).and_then(|mut volume| volume.read(CONFIG_PATH));
    match bytes {
        Ok(bytes) => LoaderConfig::from_bytes(&bytes).unwrap_or_else(|e| {
            warn!("{CONFIG_PATH}: {e}, using defaults");
            LoaderConfig::default()
        }),
        Err(e) if e.is_not_found() => LoaderConfig::default(),
        Err(e) => {
            warn!("{CONFIG_PATH}: {e}, using defaults");
            LoaderConfig::default()
        }
    }
}

/// `Ok(None)`: the platform has no SMBIOS, so there is nothing to match on.
fn augment(image: Handle, st: &SystemTable<Boot>, config: &LoaderConfig) -> Result<Option<Report>, LoaderError> {
    let bt = st.boot_services();
    // SAFETY: moved into the ExitBootServices hook, which runs while boot
    // services are still up.
    let directory = unsafe { FirmwareDirectory::new(st) };

    // SAFETY: configuration tables are identity mapped at this point.
    let Some(ids) = (unsafe { smbios::locate(&directory)? }) else {
        return Ok(None);
    };
    #[cfg(feature = "logging")]
    dtbloader::chid::log_all(&ids);

    let mut volume = VolumeFiles::open(bt, image)?;
    let pool = FirmwarePool::blobs(bt);
    let mut events = ExitHook::new(bt);
    pipeline::augment(config, &ids, &mut volume, &pool, directory, &mut events).map(Some)
}
